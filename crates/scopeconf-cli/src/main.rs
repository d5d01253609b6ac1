use std::process::ExitCode;

fn main() -> ExitCode {
    scopeconf_cli::run()
}
