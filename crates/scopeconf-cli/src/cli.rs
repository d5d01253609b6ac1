//! scopeconf CLI - Command-line interface for scoped JSON configuration
//!
//! Usage:
//!   scopeconf get config.json database.url
//!   scopeconf dump config.json --section database --format yaml
//!   scopeconf check config.json

use clap::{Parser, Subcommand};
use colored::Colorize;
use scopeconf_core::{document, ConfigOptions, ConfigReader, PrefixMatching, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// scopeconf - Read scoped JSON configuration with placeholder resolution
#[derive(Parser)]
#[command(name = "scopeconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get a resolved value from the configuration
    Get {
        /// Configuration file
        file: PathBuf,

        /// Dot-separated path to the value (e.g., database.url)
        path: String,

        /// Output format: text, json, yaml
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Look the key up in enclosing sections if it is not defined in its own
        #[arg(long)]
        inherit: bool,

        /// Match resolver prefixes (env:, file:, ...) case sensitively
        #[arg(long)]
        case_sensitive: bool,

        /// Root-level default as KEY=VALUE (repeatable); the file wins on conflicts
        #[arg(short, long = "default", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        defaults: Vec<(String, String)>,

        /// Value to print if the key is not found
        #[arg(long)]
        fallback: Option<String>,
    },

    /// Print the configuration with every placeholder resolved
    Dump {
        /// Configuration file
        file: PathBuf,

        /// Output format: json, yaml
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Only dump this section (e.g., database.replica)
        #[arg(short, long)]
        section: Option<String>,

        /// Match resolver prefixes (env:, file:, ...) case sensitively
        #[arg(long)]
        case_sensitive: bool,

        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Quick syntax and structure check without resolving placeholders
    Check {
        /// Configuration file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Get {
            file,
            path,
            format,
            inherit,
            case_sensitive,
            defaults,
            fallback,
        } => cmd_get(
            &file,
            &path,
            &format,
            inherit,
            options(case_sensitive),
            &defaults,
            fallback,
        ),

        Commands::Dump {
            file,
            format,
            section,
            case_sensitive,
            output,
        } => cmd_dump(
            &file,
            &format,
            section.as_deref(),
            options(case_sensitive),
            output,
        ),

        Commands::Check { files } => cmd_check(&files),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Also installs the bridge that forwards the library's `log` records
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn options(case_sensitive: bool) -> ConfigOptions {
    let matching = if case_sensitive {
        PrefixMatching::CaseSensitive
    } else {
        PrefixMatching::CaseInsensitive
    };
    ConfigOptions::default().with_prefix_matching(matching)
}

fn load_config(
    file: &Path,
    options: ConfigOptions,
    defaults: &[(String, String)],
) -> Result<ConfigReader, String> {
    let root =
        document::load(file).map_err(|e| format!("Failed to load {}: {}", file.display(), e))?;
    let root = document::merge_defaults(&root, defaults.iter().cloned());
    Ok(ConfigReader::with_options(root, options))
}

/// Descend through a dot-separated chain of sections
fn navigate(config: &ConfigReader, path: &str) -> Option<ConfigReader> {
    path.split('.')
        .try_fold(config.clone(), |section, name| section.section(name))
}

/// Resolve a dot-separated path; a path naming a section yields the whole
/// resolved section
fn find_value(
    config: &ConfigReader,
    path: &str,
    inherit: bool,
) -> scopeconf_core::Result<Option<Value>> {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => match navigate(config, parent) {
            Some(section) => (section, key),
            None => return Ok(None),
        },
        None => (config.clone(), path),
    };

    if let Some(section) = parent.section(key) {
        return section.resolve_all().map(Some);
    }
    parent.lookup(key, inherit)
}

fn render(value: &Value, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        "yaml" => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        "text" => match value {
            // Complex values fall back to YAML
            Value::Array(_) | Value::Object(_) => {
                serde_yaml::to_string(value).map_err(|e| e.to_string())
            }
            // Same text the library substitutes, so null prints empty
            scalar => Ok(format!("{}\n", scalar.to_placeholder_text())),
        },
        other => Err(format!(
            "Unsupported format: {}. Use text, json, or yaml.",
            other
        )),
    }
}

fn emit(value: &Value, format: &str, output: Option<PathBuf>) -> ExitCode {
    let content = match render(value, format) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(1);
        }
    };

    if let Some(output_path) = output {
        if let Err(e) = std::fs::write(&output_path, &content) {
            eprintln!("{}: {}", "Error writing file".red(), e);
            return ExitCode::from(2);
        }
        eprintln!("{} Wrote to {}", "✓".green(), output_path.display());
    } else {
        print!("{}", content);
    }
    ExitCode::SUCCESS
}

fn cmd_get(
    file: &Path,
    path: &str,
    format: &str,
    inherit: bool,
    options: ConfigOptions,
    defaults: &[(String, String)],
    fallback: Option<String>,
) -> ExitCode {
    let config = match load_config(file, options, defaults) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    match find_value(&config, path, inherit) {
        Ok(Some(value)) => emit(&value, format, None),
        Ok(None) => match fallback {
            Some(fallback) => {
                println!("{}", fallback);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("{}: Path '{}' not found", "Error".red(), path);
                ExitCode::from(1)
            }
        },
        Err(e) => {
            eprintln!("{} Failed to resolve '{}'\n", "✗".red(), path);
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}

fn cmd_dump(
    file: &Path,
    format: &str,
    section: Option<&str>,
    options: ConfigOptions,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(file, options, &[]) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let target = match section {
        Some(path) => match navigate(&config, path) {
            Some(s) => s,
            None => {
                eprintln!("{}: Section '{}' not found", "Error".red(), path);
                return ExitCode::from(1);
            }
        },
        None => config,
    };

    match target.resolve_all() {
        Ok(value) => emit(&value, format, output),
        Err(e) => {
            eprintln!("{} Resolution failed\n", "✗".red());
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}

fn cmd_check(files: &[PathBuf]) -> ExitCode {
    let mut all_valid = true;

    for file in files {
        match document::load(file) {
            Ok(root) => {
                println!(
                    "{} {}: valid ({} top-level keys)",
                    "✓".green(),
                    file.display(),
                    root.len()
                );
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                all_valid = false;
            }
        }
    }

    if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn reader(json: &str) -> ConfigReader {
        ConfigReader::from_json(json).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_arguments() {
        let cli = Cli::try_parse_from([
            "scopeconf",
            "get",
            "app.json",
            "db.url",
            "--inherit",
            "-d",
            "host=localhost",
            "--default",
            "tag=a=b",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Get {
                path,
                inherit,
                defaults,
                format,
                ..
            } => {
                assert_eq!(path, "db.url");
                assert!(inherit);
                assert_eq!(format, "text");
                assert_eq!(
                    defaults,
                    vec![
                        ("host".to_string(), "localhost".to_string()),
                        ("tag".to_string(), "a=b".to_string()),
                    ]
                );
            }
            _ => panic!("expected get command"),
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("k=v").unwrap(),
            ("k".to_string(), "v".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=v").is_err());
    }

    #[test]
    fn test_find_value() {
        let config = reader(
            r#"{"name": "app", "db": {"url": "${name}://${host}", "host": "localhost",
                "replica": {"port": 5433}}}"#,
        );

        assert_eq!(
            find_value(&config, "db.url", false).unwrap(),
            Some(Value::from("app://localhost"))
        );
        assert_eq!(
            find_value(&config, "db.replica.port", false).unwrap(),
            Some(Value::Integer(5433))
        );
        assert_eq!(find_value(&config, "missing.url", false).unwrap(), None);
        assert_eq!(find_value(&config, "db.name", false).unwrap(), None);
        assert_eq!(
            find_value(&config, "db.name", true).unwrap(),
            Some(Value::from("app"))
        );
    }

    #[test]
    fn test_find_value_section_resolves_whole_object() {
        let config = reader(r#"{"env": "prod", "db": {"name": "${env}-db"}}"#);
        let value = find_value(&config, "db", false).unwrap().unwrap();
        assert_eq!(value, Value::object([("name", Value::from("prod-db"))]));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&Value::from("x"), "text").unwrap(), "x\n");
        assert_eq!(render(&Value::Integer(3), "text").unwrap(), "3\n");
        assert_eq!(render(&Value::Bool(false), "text").unwrap(), "false\n");
        assert_eq!(render(&Value::Null, "text").unwrap(), "\n");
        assert_eq!(render(&Value::Null, "json").unwrap(), "null\n");
        assert_eq!(render(&Value::from("x"), "json").unwrap(), "\"x\"\n");

        let object = Value::object([("port", Value::Integer(8080))]);
        assert_eq!(render(&object, "yaml").unwrap(), "port: 8080\n");
        assert_eq!(render(&object, "text").unwrap(), "port: 8080\n");
        assert!(render(&object, "toml").is_err());
    }

    #[test]
    fn test_text_output_matches_get_string() {
        let config = reader(r#"{"none": null, "port": 80, "db": {"user": null}}"#);
        for path in ["none", "port", "db.user"] {
            let value = find_value(&config, path, false).unwrap().unwrap();
            let keys: Vec<&str> = path.split('.').collect();
            assert_eq!(
                render(&value, "text").unwrap(),
                format!("{}\n", config.get_string(&keys))
            );
        }
    }

    #[test]
    fn test_load_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"url": "${{scheme}}://${{host}}", "host": "example.com"}}"#).unwrap();

        let defaults = vec![
            ("scheme".to_string(), "https".to_string()),
            ("host".to_string(), "ignored".to_string()),
        ];
        let config = load_config(file.path(), options(false), &defaults).unwrap();
        assert_eq!(config.get_string(&["url"]), "https://example.com");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.json"), options(true), &[])
            .unwrap_err();
        assert!(err.contains("Failed to load"));
    }

    #[test]
    fn test_case_sensitive_option() {
        assert_eq!(
            options(true).prefix_matching,
            PrefixMatching::CaseSensitive
        );
        assert_eq!(options(false), ConfigOptions::default());
    }
}
