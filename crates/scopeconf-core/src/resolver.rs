//! Resolver dispatch table
//!
//! Resolvers turn placeholder keys such as `${env:HOME}` or `${now}` into
//! text. A resolver is selected either by a prefix (`env:`, `file:`,
//! `base64:`) or by an exact keyword (`now`, `utcnow`). Keys no resolver
//! claims fall through to scope lookup, which lives in the config reader.
//!
//! Process state is reached through injected capabilities, [`Environment`]
//! and [`Clock`], so that tests can substitute them.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Local, NaiveDateTime, Utc};

use crate::error::{Error, Result};
use crate::interpolation::{self, PrefixMatching};

/// Format used by the `now` and `utcnow` resolvers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of environment variables
pub trait Environment: Send + Sync {
    /// Look up a variable, `None` if unset
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads variables from the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<F> Environment for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current wall-clock time in the local time zone
    fn local_now(&self) -> NaiveDateTime;
    /// Current time in UTC
    fn utc_now(&self) -> NaiveDateTime;
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn utc_now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// A clock frozen at fixed local and UTC instants
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub local: NaiveDateTime,
    pub utc: NaiveDateTime,
}

impl Clock for FixedClock {
    fn local_now(&self) -> NaiveDateTime {
        self.local
    }

    fn utc_now(&self) -> NaiveDateTime {
        self.utc
    }
}

/// Context provided to resolvers during resolution
#[derive(Clone, Copy)]
pub struct ResolverContext<'a> {
    /// The full placeholder key being resolved (e.g., "env:HOME:/root")
    pub key: &'a str,
    /// Environment variable source
    pub env: &'a dyn Environment,
    /// Time source
    pub clock: &'a dyn Clock,
}

/// How a resolver is selected from a placeholder key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// `${name:argument}`
    Prefix,
    /// `${name}`, matched as a whole; the argument is empty
    Keyword,
}

/// Trait for resolver implementations
pub trait Resolver: Send + Sync {
    /// Prefix or keyword that selects this resolver
    fn name(&self) -> &str;

    /// How [`Resolver::name`] is matched against placeholder keys
    fn trigger(&self) -> Trigger {
        Trigger::Prefix
    }

    /// Resolve the placeholder argument to text
    ///
    /// # Arguments
    /// * `arg` - Text after `name:` for prefix resolvers, empty for keywords
    /// * `ctx` - Resolution context
    fn resolve(&self, arg: &str, ctx: &ResolverContext<'_>) -> Result<String>;
}

/// A simple function-based resolver
pub struct FnResolver<F>
where
    F: Fn(&str, &ResolverContext<'_>) -> Result<String> + Send + Sync,
{
    name: String,
    trigger: Trigger,
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str, &ResolverContext<'_>) -> Result<String> + Send + Sync,
{
    /// Create a resolver selected by `${name:...}`
    pub fn prefix(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            trigger: Trigger::Prefix,
            func,
        }
    }

    /// Create a resolver selected by exactly `${name}`
    pub fn keyword(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            trigger: Trigger::Keyword,
            func,
        }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&str, &ResolverContext<'_>) -> Result<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&self) -> Trigger {
        self.trigger
    }

    fn resolve(&self, arg: &str, ctx: &ResolverContext<'_>) -> Result<String> {
        (self.func)(arg, ctx)
    }
}

/// Ordered registry of resolvers; earlier entries take priority
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in resolvers, in priority order:
    /// env, file, base64, now, utcnow
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FnResolver::prefix("env", env_resolver)));
        registry.register(Arc::new(FnResolver::prefix("file", file_resolver)));
        registry.register(Arc::new(FnResolver::prefix("base64", base64_resolver)));
        registry.register(Arc::new(FnResolver::keyword("now", now_resolver)));
        registry.register(Arc::new(FnResolver::keyword("utcnow", utcnow_resolver)));
        registry
    }

    /// Register a resolver, replacing one with the same name and trigger
    /// in place or appending it at the lowest priority
    pub fn register(&mut self, resolver: Arc<dyn Resolver>) {
        match self.position(resolver.name(), resolver.trigger()) {
            Some(i) => self.resolvers[i] = resolver,
            None => self.resolvers.push(resolver),
        }
    }

    /// Register a resolver with optional force overwrite.
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(Error)` if force=false and a resolver with the same name exists
    pub fn register_with_force(&mut self, resolver: Arc<dyn Resolver>, force: bool) -> Result<()> {
        if !force && self.position(resolver.name(), resolver.trigger()).is_some() {
            return Err(Error::resolver_already_registered(resolver.name()));
        }
        self.register(resolver);
        Ok(())
    }

    /// Register a function as a prefix resolver
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&str, &ResolverContext<'_>) -> Result<String> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnResolver::prefix(name, func)));
    }

    /// Check if a resolver with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.iter().any(|r| r.name() == name)
    }

    /// Names of the registered resolvers in priority order
    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    fn position(&self, name: &str, trigger: Trigger) -> Option<usize> {
        self.resolvers
            .iter()
            .position(|r| r.name() == name && r.trigger() == trigger)
    }

    /// Find the first resolver claiming `key` and the argument to pass it
    pub fn find<'k>(
        &self,
        key: &'k str,
        matching: PrefixMatching,
    ) -> Option<(&Arc<dyn Resolver>, &'k str)> {
        self.resolvers.iter().find_map(|resolver| {
            let arg = match resolver.trigger() {
                Trigger::Prefix => matching.strip_prefix(key, resolver.name())?,
                Trigger::Keyword => {
                    if !matching.matches(key, resolver.name()) {
                        return None;
                    }
                    ""
                }
            };
            Some((resolver, arg))
        })
    }

    /// Resolve `ctx.key` with the first matching resolver.
    ///
    /// Returns `None` when no resolver claims the key.
    pub fn resolve(
        &self,
        ctx: &ResolverContext<'_>,
        matching: PrefixMatching,
    ) -> Option<Result<String>> {
        let (resolver, arg) = self.find(ctx.key, matching)?;
        log::trace!("Resolving '{}' with resolver '{}'", ctx.key, resolver.name());
        Some(
            resolver
                .resolve(arg, ctx)
                .map_err(|e| e.with_path(ctx.key)),
        )
    }
}

/// Built-in environment variable resolver
///
/// Usage:
///   ${env:VAR_NAME}            - Variable value, empty string if unset
///   ${env:VAR_NAME:fallback}   - Variable value, `fallback` if unset
fn env_resolver(arg: &str, ctx: &ResolverContext<'_>) -> Result<String> {
    let (name, default) = interpolation::split_env_arg(arg);
    match ctx.env.var(name) {
        Some(value) => Ok(value),
        None => {
            log::trace!("Environment variable '{}' not set, using default", name);
            Ok(default.unwrap_or_default().to_string())
        }
    }
}

/// Built-in file resolver: the whole file as UTF-8 text
fn file_resolver(arg: &str, _ctx: &ResolverContext<'_>) -> Result<String> {
    std::fs::read_to_string(arg).map_err(|e| Error::io(arg, &e))
}

/// Built-in base64 resolver: standard alphabet, decoded as UTF-8
fn base64_resolver(arg: &str, _ctx: &ResolverContext<'_>) -> Result<String> {
    let payload = arg.trim();
    let decoded = general_purpose::STANDARD.decode(payload).map_err(|e| {
        Error::decode(format!(
            "Invalid base64: {}\nInput preview: {}",
            e,
            truncate_str(payload, 50)
        ))
    })?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

fn now_resolver(_arg: &str, ctx: &ResolverContext<'_>) -> Result<String> {
    Ok(ctx.clock.local_now().format(TIMESTAMP_FORMAT).to_string())
}

fn utcnow_resolver(_arg: &str, ctx: &ResolverContext<'_>) -> Result<String> {
    Ok(ctx.clock.utc_now().format(TIMESTAMP_FORMAT).to_string())
}

fn truncate_str(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn fixed_clock() -> FixedClock {
        let local = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        let utc = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(13, 5, 7)
            .unwrap();
        FixedClock { local, utc }
    }

    fn resolve_with(
        key: &str,
        env: &dyn Environment,
        matching: PrefixMatching,
    ) -> Option<Result<String>> {
        let clock = fixed_clock();
        let ctx = ResolverContext {
            key,
            env,
            clock: &clock,
        };
        ResolverRegistry::with_builtins().resolve(&ctx, matching)
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_builtin_priority_order() {
        let registry = ResolverRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["env", "file", "base64", "now", "utcnow"]);
    }

    #[test]
    fn test_env_resolver_with_value() {
        let env = vars(&[("APP_HOST", "prod-server")]);
        let result = resolve_with("env:APP_HOST", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "prod-server");
    }

    #[test]
    fn test_env_resolver_missing_is_empty() {
        let env = vars(&[]);
        let result = resolve_with("env:APP_HOST", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "");
    }

    #[test]
    fn test_env_resolver_default() {
        let env = vars(&[("SET", "value")]);
        let unset = resolve_with("env:UNSET:default", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(unset.unwrap().unwrap(), "default");

        let set = resolve_with("env:SET:default", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(set.unwrap().unwrap(), "value");
    }

    #[test]
    fn test_env_resolver_default_after_last_colon() {
        let env = vars(&[("A:B", "joined")]);
        let result = resolve_with("env:A:B:C", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "joined");

        let result = resolve_with("env:X:Y:C", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "C");
    }

    #[test]
    fn test_process_environment() {
        std::env::set_var("SCOPECONF_RESOLVER_TEST_VAR", "from-process");
        assert_eq!(
            ProcessEnvironment.var("SCOPECONF_RESOLVER_TEST_VAR").as_deref(),
            Some("from-process")
        );
        std::env::remove_var("SCOPECONF_RESOLVER_TEST_VAR");
        assert_eq!(ProcessEnvironment.var("SCOPECONF_RESOLVER_TEST_VAR"), None);
    }

    #[test]
    fn test_prefix_case_modes() {
        let env = vars(&[("HOME", "/home/app")]);

        let insensitive = resolve_with("ENV:HOME", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(insensitive.unwrap().unwrap(), "/home/app");

        let sensitive = resolve_with("ENV:HOME", &env, PrefixMatching::CaseSensitive);
        assert!(sensitive.is_none());
    }

    #[test]
    fn test_unclaimed_keys() {
        let env = vars(&[]);
        assert!(resolve_with("database", &env, PrefixMatching::CaseInsensitive).is_none());
        assert!(resolve_with("nowhere", &env, PrefixMatching::CaseInsensitive).is_none());
        assert!(resolve_with("data_dir/", &env, PrefixMatching::CaseInsensitive).is_none());
    }

    #[test]
    fn test_base64_resolver() {
        let env = vars(&[]);
        let result = resolve_with(
            "base64:SGVsbG8sIFdvcmxkIQ==",
            &env,
            PrefixMatching::CaseInsensitive,
        );
        assert_eq!(result.unwrap().unwrap(), "Hello, World!");
    }

    #[test]
    fn test_base64_invalid() {
        let env = vars(&[]);
        let err = resolve_with("base64:not*base64", &env, PrefixMatching::CaseInsensitive)
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
        assert_eq!(err.path.as_deref(), Some("base64:not*base64"));
    }

    #[test]
    fn test_base64_non_utf8_is_replaced() {
        let env = vars(&[]);
        // 0xFF 0xFE is not valid UTF-8
        let result = resolve_with("base64://4=", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_file_resolver() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Hello, World!").unwrap();
        let key = format!("file:{}", file.path().display());

        let env = vars(&[]);
        let result = resolve_with(&key, &env, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "Hello, World!");
    }

    #[test]
    fn test_file_resolver_missing() {
        let env = vars(&[]);
        let err = resolve_with(
            "file:/definitely/not/here.txt",
            &env,
            PrefixMatching::CaseInsensitive,
        )
        .unwrap()
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Io { .. }));
    }

    #[test]
    fn test_now_and_utcnow() {
        let env = vars(&[]);
        let now = resolve_with("now", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(now.unwrap().unwrap(), "2024-03-09 14:05:07");

        let utc = resolve_with("UtcNow", &env, PrefixMatching::CaseInsensitive);
        assert_eq!(utc.unwrap().unwrap(), "2024-03-09 13:05:07");

        assert!(resolve_with("NOW", &env, PrefixMatching::CaseSensitive).is_none());
    }

    #[test]
    fn test_system_clock_format() {
        let text = SystemClock.utc_now().format(TIMESTAMP_FORMAT).to_string();
        let parsed = NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).unwrap();
        let drift = (Utc::now().naive_utc() - parsed).num_seconds().abs();
        assert!(drift <= 5);
    }

    #[test]
    fn test_register_custom_prefix() {
        let mut registry = ResolverRegistry::with_builtins();
        registry.register_fn("upper", |arg: &str, _ctx: &ResolverContext<'_>| {
            Ok(arg.to_uppercase())
        });

        let env = vars(&[]);
        let clock = fixed_clock();
        let ctx = ResolverContext {
            key: "upper:shout",
            env: &env,
            clock: &clock,
        };
        let result = registry.resolve(&ctx, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "SHOUT");
        assert!(registry.contains("upper"));
    }

    #[test]
    fn test_register_with_force() {
        let mut registry = ResolverRegistry::with_builtins();
        let replacement = Arc::new(FnResolver::prefix(
            "env",
            |_arg: &str, _ctx: &ResolverContext<'_>| Ok("replaced".to_string()),
        ));

        let err = registry
            .register_with_force(replacement.clone(), false)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Resolver { .. }));

        registry.register_with_force(replacement, true).unwrap();
        // Replaced in place, so priority is unchanged
        assert_eq!(registry.names()[0], "env");

        let env = vars(&[("X", "original")]);
        let clock = fixed_clock();
        let ctx = ResolverContext {
            key: "env:X",
            env: &env,
            clock: &clock,
        };
        let result = registry.resolve(&ctx, PrefixMatching::CaseInsensitive);
        assert_eq!(result.unwrap().unwrap(), "replaced");
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdef", 3), "abc...");
        assert_eq!(truncate_str("ééééé", 2), "éé...");
    }
}
