//! Placeholder parsing
//!
//! Splits strings like `host=${db_host}:${env:PORT:5432}` into literal text
//! and `${...}` placeholders, and classifies placeholder keys:
//! - `${name}` - key lookup through the scope chain
//! - `${name/}` - key lookup normalized as a directory path
//! - `${prefix:arg}` / `${keyword}` - resolver call (decided by the registry)
//!
//! A placeholder key is any non-empty run of characters other than `}`.
//! Placeholders do not nest and are never re-scanned after substitution.

use std::sync::OnceLock;

use regex::Regex;

/// A piece of a parsed string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied through unchanged
    Literal(&'a str),
    /// The key between `${` and `}`
    Placeholder(&'a str),
}

/// How resolver prefixes and keywords are compared with placeholder keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrefixMatching {
    /// `ENV:`, `Env:` and `env:` all select the env resolver
    #[default]
    CaseInsensitive,
    /// Only the exact lowercase spelling selects a resolver
    CaseSensitive,
}

impl PrefixMatching {
    /// Compare a keyword such as `now` against a whole key
    pub fn matches(self, key: &str, keyword: &str) -> bool {
        match self {
            PrefixMatching::CaseInsensitive => key.eq_ignore_ascii_case(keyword),
            PrefixMatching::CaseSensitive => key == keyword,
        }
    }

    /// If `key` starts with `prefix` followed by `:`, return the remainder
    pub fn strip_prefix<'a>(self, key: &'a str, prefix: &str) -> Option<&'a str> {
        let head = key.get(..prefix.len())?;
        let rest = &key[prefix.len()..];
        let rest = rest.strip_prefix(':')?;
        self.matches(head, prefix).then_some(rest)
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{(?<key>[^}]+)\}").expect("placeholder pattern is valid"))
}

/// Split a string into literal and placeholder segments
pub fn parse(input: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(input) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.name("key")) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Literal(&input[last..whole.start()]));
        }
        segments.push(Segment::Placeholder(key.as_str()));
        last = whole.end();
    }

    if last < input.len() {
        segments.push(Segment::Literal(&input[last..]));
    }

    segments
}

/// Check if a string contains any `${...}` placeholder
pub fn contains_placeholder(input: &str) -> bool {
    placeholder_regex().is_match(input)
}

/// If the key uses the trailing-slash path form, return the key without it
pub fn path_key(key: &str) -> Option<&str> {
    key.strip_suffix('/')
}

/// Split an `env` argument into variable name and optional default.
///
/// The default is whatever follows the last `:`, so `A:B:C` names the
/// variable `A:B` with default `C`.
pub fn split_env_arg(arg: &str) -> (&str, Option<&str>) {
    match arg.rsplit_once(':') {
        Some((name, default)) => (name, Some(default)),
        None => (arg, None),
    }
}
