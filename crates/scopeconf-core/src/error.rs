//! Error types for scopeconf
//!
//! Errors carry the key being resolved, an optional cause and an actionable
//! help message. Any error raised while expanding a placeholder aborts the
//! whole expansion.

use std::fmt;

/// Result type alias for scopeconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scopeconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Key whose resolution failed (e.g., "database.url")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// The document is not valid JSON or has the wrong shape
    #[error("Invalid document structure")]
    Structure,
    /// A placeholder key could not be found in any enclosing scope
    #[error("Key not found: {key}")]
    NotFound { key: String },
    /// A placeholder needed a value of a different kind
    #[error("Expected {expected} for '{key}', found {found}")]
    Type {
        key: String,
        expected: String,
        found: String,
    },
    /// Placeholder resolution nested deeper than the configured limit
    #[error("Circular reference detected")]
    Cycle { chain: Vec<String> },
    /// A file could not be read
    #[error("Failed to read file: {path}")]
    Io { path: String },
    /// A payload could not be decoded
    #[error("Decode error")]
    Decode,
    /// A pluggable resolver failed or could not be registered
    #[error("Resolver '{resolver}' error: {message}")]
    Resolver { resolver: String, message: String },
}

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create a structure error (malformed or wrong-shaped document)
    pub fn structure(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::Structure)
        }
    }

    /// Create a not found error for a placeholder key
    pub fn not_found(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            help: Some(format!(
                "Define '{}' in this section or one of its parents",
                key
            )),
            ..Self::from_kind(ErrorKind::NotFound { key })
        }
    }

    /// Create a type error
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        let expected = expected.into();
        Self {
            help: Some(format!("Store the referenced value as a {}", expected)),
            ..Self::from_kind(ErrorKind::Type {
                key: key.into(),
                expected,
                found: found.into(),
            })
        }
    }

    /// Create a cycle error from the chain of keys being resolved
    pub fn cycle(chain: Vec<String>) -> Self {
        let cause = format!("Chain: {}", chain.join(" → "));
        Self {
            help: Some("Break the circular dependency by removing one of the references".into()),
            cause: Some(cause),
            ..Self::from_kind(ErrorKind::Cycle { chain })
        }
    }

    /// Create an I/O error for a file path
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self {
            help: Some("Check that the file exists and is readable".into()),
            cause: Some(err.to_string()),
            ..Self::from_kind(ErrorKind::Io { path: path.into() })
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::Decode)
        }
    }

    /// Create a custom resolver error
    pub fn resolver(resolver: impl Into<String>, message: impl Into<String>) -> Self {
        let resolver = resolver.into();
        Self {
            help: Some(format!("Check the '{}' resolver implementation", resolver)),
            ..Self::from_kind(ErrorKind::Resolver {
                resolver,
                message: message.into(),
            })
        }
    }

    /// Create a resolver already registered error
    pub fn resolver_already_registered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            help: Some(format!(
                "Use register_with_force(..., true) to override the '{}' resolver",
                name
            )),
            ..Self::from_kind(ErrorKind::Resolver {
                resolver: name,
                message: "already registered".into(),
            })
        }
    }

    /// Add path context to the error, keeping the innermost one
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
