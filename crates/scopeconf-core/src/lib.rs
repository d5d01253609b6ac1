//! scopeconf-core: Scoped JSON configuration reader
//!
//! This crate loads a JSON document and reads values from it through a chain
//! of nested sections, expanding `${...}` placeholders on every read.
//! Placeholders can reference other keys (searched from the current section
//! outwards), environment variables, files, base64 payloads and the clock.
//!
//! # Example
//!
//! ```rust
//! use scopeconf_core::ConfigReader;
//!
//! let json = r#"{
//!     "name": "app",
//!     "database": {
//!         "host": "localhost",
//!         "url": "postgres://${host}/${name}"
//!     }
//! }"#;
//!
//! let config = ConfigReader::from_json(json).unwrap();
//! assert_eq!(config.get_string(&["database", "url"]), "postgres://localhost/app");
//! ```

pub mod document;
pub mod error;
pub mod interpolation;
pub mod resolver;
pub mod scope;
pub mod value;

mod config;

pub use config::{ConfigOptions, ConfigReader, ObjectLeaf, DEFAULT_MAX_DEPTH};
pub use error::{Error, ErrorKind, Result};
pub use interpolation::PrefixMatching;
pub use resolver::{
    Clock, Environment, FixedClock, FnResolver, ProcessEnvironment, Resolver, ResolverContext,
    ResolverRegistry, SystemClock, Trigger,
};
pub use scope::Scope;
pub use value::{Mapping, Object, Value};
