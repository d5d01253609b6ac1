//! Scoped configuration reader
//!
//! [`ConfigReader`] is a view of a document through a chain of nested
//! sections. Every read expands `${...}` placeholders afresh, so values that
//! come from the environment, files or the clock always reflect current
//! state. Nothing is cached.

use std::fmt;
use std::path::{Path, MAIN_SEPARATOR};
use std::sync::Arc;

use crate::document;
use crate::error::{Error, Result};
use crate::interpolation::{self, PrefixMatching, Segment};
use crate::resolver::{
    Clock, Environment, ProcessEnvironment, Resolver, ResolverContext, ResolverRegistry,
    SystemClock,
};
use crate::scope::Scope;
use crate::value::{Mapping, Object, Value};

/// Default limit on nested placeholder lookups
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// What a direct read of a key holding an object yields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObjectLeaf {
    /// The key reads as absent: `get` returns `Ok(None)` and a placeholder
    /// naming it fails with a not found error
    #[default]
    Absent,
    /// The key reads as null, so a placeholder naming it expands to `""`
    Null,
}

/// Options controlling placeholder resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigOptions {
    /// How resolver prefixes (`env:`, `file:`, ...) and keywords are matched
    pub prefix_matching: PrefixMatching,
    /// How keys holding objects read; use [`ConfigReader::section`] to
    /// navigate into them
    pub object_leaf: ObjectLeaf,
    /// Maximum number of nested lookups before resolution fails with a
    /// cycle error
    pub max_depth: usize,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            prefix_matching: PrefixMatching::CaseInsensitive,
            object_leaf: ObjectLeaf::Absent,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConfigOptions {
    /// Options matching the legacy reader: resolver prefixes are case
    /// sensitive and objects read as null
    pub fn legacy() -> Self {
        Self {
            prefix_matching: PrefixMatching::CaseSensitive,
            object_leaf: ObjectLeaf::Null,
            ..Self::default()
        }
    }

    pub fn with_prefix_matching(mut self, matching: PrefixMatching) -> Self {
        self.prefix_matching = matching;
        self
    }

    pub fn with_object_leaf(mut self, leaf: ObjectLeaf) -> Self {
        self.object_leaf = leaf;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// State shared by a reader and every section derived from it
#[derive(Clone)]
struct Shared {
    resolvers: ResolverRegistry,
    options: ConfigOptions,
    env: Arc<dyn Environment>,
    clock: Arc<dyn Clock>,
}

/// A view of a configuration document scoped to one section
#[derive(Clone)]
pub struct ConfigReader {
    scope: Scope,
    shared: Arc<Shared>,
}

impl ConfigReader {
    /// Create a reader over a document root
    pub fn new(root: Object) -> Self {
        Self::with_options(root, ConfigOptions::default())
    }

    /// Create a reader with custom options
    pub fn with_options(root: Object, options: ConfigOptions) -> Self {
        Self::with_resolvers(root, ResolverRegistry::with_builtins(), options)
    }

    /// Create a reader with a custom resolver registry
    pub fn with_resolvers(
        root: Object,
        resolvers: ResolverRegistry,
        options: ConfigOptions,
    ) -> Self {
        Self {
            scope: Scope::root(root),
            shared: Arc::new(Shared {
                resolvers,
                options,
                env: Arc::new(ProcessEnvironment),
                clock: Arc::new(SystemClock),
            }),
        }
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(document::parse(json)?))
    }

    /// Load configuration from a JSON string with options
    pub fn from_json_with_options(json: &str, options: ConfigOptions) -> Result<Self> {
        Ok(Self::with_options(document::parse(json)?, options))
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(document::load(path)?))
    }

    /// Load configuration from a file path if one exists, otherwise parse
    /// `input` as JSON text
    pub fn build(input: &str) -> Result<Self> {
        Ok(Self::new(document::build(input)?))
    }

    /// Like [`ConfigReader::build`], seeding the root with string defaults.
    ///
    /// Keys present in the document win over defaults.
    pub fn build_with_defaults<K, V>(
        input: &str,
        defaults: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let parsed = document::build(input)?;
        Ok(Self::new(document::merge_defaults(&parsed, defaults)))
    }

    /// Replace the environment variable source
    pub fn with_environment(self, env: impl Environment + 'static) -> Self {
        self.map_shared(|shared| shared.env = Arc::new(env))
    }

    /// Replace the time source
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        self.map_shared(|shared| shared.clock = Arc::new(clock))
    }

    /// Register a custom resolver.
    ///
    /// Custom resolvers are consulted after the built-ins. Fails if a
    /// resolver with the same name and trigger exists. Sections created
    /// before this call keep the registry they were created with.
    pub fn register_resolver(&mut self, resolver: Arc<dyn Resolver>) -> Result<()> {
        self.register_resolver_with_force(resolver, false)
    }

    /// Register a custom resolver, replacing an existing one if `force` is set
    pub fn register_resolver_with_force(
        &mut self,
        resolver: Arc<dyn Resolver>,
        force: bool,
    ) -> Result<()> {
        Arc::make_mut(&mut self.shared)
            .resolvers
            .register_with_force(resolver, force)
    }

    fn map_shared(mut self, f: impl FnOnce(&mut Shared)) -> Self {
        f(Arc::make_mut(&mut self.shared));
        self
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.shared.options
    }

    /// Dotted path of this section from the document root
    pub fn path(&self) -> String {
        self.scope.path()
    }

    /// Keys defined directly in this section
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.scope.object().keys().map(String::as_str)
    }

    /// Get the resolved value of a key defined in this section.
    ///
    /// Returns `Ok(None)` if the key is absent, as opposed to
    /// `Ok(Some(Value::Null))` for an explicit null. A key holding an object
    /// reads as [`ConfigOptions::object_leaf`] says; use
    /// [`ConfigReader::section`] to navigate into it.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.lookup(key, false)
    }

    /// Like [`ConfigReader::get`], falling back to enclosing sections
    pub fn get_recursive(&self, key: &str) -> Result<Option<Value>> {
        self.lookup(key, true)
    }

    /// Look up a key, optionally falling back to enclosing sections
    pub fn lookup(&self, key: &str, recurse: bool) -> Result<Option<Value>> {
        Expander::new(&self.shared).lookup(&self.scope, key, recurse)
    }

    /// Get a nested section.
    ///
    /// Only this section is searched; returns `None` if the key is absent or
    /// does not hold an object.
    pub fn section(&self, key: &str) -> Option<ConfigReader> {
        let object = self.scope.get_local(key)?.as_object()?;
        log::debug!("Entering section '{}' under '{}'", key, self.scope.path());
        Some(Self {
            scope: self.scope.push(key, Arc::clone(object)),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Get a value as a string, descending through sections.
    ///
    /// The last key is looked up in the section reached by the keys before
    /// it. Returns an empty string if any section or the key is missing, if
    /// the value is null, or if resolution fails (the error is logged).
    pub fn get_string(&self, keys: &[&str]) -> String {
        match self.try_get_string(keys) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to resolve {:?}: {}", keys, e);
                String::new()
            }
        }
    }

    /// Like [`ConfigReader::get_string`], but propagates resolution errors
    pub fn try_get_string(&self, keys: &[&str]) -> Result<String> {
        match keys {
            [] => Ok(String::new()),
            [key] => Ok(self
                .get(key)?
                .map(|value| value.to_placeholder_text())
                .unwrap_or_default()),
            [first, rest @ ..] => match self.section(first) {
                Some(section) => section.try_get_string(rest),
                None => Ok(String::new()),
            },
        }
    }

    /// Expand placeholders in arbitrary text as if it were a value of this
    /// section
    pub fn expand_str(&self, text: &str) -> Result<String> {
        Expander::new(&self.shared).expand_str(&self.scope, text)
    }

    /// Resolve every value in this section.
    ///
    /// Objects are descended into as sections, so placeholders inside them
    /// see their enclosing sections.
    pub fn resolve_all(&self) -> Result<Value> {
        let mut resolved = Mapping::new();
        for key in self.keys() {
            let value = match self.section(key) {
                Some(section) => section.resolve_all()?,
                None => self.get(key)?.unwrap_or_default(),
            };
            resolved.insert(key.to_string(), value);
        }
        Ok(Value::from(resolved))
    }
}

impl fmt::Debug for ConfigReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigReader")
            .field("path", &self.scope.path())
            .field("depth", &self.scope.depth())
            .field("options", &self.shared.options)
            .field("resolvers", &self.shared.resolvers.names())
            .finish()
    }
}

/// Strip one trailing path separator and append exactly one
fn with_trailing_separator(path: &str) -> String {
    let mut chars = path.chars();
    let trimmed = match chars.next_back() {
        Some(c) if std::path::is_separator(c) => chars.as_str(),
        _ => path,
    };
    format!("{}{}", trimmed, MAIN_SEPARATOR)
}

/// One resolution pass.
///
/// Tracks the chain of keys being looked up so runaway self references
/// fail with a cycle error instead of exhausting the stack.
struct Expander<'a> {
    shared: &'a Shared,
    chain: Vec<String>,
}

impl<'a> Expander<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            chain: Vec::new(),
        }
    }

    fn lookup(&mut self, scope: &Scope, key: &str, recurse: bool) -> Result<Option<Value>> {
        let found = if recurse {
            scope.find(key)
        } else {
            scope.get_local(key).map(|raw| (scope.clone(), raw))
        };

        match found {
            Some((_, raw))
                if raw.is_object() && self.shared.options.object_leaf == ObjectLeaf::Absent =>
            {
                Ok(None)
            }
            // Expand against the scope the key was defined in
            Some((owner, raw)) => self.expand(&owner, raw).map(Some),
            None => Ok(None),
        }
    }

    fn expand(&mut self, scope: &Scope, value: &Value) -> Result<Value> {
        match value {
            Value::Object(_) => Ok(Value::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| self.expand(scope, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::String(s) => self.expand_str(scope, s).map(Value::String),
            other => Ok(other.clone()),
        }
    }

    fn expand_str(&mut self, scope: &Scope, text: &str) -> Result<String> {
        if !interpolation::contains_placeholder(text) {
            return Ok(text.to_string());
        }

        let mut result = String::with_capacity(text.len());
        for segment in interpolation::parse(text) {
            match segment {
                Segment::Literal(s) => result.push_str(s),
                Segment::Placeholder(key) => {
                    let resolved = self.resolve_placeholder(scope, key)?;
                    result.push_str(&resolved);
                }
            }
        }
        Ok(result)
    }

    fn resolve_placeholder(&mut self, scope: &Scope, key: &str) -> Result<String> {
        let shared = self.shared;
        let ctx = ResolverContext {
            key,
            env: shared.env.as_ref(),
            clock: shared.clock.as_ref(),
        };
        if let Some(result) = shared
            .resolvers
            .resolve(&ctx, shared.options.prefix_matching)
        {
            return result;
        }

        if let Some(name) = interpolation::path_key(key) {
            return match self.nested(scope, name)? {
                Some(Value::String(path)) => Ok(with_trailing_separator(&path)),
                Some(other) => Err(Error::type_mismatch(name, "string", other.type_name())),
                None => Err(Error::not_found(name)),
            };
        }

        match self.nested(scope, key)? {
            Some(value) => Ok(value.to_placeholder_text()),
            None => Err(Error::not_found(key)),
        }
    }

    fn nested(&mut self, scope: &Scope, key: &str) -> Result<Option<Value>> {
        if self.chain.len() >= self.shared.options.max_depth {
            let mut chain = self.chain.clone();
            chain.push(key.to_string());
            return Err(Error::cycle(chain).with_path(key));
        }

        log::trace!("Looking up '{}' from scope '{}'", key, scope.path());
        self.chain.push(key.to_string());
        let result = self.lookup(scope, key, true);
        self.chain.pop();
        result
    }
}
