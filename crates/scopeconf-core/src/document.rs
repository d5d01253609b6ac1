//! Document loading
//!
//! Turns JSON text (or a file holding it) into an immutable [`Object`] tree.
//! The root element must be an object, every number must fit in an `i64` and
//! an object may not repeat a key with a different value.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{Error, Result};
use crate::value::{Mapping, Object, Value};

/// Build a document from either a file path or JSON text.
///
/// If `input` names an existing file its contents are parsed, otherwise
/// `input` itself is parsed as JSON.
pub fn build(input: &str) -> Result<Object> {
    let path = Path::new(input);
    if path.is_file() {
        return load(path);
    }
    parse(input)
}

/// Read and parse a JSON document from a file
pub fn load(path: impl AsRef<Path>) -> Result<Object> {
    let path = path.as_ref();
    log::debug!("Loading configuration from {}", path.display());
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), &e))?;
    parse(&content)
}

/// Parse JSON text into a document
pub fn parse(text: &str) -> Result<Object> {
    let UniqueKeys(json) = serde_json::from_str(text).map_err(|e| {
        Error::structure(format!(
            "{} (line {}, column {})",
            e,
            e.line(),
            e.column()
        ))
    })?;
    from_json(json)
}

/// Convert an already-parsed JSON value into a document
pub fn from_json(json: serde_json::Value) -> Result<Object> {
    match json {
        serde_json::Value::Object(map) => convert_object(map),
        other => Err(Error::structure(format!(
            "root must be an object, found {}",
            json_kind(&other)
        ))
        .with_help("Wrap the configuration in a top-level JSON object")),
    }
}

/// Seed a document with string defaults.
///
/// Returns a new root where every default sits beneath the document's own
/// keys; a key present in `document` keeps its value.
pub fn merge_defaults<K, V>(document: &Object, defaults: impl IntoIterator<Item = (K, V)>) -> Object
where
    K: Into<String>,
    V: Into<String>,
{
    let mut merged: Mapping = defaults
        .into_iter()
        .map(|(k, v)| (k.into(), Value::String(v.into())))
        .collect();
    for (key, value) in document.iter() {
        merged.insert(key.clone(), value.clone());
    }
    Arc::new(merged)
}

fn convert_object(map: serde_json::Map<String, serde_json::Value>) -> Result<Object> {
    let mut mapping = Mapping::with_capacity(map.len());
    for (key, value) in map {
        let converted = convert(value).map_err(|e| e.with_path(key.clone()))?;
        mapping.insert(key, converted);
    }
    Ok(Arc::new(mapping))
}

fn convert(json: serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => {
                return Err(Error::structure(format!(
                    "number {} is not a 64-bit signed integer",
                    n
                )))
            }
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(convert)
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_json::Value::Object(map) => Value::Object(convert_object(map)?),
    })
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A JSON value whose objects were checked for conflicting duplicate keys.
///
/// `serde_json::Map` keeps the last of repeated keys, so the check has to
/// happen while the text is being read.
struct UniqueKeys(serde_json::Value);

impl<'de> Deserialize<'de> for UniqueKeys {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(UniqueKeysVisitor).map(UniqueKeys)
    }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
    type Value = serde_json::Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Null)
    }

    fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        // Kept as a number so conversion can report it as non-integer
        Ok(serde_json::Number::from_f64(v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::String(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(UniqueKeys(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(serde_json::Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = serde_json::Map::new();
        while let Some(key) = map.next_key::<String>()? {
            let UniqueKeys(value) = map.next_value()?;
            match object.get(&key) {
                // A repeat with the same value is harmless
                Some(existing) if *existing == value => {}
                Some(_) => {
                    return Err(de::Error::custom(format!(
                        "duplicate key '{}' with conflicting values",
                        key
                    )))
                }
                None => {
                    object.insert(key, value);
                }
            }
        }
        Ok(serde_json::Value::Object(object))
    }
}
