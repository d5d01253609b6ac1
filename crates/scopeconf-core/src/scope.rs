//! Scope chain
//!
//! A [`Scope`] is an immutable linked stack of object nodes. The top frame is
//! the current section; each frame below is an enclosing section, ending at
//! the document root. Pushing a section allocates one frame and shares the
//! rest, so sibling views never invalidate each other.

use std::sync::Arc;

use crate::value::{Object, Value};

#[derive(Debug)]
struct Frame {
    object: Object,
    /// Key under which `object` was found in its parent (`None` at the root)
    name: Option<String>,
    parent: Option<Arc<Frame>>,
}

/// Persistent stack of nested object scopes
#[derive(Debug, Clone)]
pub struct Scope {
    top: Arc<Frame>,
}

impl Scope {
    /// Create a scope chain containing only the document root
    pub fn root(object: Object) -> Self {
        Self {
            top: Arc::new(Frame {
                object,
                name: None,
                parent: None,
            }),
        }
    }

    /// Return a new chain with `object` pushed on top of this one
    pub fn push(&self, name: impl Into<String>, object: Object) -> Self {
        Self {
            top: Arc::new(Frame {
                object,
                name: Some(name.into()),
                parent: Some(Arc::clone(&self.top)),
            }),
        }
    }

    /// The chain without its top frame, or `None` at the root
    pub fn parent(&self) -> Option<Scope> {
        self.top
            .parent
            .as_ref()
            .map(|parent| Scope { top: Arc::clone(parent) })
    }

    /// The current (innermost) object
    pub fn object(&self) -> &Object {
        &self.top.object
    }

    /// Raw value stored under `key` in the current object only
    pub fn get_local(&self, key: &str) -> Option<&Value> {
        self.top.object.get(key)
    }

    /// Find the innermost scope holding `key`.
    ///
    /// Returns the chain truncated at the frame where the key was found,
    /// together with the raw value, so that the value can be expanded in the
    /// context it was defined in.
    pub fn find(&self, key: &str) -> Option<(Scope, &Value)> {
        let mut frame = &self.top;
        loop {
            if let Some(value) = frame.object.get(key) {
                return Some((Scope { top: Arc::clone(frame) }, value));
            }
            log::trace!("'{}' not in scope {}, trying parent", key, display_name(frame));
            frame = frame.parent.as_ref()?;
        }
    }

    /// Number of frames in the chain (the root counts as one)
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = &self.top;
        while let Some(parent) = &frame.parent {
            depth += 1;
            frame = parent;
        }
        depth
    }

    /// Dotted path of section names from the root, empty at the root
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut frame = Some(&self.top);
        while let Some(f) = frame {
            if let Some(name) = &f.name {
                names.push(name.as_str());
            }
            frame = f.parent.as_ref();
        }
        names.reverse();
        names.join(".")
    }
}

fn display_name(frame: &Frame) -> &str {
    frame.name.as_deref().unwrap_or("<root>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn object(entries: Vec<(&str, Value)>) -> Object {
        match Value::object(entries) {
            Value::Object(o) => o,
            _ => unreachable!(),
        }
    }

    fn nested() -> Scope {
        let inner = object(vec![("b", Value::from("inner-b"))]);
        let root = object(vec![
            ("a", Value::Object(Arc::clone(&inner))),
            ("b", Value::from("root-b")),
            ("c", Value::from("root-c")),
        ]);
        Scope::root(root).push("a", inner)
    }

    #[test]
    fn test_local_lookup_ignores_parents() {
        let scope = nested();
        assert_eq!(scope.get_local("b"), Some(&Value::from("inner-b")));
        assert_eq!(scope.get_local("c"), None);
    }

    #[test]
    fn test_find_prefers_innermost() {
        let scope = nested();
        let (found_in, value) = scope.find("b").unwrap();
        assert_eq!(value, &Value::from("inner-b"));
        assert_eq!(found_in.depth(), 2);
    }

    #[test]
    fn test_find_falls_back_to_parent() {
        let scope = nested();
        let (found_in, value) = scope.find("c").unwrap();
        assert_eq!(value, &Value::from("root-c"));
        assert_eq!(found_in.depth(), 1);
        assert_eq!(found_in.path(), "");
    }

    #[test]
    fn test_find_missing() {
        assert!(nested().find("zzz").is_none());
    }

    #[test]
    fn test_push_does_not_affect_siblings() {
        let root = Scope::root(object(vec![("x", Value::Integer(1))]));
        let left = root.push("left", object(vec![("y", Value::Integer(2))]));
        let right = root.push("right", object(vec![("y", Value::Integer(3))]));

        assert_eq!(left.get_local("y"), Some(&Value::Integer(2)));
        assert_eq!(right.get_local("y"), Some(&Value::Integer(3)));
        assert_eq!(root.depth(), 1);
        assert_eq!(left.parent().unwrap().get_local("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_path() {
        let root = Scope::root(object(vec![]));
        let deep = root.push("a", object(vec![])).push("b", object(vec![]));
        assert_eq!(deep.path(), "a.b");
        assert_eq!(deep.depth(), 3);
        assert!(root.parent().is_none());
    }
}
