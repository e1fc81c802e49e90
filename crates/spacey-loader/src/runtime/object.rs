//! Script object representation.
//!
//! Objects are shared by reference: cloning an [`ObjectRef`] yields another
//! handle to the same property table, which is how module `exports`,
//! the loader's global object and cycle partners observe each other's
//! writes.

use super::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A script object.
#[derive(Debug, Clone, Default)]
pub struct Object {
    /// The properties
    properties: FxHashMap<String, Property>,
}

impl Object {
    /// Creates a new empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a property value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).map(|p| &p.value)
    }

    /// Sets an enumerable property value.
    pub fn set(&mut self, key: String, value: Value) {
        self.properties.insert(
            key,
            Property {
                value,
                enumerable: true,
            },
        );
    }

    /// Sets a property that is skipped by enumeration.
    pub fn define_hidden(&mut self, key: String, value: Value) {
        self.properties.insert(
            key,
            Property {
                value,
                enumerable: false,
            },
        );
    }

    /// Deletes a property.
    pub fn delete(&mut self, key: &str) -> bool {
        self.properties.remove(key).is_some()
    }

    /// Checks if a property exists, enumerable or not.
    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Own enumerable properties.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, p)| (k, &p.value))
    }
}

/// A property slot.
#[derive(Debug, Clone)]
pub struct Property {
    /// The property value
    pub value: Value,
    /// Whether the property shows up in enumeration
    pub enumerable: bool,
}

/// Shared handle to an [`Object`].
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    /// Creates a handle to a new empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing object.
    pub fn from_object(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    /// Builds an object from enumerable key/value pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut object = Object::new();
        for (key, value) in pairs {
            object.set(key.into(), value);
        }
        Self::from_object(object)
    }

    /// Reads a property, `undefined` when absent.
    pub fn get(&self, key: &str) -> Value {
        self.0.read().get(key).cloned().unwrap_or_default()
    }

    /// Writes an enumerable property.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.write().set(key.into(), value);
    }

    /// Writes a non-enumerable property.
    pub fn define_hidden(&self, key: impl Into<String>, value: Value) {
        self.0.write().define_hidden(key.into(), value);
    }

    /// Deletes a property.
    pub fn delete(&self, key: &str) -> bool {
        self.0.write().delete(key)
    }

    /// Checks if a property exists.
    pub fn has(&self, key: &str) -> bool {
        self.0.read().has(key)
    }

    /// Own enumerable keys.
    pub fn keys(&self) -> Vec<String> {
        self.0.read().entries().map(|(k, _)| k.clone()).collect()
    }

    /// Copies out the own enumerable properties.
    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.0
            .read()
            .entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of own enumerable properties.
    pub fn len(&self) -> usize {
        self.0.read().entries().count()
    }

    /// Whether the object has no enumerable properties.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for ObjectRef {
    // Objects may reference themselves; only print the keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        write!(f, "Object {{ {} }}", keys.join(", "))
    }
}
