//! Module namespace objects.

use super::object::ObjectRef;
use super::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Property a raw export carries to say "my own keys are my named exports".
pub const ES_MODULE_MARKER: &str = "__esModule";

/// The resolved exports of a module.
///
/// A namespace either carries named bindings directly, or wraps a single
/// raw value as its `default` binding (the synthetic default-export form).
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    /// Exported bindings by name
    bindings: FxHashMap<String, Value>,
    /// Whether this namespace is a wrapper around one `default` value
    use_default: bool,
}

impl Namespace {
    /// An empty namespace with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A namespace with named bindings.
    pub fn from_bindings<I>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            bindings: bindings.into_iter().collect(),
            use_default: false,
        }
    }

    /// A synthetic namespace exposing `value` as `default`.
    pub fn with_default(value: Value) -> Self {
        let mut bindings = FxHashMap::default();
        bindings.insert("default".to_string(), value);
        Self {
            bindings,
            use_default: true,
        }
    }

    /// Normalizes a raw execution result into a namespace.
    ///
    /// Module sentinels pass through; objects marked as ES modules have
    /// their properties promoted to named bindings; anything else becomes
    /// the default export.
    pub fn from_value(value: Value) -> Arc<Namespace> {
        match value {
            Value::Module(ns) => ns,
            Value::Object(obj) if obj.get(ES_MODULE_MARKER).to_boolean() => Arc::new(
                Self::from_bindings(
                    obj.snapshot()
                        .into_iter()
                        .filter(|(k, _)| k != ES_MODULE_MARKER),
                ),
            ),
            other => Arc::new(Self::with_default(other)),
        }
    }

    /// Reads a binding.
    pub fn get(&self, key: &str) -> Value {
        self.bindings.get(key).cloned().unwrap_or_default()
    }

    /// The `default` binding.
    pub fn default_export(&self) -> Value {
        self.get("default")
    }

    /// Whether this is a synthetic default-export wrapper.
    pub fn uses_default(&self) -> bool {
        self.use_default
    }

    /// Binding names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The value a dependent module sees when this module is injected.
    ///
    /// Default wrappers unwrap to their default value; named namespaces are
    /// exposed as an object carrying the ES module marker.
    pub fn to_value(&self) -> Value {
        if self.use_default {
            return self.default_export();
        }
        let obj = ObjectRef::from_pairs(self.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        obj.define_hidden(ES_MODULE_MARKER, Value::Boolean(true));
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_becomes_default() {
        let ns = Namespace::from_value(Value::from("hello"));
        assert!(ns.uses_default());
        assert_eq!(ns.default_export(), Value::from("hello"));
        assert_eq!(ns.to_value(), Value::from("hello"));
    }

    #[test]
    fn test_es_module_marker_promotes_bindings() {
        let raw = Value::object([
            (ES_MODULE_MARKER, Value::Boolean(true)),
            ("answer", Value::from(42.0)),
        ]);
        let ns = Namespace::from_value(raw);

        assert!(!ns.uses_default());
        assert_eq!(ns.keys(), vec!["answer".to_string()]);
        assert_eq!(ns.get("answer"), Value::from(42.0));
    }

    #[test]
    fn test_module_sentinel_passes_through() {
        let ns = Arc::new(Namespace::from_bindings([("a".to_string(), Value::Null)]));
        let same = Namespace::from_value(Value::Module(Arc::clone(&ns)));
        assert!(Arc::ptr_eq(&ns, &same));
    }

    #[test]
    fn test_named_namespace_injects_marked_object() {
        let ns = Namespace::from_bindings([("x".to_string(), Value::from(1.0))]);
        let value = ns.to_value();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.get("x"), Value::from(1.0));
        assert_eq!(obj.get(ES_MODULE_MARKER), Value::Boolean(true));
        assert_eq!(obj.keys(), vec!["x".to_string()]);
    }
}
