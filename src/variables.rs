//! Variable bags passed alongside a query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::LoaderError;

/// The parameter bag accompanying a query.
///
/// Variables are compared by deep structural equality, never by identity: key
/// order does not matter, and nested objects, arrays, and scalars are compared
/// recursively.
///
/// # Examples
///
/// ```
/// use query_loader::Variables;
/// use serde_json::json;
///
/// let a = Variables::try_from(json!({ "id": "42", "first": 10 })).unwrap();
/// let b = Variables::try_from(json!({ "first": 10, "id": "42" })).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_canonical_string(), r#"{"first":10,"id":"42"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(Map<String, Value>);

impl Variables {
    /// An empty variable bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style [`Variables::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns true if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the variables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.0.iter()
    }

    /// Borrow the underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// JSON encoding with object keys sorted at every level.
    ///
    /// Structurally equal bags always produce the same string, so this is
    /// usable as part of a cache key.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        write_canonical_object(&self.0, &mut out);
        out
    }
}

// Keys are sorted here rather than relying on `Map` being a `BTreeMap`: any
// crate in the build enabling `serde_json/preserve_order` turns it into an
// insertion-ordered map.
fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl From<Map<String, Value>> for Variables {
    fn from(map: Map<String, Value>) -> Self {
        Variables(map)
    }
}

impl TryFrom<Value> for Variables {
    type Error = LoaderError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Variables(map)),
            Value::Null => Err(LoaderError::InvalidVariables { found: "null" }),
            Value::Bool(_) => Err(LoaderError::InvalidVariables { found: "a boolean" }),
            Value::Number(_) => Err(LoaderError::InvalidVariables { found: "a number" }),
            Value::String(_) => Err(LoaderError::InvalidVariables { found: "a string" }),
            Value::Array(_) => Err(LoaderError::InvalidVariables { found: "an array" }),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Variables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Variables(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
