//! Dot-delimited path expressions, as used by string-keyed watches.

use std::fmt;

use crate::error::Error;
use crate::value::{Key, Value};

/// A parsed `a.b.0.c` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGetter {
    path: String,
    segments: Vec<String>,
}

impl PathGetter {
    /// Parse a path. Only identifier characters, digits, `$`, `_` and `.` are
    /// accepted.
    pub fn parse(path: &str) -> Result<Self, Error> {
        let valid = path
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
        if !valid {
            return Err(Error::InvalidPath(path.to_string()));
        }
        Ok(Self {
            path: path.to_string(),
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    /// Walk the path from `root`. Object properties are read tracked.
    ///
    /// Yields `Null` as soon as a segment cannot be followed.
    pub fn resolve(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            let next = match &current {
                Value::Object(object) => object.get(segment),
                Value::Array(array) => Key::from(segment.as_str())
                    .as_index()
                    .and_then(|index| array.get(index)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Value::Null,
            }
        }
        current
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for PathGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_properties_and_indices() {
        let data = Value::from(json!({ "a": { "list": [ { "c": 3 } ] }, "$x": 1 }));

        let getter = PathGetter::parse("a.list.0.c").unwrap();
        assert_eq!(getter.resolve(&data).as_f64(), Some(3.0));
        assert_eq!(getter.path(), "a.list.0.c");

        let dollar = PathGetter::parse("$x").unwrap();
        assert_eq!(dollar.resolve(&data).as_f64(), Some(1.0));
    }

    #[test]
    fn missing_segments_resolve_to_null() {
        let data = Value::from(json!({ "a": 1 }));
        assert!(PathGetter::parse("b.c").unwrap().resolve(&data).is_null());
        assert!(PathGetter::parse("a.b").unwrap().resolve(&data).is_null());
    }

    #[test]
    fn rejects_expressions() {
        assert!(matches!(PathGetter::parse("a + b"), Err(Error::InvalidPath(_))));
        assert!(PathGetter::parse("a[0]").is_err());
        assert!(PathGetter::parse("a-b").is_err());
    }
}
