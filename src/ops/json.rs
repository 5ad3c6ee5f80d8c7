//! JSON conversion operators
//!
//! `json()` on text is lenient: single quotes are normalised to double quotes
//! before parsing, and a parse failure yields `None` rather than an error.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// `JSON.stringify` caps indentation at ten spaces
const MAX_INDENT: usize = 10;

/// Parsing operators on text
pub trait TextOps {
    fn json(&self) -> Option<serde_json::Value>;

    /// Parse into a concrete type; the type acts as the hint.
    fn json_as<T: DeserializeOwned>(&self) -> Option<T>;
}

impl TextOps for str {
    fn json(&self) -> Option<serde_json::Value> {
        self.json_as()
    }

    fn json_as<T: DeserializeOwned>(&self) -> Option<T> {
        let normalized = self.replace('\'', "\"");
        serde_json::from_str(&normalized).ok()
    }
}

/// Serialisation operator on structured values
pub trait StructuredOps {
    /// Compact output unless `indent` is a positive width.
    fn to_json(&self, indent: Option<usize>) -> serde_json::Result<String>;
}

impl<T: Serialize + ?Sized> StructuredOps for T {
    fn to_json(&self, indent: Option<usize>) -> serde_json::Result<String> {
        match indent {
            Some(width) if width > 0 => {
                let pad = " ".repeat(width.min(MAX_INDENT));
                let mut buf = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
                let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
                self.serialize(&mut serializer)?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            _ => serde_json::to_string(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        a: i64,
    }

    #[test]
    fn test_single_quotes_are_normalized() {
        assert_eq!("{'a':1}".json(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_invalid_json_is_none() {
        assert_eq!("not json".json(), None);
        assert_eq!("{'a':".json(), None);
    }

    #[test]
    fn test_typed_parse() {
        assert_eq!("{'a': 7}".json_as::<Entry>(), Some(Entry { a: 7 }));
        assert_eq!("{'b': 7}".json_as::<Entry>(), None);
    }

    #[test]
    fn test_to_json_compact_and_indented() {
        let value = json!({"a": [1, 2]});
        assert_eq!(value.to_json(None).unwrap(), r#"{"a":[1,2]}"#);
        assert_eq!(value.to_json(Some(0)).unwrap(), r#"{"a":[1,2]}"#);
        assert_eq!(
            value.to_json(Some(2)).unwrap(),
            "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );
    }

    #[test]
    fn test_indent_is_capped() {
        let text = json!([1]).to_json(Some(40)).unwrap();
        assert_eq!(text, format!("[\n{}1\n]", " ".repeat(10)));
    }
}
