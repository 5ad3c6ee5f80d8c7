//! Runtime values
//!
//! Values are reference counted and single-threaded; an invocation never
//! shares them across threads. Only display strings leave the interpreter.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ops::sequence::Grouping;
use crate::sandbox::interp::Closure;
use crate::source::content::LineStream;

pub type Object = IndexMap<String, Value>;
pub type Group = Grouping<ValueKey, Value>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    /// Result of `groupBy`: iterable like an array, with a read-only `key`.
    Group(Rc<Group>),
    Object(Rc<Object>),
    Function(Rc<Closure>),
    /// Global host function such as `parseInt`
    Native(&'static str),
    /// Single-pass lazy line stream (`linesAsync`)
    Stream(Rc<RefCell<Option<LineStream>>>),
    /// The bound `doc` object
    Document,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Group(group) => f
                .debug_struct("Group")
                .field("key", group.key().value())
                .field("items", &group.items())
                .finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(_) => f.write_str("[function]"),
            Value::Native(name) => write!(f, "[native {}]", name),
            Value::Stream(_) => f.write_str("[stream]"),
            other => write!(f, "{}", other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Option<Value>> for Value {
    fn from(value: Option<Value>) -> Self {
        value.unwrap_or(Value::Undefined)
    }
}

impl Value {
    pub fn strings(items: impl IntoIterator<Item = String>) -> Self {
        Value::from(items.into_iter().map(Value::from).collect::<Vec<_>>())
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::from(items.into_iter().map(Value::from_json).collect::<Vec<_>>())
            }
            serde_json::Value::Object(map) => Value::Object(Rc::new(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            )),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
            _ => "object",
        }
    }

    /// Sequence view of arrays and groups.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            Value::Group(group) => Some(group.items()),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.as_slice().is_some()
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Document, Value::Document) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Group(a), Value::Group(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`: nullish values are equal to each other, primitives coerce to numbers.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Str(_), Value::Str(_)) => self.strict_equals(other),
            (
                Value::Number(_) | Value::Str(_) | Value::Bool(_),
                Value::Number(_) | Value::Str(_) | Value::Bool(_),
            ) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// Relational comparison: strings lexically, everything else numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// Key with SameValueZero-like equality for `distinct` and `groupBy`.
    pub fn key(&self) -> ValueKey {
        let repr = match self {
            Value::Undefined => "u".to_string(),
            Value::Null => "z".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Number(n) => format!("n:{}", format_number(*n)),
            Value::Str(s) => format!("s:{}", s),
            Value::Native(name) => format!("f:{}", name),
            Value::Function(f) => format!("f:{:p}", Rc::as_ptr(f)),
            Value::Stream(s) => format!("r:{:p}", Rc::as_ptr(s)),
            other => format!("j:{}", other.to_json_text()),
        };
        ValueKey {
            repr,
            value: self.clone(),
        }
    }

    /// Ordering key for `sortBy`; `None` for absent values.
    pub fn sort_key(&self) -> Option<SortKey> {
        match self {
            Value::Undefined | Value::Null => None,
            Value::Number(n) => Some(SortKey::Number(*n)),
            Value::Bool(_) => Some(SortKey::Number(self.to_number())),
            Value::Str(s) => Some(SortKey::Text(s.clone())),
            other => Some(SortKey::Text(Rc::from(other.to_string()))),
        }
    }

    pub fn to_json_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

/// Number display: integral values without a fraction, `-0` as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Array(_) | Value::Group(_) => {
                let items = self.as_slice().unwrap_or_default();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str(&self.to_json_text()),
            Value::Function(_) | Value::Native(_) => f.write_str("[function]"),
            Value::Stream(_) => f.write_str("[object AsyncGenerator]"),
            Value::Document => f.write_str("[object Document]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Array(_) | Value::Group(_) => {
                let items = self.as_slice().unwrap_or_default();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let visible = map
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_)));
                let mut out = serializer.serialize_map(None)?;
                for (k, v) in visible {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            _ => serializer.serialize_unit(),
        }
    }
}

/// Hash key that remembers the value it was derived from.
#[derive(Debug, Clone)]
pub struct ValueKey {
    repr: String,
    value: Value,
}

impl ValueKey {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

/// Present sort key. Numbers order before text and NaN after every other
/// number, so any mix of keys has a total order.
#[derive(Debug, Clone)]
pub enum SortKey {
    Number(f64),
    Text(Rc<str>),
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}
