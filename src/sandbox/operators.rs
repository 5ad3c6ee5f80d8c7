//! Operator bindings
//!
//! Maps operator calls on runtime values onto [`SequenceOps`], [`TextOps`]
//! and [`StructuredOps`]. Selectors and predicates are query functions;
//! their failures abort the operator unchanged.

use std::rc::Rc;

use crate::core::error::QueryError;
use crate::ops::json::{StructuredOps, TextOps};
use crate::ops::library::Receiver;
use crate::ops::sequence::SequenceOps;
use crate::sandbox::interp::Interpreter;
use crate::sandbox::value::{SortKey, Value};

type EResult<T> = Result<T, QueryError>;

const EMPTY_SEQUENCE: &str = "Sequence contains no elements";
const NO_MATCH: &str = "No element satisfies the predicate.";

/// Dispatch an installed operator; `None` when no operator applies.
pub fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> EResult<Option<Value>> {
    let library = interp.library();
    match receiver {
        Value::Str(text) if library.provides(Receiver::Text, name) => {
            Ok(Some(text_operator(text, name)))
        }
        Value::Stream(_) if library.knows(name) => Err(QueryError::execution(format!(
            "{}() needs a materialised sequence; call toArray() first",
            name
        ))),
        _ => {
            if let Some(items) = receiver.as_slice() {
                if library.provides(Receiver::Sequence, name) {
                    return sequence_operator(interp, items, name, args).map(Some);
                }
            }
            if !matches!(receiver, Value::Str(_))
                && library.provides(Receiver::Structured, name)
            {
                return structured_operator(receiver, name, args).map(Some);
            }
            Ok(None)
        }
    }
}

fn text_operator(text: &Rc<str>, name: &str) -> Value {
    match name {
        "json" => text.json().map(Value::from_json).unwrap_or(Value::Null),
        _ => Value::Undefined,
    }
}

fn structured_operator(receiver: &Value, name: &str, args: &[Value]) -> EResult<Value> {
    match name {
        "json" => {
            let indent = args
                .first()
                .filter(|v| !v.is_nullish())
                .map(|v| v.to_number())
                .filter(|n| n.is_finite() && *n > 0.0)
                .map(|n| n as usize);
            receiver
                .to_json(indent)
                .map(Value::from)
                .map_err(|e| QueryError::execution(format!("json() failed: {}", e)))
        }
        _ => Ok(Value::Undefined),
    }
}

fn optional_function(args: &[Value], index: usize, operator: &str) -> EResult<Option<Value>> {
    match args.get(index) {
        None | Some(Value::Undefined) => Ok(None),
        Some(f @ (Value::Function(_) | Value::Native(_))) => Ok(Some(f.clone())),
        Some(other) => Err(QueryError::execution(format!(
            "{}(): expected a function, got {}",
            operator,
            other.type_of()
        ))),
    }
}

fn required_function(args: &[Value], index: usize, operator: &str) -> EResult<Value> {
    optional_function(args, index, operator)?.ok_or_else(|| {
        QueryError::execution(format!("{}() requires a selector function", operator))
    })
}

/// Selector output, or the item itself without a selector.
fn select(interp: &mut Interpreter<'_>, selector: Option<&Value>, item: &Value) -> EResult<Value> {
    match selector {
        Some(f) => interp.apply(f, item),
        None => Ok(item.clone()),
    }
}

fn numeric(value: Value, operator: &str) -> EResult<f64> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(QueryError::execution(format!(
            "{}() requires numeric values, got {}",
            operator,
            other.type_of()
        ))),
    }
}

fn sequence_operator(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    name: &str,
    args: &[Value],
) -> EResult<Value> {
    match name {
        "distinct" => {
            let selector = optional_function(args, 0, name)?;
            let out = items.distinct_by(|item| {
                select(interp, selector.as_ref(), item).map(|key| key.key())
            })?;
            Ok(Value::from(out))
        }
        "zip" => {
            let other = match args.first().and_then(Value::as_slice) {
                Some(other) => other,
                None => {
                    return Err(QueryError::execution(
                        "zip() requires a sequence argument",
                    ))
                }
            };
            let out = match optional_function(args, 1, name)? {
                Some(combiner) => items.zip_with(other, |a, b| {
                    interp.call_function(&combiner, &[a.clone(), b.clone()])
                })?,
                None => items
                    .zip_pairs(other)
                    .into_iter()
                    .map(|(a, b)| Value::from(vec![a, b]))
                    .collect(),
            };
            Ok(Value::from(out))
        }
        "sum" => {
            let selector = optional_function(args, 0, name)?;
            let total =
                items.sum_by(|item| numeric(select(interp, selector.as_ref(), item)?, name))?;
            Ok(Value::Number(total))
        }
        "average" => {
            let selector = optional_function(args, 0, name)?;
            let mean = items
                .average_by(|item| numeric(select(interp, selector.as_ref(), item)?, name))?;
            Ok(mean.map(Value::Number).unwrap_or_default())
        }
        "min" | "max" => {
            let selector = optional_function(args, 0, name)?;
            let mut key = |item: &Value| -> EResult<Option<SortKey>> {
                let key = match &selector {
                    None => Some(SortKey::Number(numeric(item.clone(), name)?)),
                    Some(f) => interp.apply(f, item)?.sort_key(),
                };
                // NaN and absent keys never win
                Ok(key.filter(|k| !matches!(k, SortKey::Number(n) if n.is_nan())))
            };
            let picked = if name == "min" {
                items.min_by_key_fallible(&mut key)?
            } else {
                items.max_by_key_fallible(&mut key)?
            };
            Ok(picked.cloned().unwrap_or_default())
        }
        "groupBy" => {
            let selector = required_function(args, 0, name)?;
            let groups = items.group_by_key(|item| interp.apply(&selector, item).map(|k| k.key()))?;
            Ok(Value::from(
                groups
                    .into_iter()
                    .map(|group| Value::Group(Rc::new(group)))
                    .collect::<Vec<_>>(),
            ))
        }
        "first" | "last" | "firstOrDefault" | "lastOrDefault" => {
            let predicate = optional_function(args, 0, name)?;
            let mut test = |item: &Value| match &predicate {
                Some(f) => interp.apply(f, item).map(|v| v.truthy()),
                None => Ok(true),
            };
            let found = if name.starts_with("first") {
                items.first_matching(&mut test)?
            } else {
                items.last_matching(&mut test)?
            };
            match found {
                Some(item) => Ok(item.clone()),
                None if name.ends_with("OrDefault") => Ok(Value::Undefined),
                None if items.is_empty() => Err(QueryError::NotFound(EMPTY_SEQUENCE.into())),
                None => Err(QueryError::NotFound(NO_MATCH.into())),
            }
        }
        "sortBy" | "sortByDescending" => {
            let selector = required_function(args, 0, name)?;
            let keyed = |item: &Value| interp.apply(&selector, item).map(|k| k.sort_key());
            let sorted = if name == "sortBy" {
                items.sort_by_optional_key(keyed)?
            } else {
                items.sort_by_optional_key_descending(keyed)?
            };
            Ok(Value::from(sorted))
        }
        other => Err(QueryError::execution(format!("unknown operator {}", other))),
    }
}
