//! Host built-ins
//!
//! The methods every query can call on arrays, strings and numbers, plus a
//! handful of global conversion functions. Operators from the library are
//! only consulted when none of these match.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::core::error::QueryError;
use crate::ops::library::Receiver;
use crate::ops::sequence::merge_sort_by;
use crate::sandbox::interp::Interpreter;
use crate::sandbox::value::{format_number, Value};

type EResult<T> = Result<T, QueryError>;

pub const ARRAY_METHODS: &[&str] = &[
    "length", "filter", "map", "forEach", "reduce", "some", "every", "find", "findIndex",
    "includes", "indexOf", "join", "slice", "concat", "reverse", "flat", "flatMap", "sort",
    "count", "toArray", "toString",
];

pub const STRING_METHODS: &[&str] = &[
    "length", "includes", "startsWith", "endsWith", "indexOf", "split", "trim", "trimStart",
    "trimEnd", "toUpperCase", "toLowerCase", "replace", "replaceAll", "substring", "slice",
    "charAt", "padStart", "padEnd", "match", "matches", "toString",
];

const VALUE_METHODS: &[&str] = &["toString", "toFixed"];

const GLOBALS: &[&str] = &["Number", "String", "Boolean", "parseInt", "parseFloat", "isNaN"];

/// Host method table used when installing the operator library.
pub fn is_host_method(receiver: Receiver, name: &str) -> bool {
    match receiver {
        Receiver::Sequence => ARRAY_METHODS.contains(&name),
        Receiver::Text => STRING_METHODS.contains(&name),
        Receiver::Structured => VALUE_METHODS.contains(&name),
    }
}

pub fn global(name: &str) -> Option<Value> {
    GLOBALS
        .iter()
        .copied()
        .find(|g| *g == name)
        .map(Value::Native)
}

pub fn call_global(name: &str, args: &[Value]) -> EResult<Value> {
    let first = args.first().cloned().unwrap_or_default();
    Ok(match name {
        "Number" => Value::Number(first.to_number()),
        "String" => Value::from(first.to_string()),
        "Boolean" => Value::Bool(first.truthy()),
        "parseInt" => {
            let radix = args.get(1).map(Value::to_number).unwrap_or(10.0);
            Value::Number(parse_int(&first.to_string(), radix as u32))
        }
        "parseFloat" => Value::Number(parse_float(&first.to_string())),
        "isNaN" => Value::Bool(first.to_number().is_nan()),
        other => return Err(QueryError::execution(format!("{} is not a function", other))),
    })
}

/// Dispatch a host method; `None` when the receiver has no such method.
pub fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> EResult<Option<Value>> {
    match receiver {
        Value::Array(_) | Value::Group(_) => {
            let items = receiver.as_slice().unwrap_or_default();
            array_method(interp, items, name, args)
        }
        Value::Str(s) => string_method(interp, s, name, args),
        Value::Stream(cell) => match name {
            "toArray" => {
                let stream = cell
                    .borrow_mut()
                    .take()
                    .ok_or_else(|| QueryError::execution("stream has already been consumed"))?;
                let lines = stream.collect::<EResult<Vec<_>>>()?;
                Ok(Some(Value::strings(lines)))
            }
            _ => Ok(None),
        },
        Value::Number(n) => match name {
            "toFixed" => {
                let digits = arg_number(args, 0).unwrap_or(0.0).clamp(0.0, 100.0) as usize;
                Ok(Some(Value::from(format!("{:.*}", digits, n))))
            }
            "toString" => Ok(Some(Value::from(format_number(*n)))),
            _ => Ok(None),
        },
        _ if name == "toString" => Ok(Some(Value::from(receiver.to_string()))),
        _ => Ok(None),
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn arg_number(args: &[Value], i: usize) -> Option<f64> {
    args.get(i).filter(|v| !v.is_nullish()).map(Value::to_number)
}

fn callback(args: &[Value], method: &str) -> EResult<Value> {
    match args.first() {
        Some(f @ (Value::Function(_) | Value::Native(_))) => Ok(f.clone()),
        Some(other) => Err(QueryError::execution(format!(
            "{} is not a function (argument to {})",
            other, method
        ))),
        None => Err(QueryError::execution(format!(
            "{} requires a callback",
            method
        ))),
    }
}

/// Resolve a possibly negative, possibly fractional index against `len`.
fn relative(index: Option<f64>, len: usize, default: usize) -> usize {
    match index {
        None => default,
        Some(i) if i.is_nan() => 0,
        Some(i) if i < 0.0 => len.saturating_sub((-i).trunc() as usize),
        Some(i) => (i.trunc() as usize).min(len),
    }
}

fn array_method(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    name: &str,
    args: &[Value],
) -> EResult<Option<Value>> {
    let value = match name {
        "filter" => {
            let f = callback(args, name)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if call_indexed(interp, &f, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::from(out)
        }
        "map" => {
            let f = callback(args, name)?;
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| call_indexed(interp, &f, item, i))
                .collect::<EResult<Vec<_>>>()?;
            Value::from(out)
        }
        "forEach" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                call_indexed(interp, &f, item, i)?;
            }
            Value::Undefined
        }
        "reduce" => {
            let f = callback(args, name)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(QueryError::execution(
                            "reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call_function(&f, &[acc, item.clone(), Value::from(i)])?;
            }
            acc
        }
        "some" | "every" | "find" | "findIndex" => {
            let f = callback(args, name)?;
            let mut hit = None;
            for (i, item) in items.iter().enumerate() {
                let matched = call_indexed(interp, &f, item, i)?.truthy();
                if matched != (name == "every") {
                    hit = Some(i);
                    break;
                }
            }
            match name {
                "some" => Value::Bool(hit.is_some()),
                "every" => Value::Bool(hit.is_none()),
                "find" => hit.map(|i| items[i].clone()).unwrap_or_default(),
                _ => Value::Number(hit.map(|i| i as f64).unwrap_or(-1.0)),
            }
        }
        "count" => match args.first() {
            None => Value::from(items.len()),
            Some(_) => {
                let f = callback(args, name)?;
                let mut n = 0usize;
                for (i, item) in items.iter().enumerate() {
                    if call_indexed(interp, &f, item, i)?.truthy() {
                        n += 1;
                    }
                }
                Value::from(n)
            }
        },
        "includes" => {
            let needle = arg(args, 0).key();
            Value::Bool(items.iter().any(|item| item.key() == needle))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let found = items.iter().position(|item| item.strict_equals(&needle));
            Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
        }
        "join" => {
            let separator = match args.first() {
                Some(v) if !matches!(v, Value::Undefined) => v.to_string(),
                _ => ",".to_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                .collect();
            Value::from(parts.join(&separator))
        }
        "slice" => {
            let start = relative(arg_number(args, 0), items.len(), 0);
            let end = relative(arg_number(args, 1), items.len(), items.len());
            Value::from(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for extra in args {
                match extra.as_slice() {
                    Some(more) => out.extend_from_slice(more),
                    None => out.push(extra.clone()),
                }
            }
            Value::from(out)
        }
        "reverse" => Value::from(items.iter().rev().cloned().collect::<Vec<_>>()),
        "flat" => {
            let depth = arg_number(args, 0).unwrap_or(1.0).max(0.0) as usize;
            let mut out = Vec::new();
            flatten_into(items, depth, &mut out);
            Value::from(out)
        }
        "flatMap" => {
            let f = callback(args, name)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let mapped = call_indexed(interp, &f, item, i)?;
                match mapped.as_slice() {
                    Some(inner) => out.extend_from_slice(inner),
                    None => out.push(mapped),
                }
            }
            Value::from(out)
        }
        "sort" => Value::from(sort_values(interp, items, args.first())?),
        "toArray" => Value::from(items.to_vec()),
        "toString" => Value::from(Value::from(items.to_vec()).to_string()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Array callbacks receive `(item, index)`.
fn call_indexed(
    interp: &mut Interpreter<'_>,
    f: &Value,
    item: &Value,
    i: usize,
) -> EResult<Value> {
    interp.call_function(f, &[item.clone(), Value::from(i)])
}

fn flatten_into(items: &[Value], depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item.as_slice() {
            Some(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            _ => out.push(item.clone()),
        }
    }
}

/// Stable sort returning a new array. Without a comparator, elements are
/// ordered by their display strings and `undefined` goes last. A comparator
/// that contradicts itself permutes the items without failing.
fn sort_values(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    comparator: Option<&Value>,
) -> EResult<Vec<Value>> {
    match comparator {
        None => {
            let mut sorted = items.to_vec();
            sorted.sort_by(|a, b| match (a, b) {
                (Value::Undefined, Value::Undefined) => Ordering::Equal,
                (Value::Undefined, _) => Ordering::Greater,
                (_, Value::Undefined) => Ordering::Less,
                _ => a.to_string().cmp(&b.to_string()),
            });
            Ok(sorted)
        }
        Some(f) => merge_sort_by(items, |a, b| -> EResult<Ordering> {
            let result = interp.call_function(f, &[a.clone(), b.clone()])?;
            Ok(result
                .to_number()
                .partial_cmp(&0.0)
                .unwrap_or(Ordering::Equal))
        }),
    }
}

fn string_method(
    interp: &mut Interpreter<'_>,
    s: &Rc<str>,
    name: &str,
    args: &[Value],
) -> EResult<Option<Value>> {
    let text: &str = s;
    let arg_str = |i: usize| arg(args, i).to_string();

    let value = match name {
        "includes" => Value::Bool(text.contains(arg_str(0).as_str())),
        "startsWith" => Value::Bool(text.starts_with(arg_str(0).as_str())),
        "endsWith" => Value::Bool(text.ends_with(arg_str(0).as_str())),
        "indexOf" => {
            let needle = arg_str(0);
            let found = text
                .find(needle.as_str())
                .map(|byte| text[..byte].chars().count() as f64);
            Value::Number(found.unwrap_or(-1.0))
        }
        "split" => match args.first() {
            None | Some(Value::Undefined) => Value::from(vec![Value::Str(s.clone())]),
            Some(sep) => {
                let sep = sep.to_string();
                let parts: Vec<String> = if sep.is_empty() {
                    text.chars().map(String::from).collect()
                } else {
                    text.split(sep.as_str()).map(String::from).collect()
                };
                let limit = arg_number(args, 1).map(|n| n.max(0.0) as usize);
                Value::strings(parts.into_iter().take(limit.unwrap_or(usize::MAX)))
            }
        },
        "trim" => Value::from(text.trim()),
        "trimStart" => Value::from(text.trim_start()),
        "trimEnd" => Value::from(text.trim_end()),
        "toUpperCase" => Value::from(text.to_uppercase()),
        "toLowerCase" => Value::from(text.to_lowercase()),
        "replace" => Value::from(text.replacen(arg_str(0).as_str(), &arg_str(1), 1)),
        "replaceAll" => Value::from(text.replace(arg_str(0).as_str(), &arg_str(1))),
        "substring" | "slice" => {
            let chars: Vec<char> = text.chars().collect();
            let len = chars.len();
            let (start, end) = if name == "slice" {
                (
                    relative(arg_number(args, 0), len, 0),
                    relative(arg_number(args, 1), len, len),
                )
            } else {
                let clamp = |i: Option<f64>, default: usize| {
                    i.map(|n| if n.is_nan() { 0 } else { n.max(0.0).min(len as f64) as usize })
                        .unwrap_or(default)
                };
                let a = clamp(arg_number(args, 0), 0);
                let b = clamp(arg_number(args, 1), len);
                (a.min(b), a.max(b))
            };
            let out: String = chars[start..end.max(start)].iter().collect();
            Value::from(out)
        }
        "charAt" => {
            let i = arg_number(args, 0).unwrap_or(0.0);
            let ch = (i >= 0.0)
                .then(|| text.chars().nth(i as usize))
                .flatten()
                .map(String::from)
                .unwrap_or_default();
            Value::from(ch)
        }
        "padStart" | "padEnd" => {
            let target = arg_number(args, 0).unwrap_or(0.0).max(0.0) as usize;
            let fill = match args.get(1) {
                Some(v) if !v.is_nullish() => v.to_string(),
                _ => " ".to_string(),
            };
            let len = text.chars().count();
            if target <= len || fill.is_empty() {
                Value::Str(s.clone())
            } else {
                let pad: String = fill.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::from(format!("{}{}", pad, text))
                } else {
                    Value::from(format!("{}{}", text, pad))
                }
            }
        }
        "match" => {
            let re = interp.regex(&arg_str(0))?;
            match re.captures(text) {
                Some(caps) => Value::from(
                    caps.iter()
                        .map(|m| m.map(|m| Value::from(m.as_str())).unwrap_or_default())
                        .collect::<Vec<_>>(),
                ),
                None => Value::Null,
            }
        }
        "matches" => {
            let re = interp.regex(&arg_str(0))?;
            Value::Bool(re.is_match(text))
        }
        "toString" => Value::Str(s.clone()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let radix = if radix == 0 { 10 } else { radix };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let trimmed = text.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let valid: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    let value = valid
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    sign * value
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    // longest numeric prefix that parses
    let mut best = f64::NAN;
    for (i, c) in trimmed.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
            break;
        }
        if let Ok(n) = trimmed[..i + c.len_utf8()].parse::<f64>() {
            best = n;
        }
    }
    best
}
