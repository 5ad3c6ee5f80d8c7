//! Tree-walking interpreter
//!
//! One [`Interpreter`] runs one invocation. The content source is reached
//! only through the lazy `doc` accessors and their bare shorthands; the
//! operator library is consulted after host methods on every method call.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

use crate::core::error::QueryError;
use crate::ops::library::OperatorLibrary;
use crate::sandbox::ast::*;
use crate::sandbox::builtins;
use crate::sandbox::operators;
use crate::sandbox::stream::CancelFlag;
use crate::sandbox::value::Value;
use crate::source::content::{ContentKind, ContentSource};

type EResult<T> = Result<T, QueryError>;

/// Bound on nested function calls within one invocation.
pub const MAX_CALL_DEPTH: usize = 128;

/// Arrow function together with the scope it closes over
pub struct Closure {
    pub func: Arc<Function>,
    pub env: Env,
}

struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

/// Lexical scope chain
#[derive(Clone)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    pub fn root() -> Self {
        Env(Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: None,
        })))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn declare(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        match scope.vars.get(name) {
            Some(value) => Some(value.clone()),
            None => scope.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    /// Replace an existing binding; false when the name is not declared.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        match &scope.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }

    /// Move a binding's value out, leaving `undefined` behind.
    fn take(&self, name: &str) -> Option<Value> {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.vars.get_mut(name) {
            return Some(std::mem::take(slot));
        }
        match &scope.parent {
            Some(parent) => parent.take(name),
            None => None,
        }
    }
}

/// Receives the display string of every `yield`.
pub trait YieldSink {
    fn emit(&mut self, item: String) -> EResult<()>;
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter<'a> {
    source: &'a ContentSource,
    library: &'static OperatorLibrary,
    sink: Option<&'a mut dyn YieldSink>,
    lines: Option<Value>,
    regexes: HashMap<String, Regex>,
    cancel: CancelFlag,
    call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(source: &'a ContentSource, library: &'static OperatorLibrary) -> Self {
        Self {
            source,
            library,
            sink: None,
            lines: None,
            regexes: HashMap::new(),
            cancel: CancelFlag::new(),
            call_depth: 0,
        }
    }

    pub fn with_sink(mut self, sink: &'a mut dyn YieldSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> EResult<()> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        Ok(())
    }

    pub fn library(&self) -> &'static OperatorLibrary {
        self.library
    }

    /// Run a whole program; a missing `return` yields `undefined`.
    pub fn run(&mut self, program: &Program) -> EResult<Value> {
        let env = Env::root();
        match self.exec_block(&program.body, &env)? {
            Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => {
                Err(QueryError::execution("'break' or 'continue' outside of a loop"))
            }
            Flow::Normal => Ok(Value::Undefined),
        }
    }

    pub(crate) fn regex(&mut self, pattern: &str) -> EResult<Regex> {
        if let Some(re) = self.regexes.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)
            .map_err(|e| QueryError::execution(format!("invalid regular expression: {}", e)))?;
        self.regexes.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    // ---- document accessors ----

    fn doc_lines(&mut self) -> EResult<Value> {
        if let Some(lines) = &self.lines {
            return Ok(lines.clone());
        }
        let lines = Value::strings(self.source.lines()?);
        trace!("materialised document lines");
        self.lines = Some(lines.clone());
        Ok(lines)
    }

    fn doc_lines_async(&self) -> EResult<Value> {
        let stream = self.source.lines_async()?;
        Ok(Value::Stream(Rc::new(RefCell::new(Some(stream)))))
    }

    fn doc_property(&mut self, name: &str) -> EResult<Value> {
        match name {
            "lines" => self.doc_lines(),
            "linesAsync" => self.doc_lines_async(),
            "fullText" => Ok(Value::from(self.source.full_text()?)),
            "fileName" => Ok(Value::from(self.source.file_name())),
            "isBinary" => Ok(Value::Bool(self.source.kind() == ContentKind::Binary)),
            _ => Ok(Value::Undefined),
        }
    }

    fn resolve(&mut self, name: &str, env: &Env) -> EResult<Value> {
        if let Some(value) = env.lookup(name) {
            return Ok(value);
        }
        match name {
            "doc" => Ok(Value::Document),
            "lines" | "linesAsync" | "fullText" => self.doc_property(name),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => match builtins::global(name) {
                Some(native) => Ok(native),
                None => Err(QueryError::execution(format!("{} is not defined", name))),
            },
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> EResult<Flow> {
        for stmt in body {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> EResult<Flow> {
        match stmt {
            Stmt::Declare { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                env.declare(name, value);
            }
            Stmt::Assign { name, op, value } => {
                let rhs = self.eval(value, env)?;
                let next = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Add => {
                        let current = self.resolve(name, env)?;
                        add(&current, &rhs)
                    }
                    AssignOp::Sub => {
                        let current = self.resolve(name, env)?;
                        Value::Number(current.to_number() - rhs.to_number())
                    }
                };
                if !env.assign(name, next) {
                    return Err(QueryError::execution(format!(
                        "cannot assign to undeclared variable '{}'",
                        name
                    )));
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Yield(expr) => {
                let value = self.eval(expr, env)?;
                match self.sink.as_mut() {
                    Some(sink) => sink.emit(value.to_string())?,
                    None => {
                        return Err(QueryError::execution(
                            "'yield' used outside of a streaming query",
                        ))
                    }
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    return self.exec(consequent, &env.child());
                } else if let Some(alternate) = alternate {
                    return self.exec(alternate, &env.child());
                }
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
                ..
            } => {
                let iterable = self.eval(iterable, env)?;
                return self.for_of(binding, iterable, body, env);
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    self.check_cancelled()?;
                    match self.exec(body, &env.child())? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Block(body) => return self.exec_block(body, &env.child()),
        }
        Ok(Flow::Normal)
    }

    fn for_of(&mut self, binding: &str, iterable: Value, body: &Stmt, env: &Env) -> EResult<Flow> {
        let step = |this: &mut Self, item: Value| -> EResult<Option<Flow>> {
            this.check_cancelled()?;
            let scope = env.child();
            scope.declare(binding, item);
            match this.exec(body, &scope)? {
                Flow::Break => Ok(Some(Flow::Normal)),
                Flow::Return(value) => Ok(Some(Flow::Return(value))),
                Flow::Normal | Flow::Continue => Ok(None),
            }
        };

        match &iterable {
            Value::Array(_) | Value::Group(_) => {
                let items = iterable.as_slice().unwrap_or_default();
                for item in items {
                    if let Some(flow) = step(self, item.clone())? {
                        return Ok(flow);
                    }
                }
            }
            Value::Str(s) => {
                for ch in s.chars() {
                    if let Some(flow) = step(self, Value::from(ch.to_string()))? {
                        return Ok(flow);
                    }
                }
            }
            Value::Stream(cell) => {
                let stream = cell
                    .borrow_mut()
                    .take()
                    .ok_or_else(|| QueryError::execution("stream has already been consumed"))?;
                for line in stream {
                    if let Some(flow) = step(self, Value::from(line?))? {
                        return Ok(flow);
                    }
                }
            }
            other => {
                return Err(QueryError::execution(format!(
                    "{} is not iterable",
                    other.type_of()
                )))
            }
        }
        Ok(Flow::Normal)
    }

    // ---- expressions ----

    pub fn eval(&mut self, expr: &Expr, env: &Env) -> EResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::from(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => self.resolve(name, env),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<EResult<Vec<_>>>()?;
                Ok(Value::from(values))
            }
            Expr::Object(entries) => {
                let mut map = indexmap::IndexMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::Object(Rc::new(map)))
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object, env)?;
                if *optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                self.get_property(&target, property)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let target = self.eval(object, env)?;
                if *optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let index = self.eval(index, env)?;
                self.get_index(&target, &index)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, env),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::from(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Arrow(func) => Ok(Value::Function(Rc::new(Closure {
                func: func.clone(),
                env: env.clone(),
            }))),
        }
    }

    fn get_property(&mut self, target: &Value, name: &str) -> EResult<Value> {
        match (target, name) {
            (Value::Undefined | Value::Null, _) => Err(QueryError::execution(format!(
                "cannot read property '{}' of {}",
                name, target
            ))),
            (Value::Document, _) => self.doc_property(name),
            (Value::Object(map), _) => Ok(map.get(name).cloned().unwrap_or_default()),
            (Value::Group(group), "key") => Ok(group.key().value().clone()),
            (Value::Group(group), "length") => Ok(Value::from(group.len())),
            (Value::Array(items), "length") => Ok(Value::from(items.len())),
            (Value::Str(s), "length") => Ok(Value::from(s.chars().count())),
            _ => Ok(Value::Undefined),
        }
    }

    fn get_index(&mut self, target: &Value, index: &Value) -> EResult<Value> {
        if let Value::Number(n) = index {
            if let Some(items) = target.as_slice() {
                return Ok(position(*n)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default());
            }
            if let Value::Str(s) = target {
                return Ok(position(*n)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default());
            }
        }
        self.get_property(target, &index.to_string())
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> EResult<Value> {
        if let Expr::Member {
            object,
            property,
            optional,
        } = callee
        {
            // in-place append on a variable's array
            if let (Expr::Ident(name), "push") = (object.as_ref(), property.as_str()) {
                let is_array = matches!(env.lookup(name), Some(Value::Array(_)));
                if is_array {
                    let values = self.eval_args(args, env)?;
                    return Ok(push(env, name, values));
                }
            }

            let receiver = self.eval(object, env)?;
            if *optional && receiver.is_nullish() {
                return Ok(Value::Undefined);
            }
            let values = self.eval_args(args, env)?;
            return self.call_method(&receiver, property, &values);
        }

        let function = self.eval(callee, env)?;
        let values = self.eval_args(args, env)?;
        self.call_function(&function, &values)
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> EResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    /// Object property, then host built-in, then installed operator.
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> EResult<Value> {
        if receiver.is_nullish() {
            return Err(QueryError::execution(format!(
                "cannot read property '{}' of {}",
                name, receiver
            )));
        }
        if let Value::Object(map) = receiver {
            if let Some(function) = map.get(name) {
                let function = function.clone();
                return self.call_function(&function, args);
            }
        }
        if let Value::Document = receiver {
            let property = self.doc_property(name)?;
            return self.call_function(&property, args);
        }
        if let Some(value) = builtins::call_method(self, receiver, name, args)? {
            return Ok(value);
        }
        if let Some(value) = operators::call(self, receiver, name, args)? {
            return Ok(value);
        }
        Err(QueryError::execution(format!(
            "{}.{} is not a function",
            receiver.type_of(),
            name
        )))
    }

    pub fn call_function(&mut self, function: &Value, args: &[Value]) -> EResult<Value> {
        match function {
            Value::Function(closure) => {
                self.check_cancelled()?;
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(QueryError::execution("maximum call depth exceeded"));
                }
                self.call_depth += 1;
                let result = self.call_closure(closure, args);
                self.call_depth -= 1;
                result
            }
            Value::Native(name) => builtins::call_global(name, args),
            other => Err(QueryError::execution(format!(
                "{} is not a function",
                other.type_of()
            ))),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> EResult<Value> {
        let scope = closure.env.child();
        for (i, param) in closure.func.params.iter().enumerate() {
            scope.declare(param, args.get(i).cloned().unwrap_or_default());
        }
        match &closure.func.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => match self.exec_block(body, &scope)? {
                Flow::Return(value) => Ok(value),
                Flow::Normal => Ok(Value::Undefined),
                Flow::Break | Flow::Continue => Err(QueryError::execution(
                    "'break' or 'continue' outside of a loop",
                )),
            },
        }
    }

    /// Call `function` with one argument, for selectors and predicates.
    pub fn apply(&mut self, function: &Value, item: &Value) -> EResult<Value> {
        self.call_function(function, std::slice::from_ref(item))
    }
}

fn push(env: &Env, name: &str, values: Vec<Value>) -> Value {
    let mut current = env.take(name).unwrap_or_default();
    let length = match &mut current {
        Value::Array(items) => {
            let items = Rc::make_mut(items);
            items.extend(values);
            items.len()
        }
        _ => 0,
    };
    env.assign(name, current);
    Value::from(length)
}

/// Non-negative integral index, if any.
fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn add(left: &Value, right: &Value) -> Value {
    let concat = |v: &Value| !matches!(v, Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined);
    if concat(left) || concat(right) {
        Value::from(format!("{}{}", left, right))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(left.compare(right) == Some(Less)),
        BinaryOp::Le => Value::Bool(matches!(left.compare(right), Some(Less | Equal))),
        BinaryOp::Gt => Value::Bool(left.compare(right) == Some(Greater)),
        BinaryOp::Ge => Value::Bool(matches!(left.compare(right), Some(Greater | Equal))),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QueryConfig;
    use crate::sandbox::parser::parse;
    use crate::source::content::{DocumentRef, InMemoryDocument};

    fn eval_with(text: &str, query: &str) -> EResult<Value> {
        let source = ContentSource::new(
            DocumentRef::document(Arc::new(InMemoryDocument::new(text))),
            QueryConfig::default(),
        );
        let library = OperatorLibrary::install(builtins::is_host_method);
        let program = parse(query)?;
        Interpreter::new(&source, library).run(&program)
    }

    fn eval(query: &str) -> String {
        eval_with("alpha\nbeta\ngamma", query).unwrap().to_string()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("return 1 + 2 * 3"), "7");
        assert_eq!(eval("return 'a' + 1"), "a1");
        assert_eq!(eval("return 7 % 4 - 1"), "2");
        assert_eq!(eval("return -'3' + 1"), "-2");
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("return 1 == '1' && 1 !== '1'"), "true");
        assert_eq!(eval("return null ?? 'x'"), "x");
        assert_eq!(eval("return 0 || 'fallback'"), "fallback");
        assert_eq!(eval("return 'b' > 'a' ? 'yes' : 'no'"), "yes");
        assert_eq!(eval("return typeof lines"), "object");
    }

    #[test]
    fn test_bare_lines_and_doc_properties() {
        assert_eq!(eval("return lines.length"), "3");
        assert_eq!(eval("return doc.lines[1]"), "beta");
        assert_eq!(eval("return doc.fileName"), "Unknown");
        assert_eq!(eval("return doc.isBinary"), "false");
        assert_eq!(eval("return fullText.length"), "16");
    }

    #[test]
    fn test_loops_and_closures() {
        let query = "let total = 0\n\
                     for (const line of lines) {\n\
                       if (line.startsWith('g')) continue\n\
                       total += line.length\n\
                     }\n\
                     return total";
        assert_eq!(eval(query), "9");

        let query = "let n = 0; while (true) { n++; if (n >= 5) break } return n";
        assert_eq!(eval(query), "5");

        let query = "const add = (a, b) => a + b; const inc = x => add(x, 1); return inc(41)";
        assert_eq!(eval(query), "42");
    }

    #[test]
    fn test_for_over_stream() {
        let query = "const out = []; for (const l of linesAsync) { out.push(l.toUpperCase()) } return out";
        assert_eq!(eval(query), "ALPHA,BETA,GAMMA");
    }

    #[test]
    fn test_stream_is_single_pass() {
        let query = "const s = linesAsync; for (const a of s) {} for (const b of s) {} return 1";
        let err = eval_with("a", query).unwrap_err();
        assert!(err.to_string().contains("already been consumed"));
    }

    #[test]
    fn test_objects_and_optional_chaining() {
        assert_eq!(eval("const o = { a: { b: 2 } }; return o.a.b"), "2");
        assert_eq!(eval("const o = { a: null }; return o.a?.b"), "undefined");
        assert_eq!(eval("const o = { f: x => x * 2 }; return o.f(4)"), "8");
        assert_eq!(eval("return { n: 1, s: 'x' }"), r#"{"n":1,"s":"x"}"#);
    }

    #[test]
    fn test_errors() {
        let err = eval_with("", "return missing + 1").unwrap_err();
        assert_eq!(err.to_string(), "missing is not defined");

        let err = eval_with("", "const o = null; return o.x").unwrap_err();
        assert!(err.to_string().contains("cannot read property 'x' of null"));

        let err = eval_with("", "return lines.nope()").unwrap_err();
        assert_eq!(err.to_string(), "object.nope is not a function");

        let err = eval_with("", "x = 1").unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_lines_are_materialised_once() {
        let query = "const a = lines; const b = doc.lines; return a === b";
        assert_eq!(eval(query), "true");
    }

    #[test]
    fn test_globals() {
        assert_eq!(eval("return parseInt('42px') + Number('1.5')"), "43.5");
        assert_eq!(eval("return isNaN('abc')"), "true");
        assert_eq!(eval("return String(12) + Boolean('')"), "12false");
    }

    fn eval_on_query_stack(query: &'static str) -> EResult<String> {
        std::thread::Builder::new()
            .stack_size(crate::sandbox::stream::QUERY_STACK_SIZE)
            .spawn(move || eval_with("", query).map(|v| v.to_string()))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_runaway_recursion_is_an_execution_error() {
        let err = eval_on_query_stack("const f = x => f(x); return f(1)").unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
        assert_eq!(err.to_string(), "maximum call depth exceeded");

        let depth = eval_on_query_stack(
            "const down = n => n === 0 ? 0 : 1 + down(n - 1); return down(100)",
        );
        assert_eq!(depth.unwrap(), "100");
    }

    #[test]
    fn test_cancelled_interpreter_stops_loops() {
        let source = ContentSource::new(
            DocumentRef::document(Arc::new(InMemoryDocument::new("a\nb"))),
            QueryConfig::default(),
        );
        let library = OperatorLibrary::install(builtins::is_host_method);
        let cancel = CancelFlag::new();
        cancel.cancel();
        for query in ["while (true) {}", "for (const l of linesAsync) {}", "[1].map(x => x)"] {
            let program = parse(query).unwrap();
            let err = Interpreter::new(&source, library)
                .with_cancel(cancel.clone())
                .run(&program)
                .unwrap_err();
            assert!(matches!(err, QueryError::Cancelled), "{}", query);
        }
    }
}
