//! Execution sandbox
//!
//! A query goes through three stages:
//! - `plan`: token-level classification (implicit return, streaming)
//! - `compile`: parse into an AST, synthesising the implicit return
//! - `invoke`: run against a [`ContentSource`]; streaming plans run on a
//!   worker thread and come back as a [`QueryStream`]
//!
//! The only names a query can reach are `doc`, its shorthands and the host
//! built-ins; operators come from the process-wide [`OperatorLibrary`].

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod plan;
pub mod stream;
pub mod value;

use std::sync::Arc;
use tracing::debug;

use crate::core::error::QueryError;
use crate::ops::library::OperatorLibrary;
use crate::source::content::ContentSource;

pub use ast::Program;
pub use interp::Interpreter;
pub use plan::ExecutionPlan;
pub use stream::{CancelFlag, QueryStream, QUERY_STACK_SIZE};
pub use value::Value;

/// A parsed query, ready to invoke. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    plan: ExecutionPlan,
    program: Arc<Program>,
}

impl CompiledQuery {
    pub fn plan(&self) -> ExecutionPlan {
        self.plan
    }

    /// Top-level statements after compilation
    pub fn statement_count(&self) -> usize {
        self.program.body.len()
    }
}

/// Outcome of invoking a query
#[derive(Debug)]
pub enum Evaluation {
    Completed(Value),
    Streaming(QueryStream),
}

#[derive(Debug, Clone, Copy)]
pub struct Sandbox {
    library: &'static OperatorLibrary,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// Installs the operator library on first use.
    pub fn new() -> Self {
        Self {
            library: OperatorLibrary::install(builtins::is_host_method),
        }
    }

    pub fn library(&self) -> &'static OperatorLibrary {
        self.library
    }

    pub fn plan(&self, text: &str) -> Result<ExecutionPlan, QueryError> {
        let plan = ExecutionPlan::classify(text)?;
        debug!(implicit_return = plan.implicit_return, is_async = plan.is_async, "planned query");
        Ok(plan)
    }

    pub fn compile(&self, text: &str, plan: ExecutionPlan) -> Result<CompiledQuery, QueryError> {
        let mut program = parser::parse(text)?;
        if plan.implicit_return {
            if let Some(ast::Stmt::Expr(_)) = program.body.last() {
                if let Some(ast::Stmt::Expr(expr)) = program.body.pop() {
                    program.body.push(ast::Stmt::Return(Some(expr)));
                }
            }
        }
        debug!(statements = program.body.len(), "compiled query");
        Ok(CompiledQuery {
            plan,
            program: Arc::new(program),
        })
    }

    pub fn invoke(
        &self,
        query: &CompiledQuery,
        source: ContentSource,
    ) -> Result<Evaluation, QueryError> {
        self.invoke_cancellable(query, source, CancelFlag::new())
    }

    /// Invoke a query that stops with [`QueryError::Cancelled`] once
    /// `cancel` is raised.
    pub fn invoke_cancellable(
        &self,
        query: &CompiledQuery,
        source: ContentSource,
        cancel: CancelFlag,
    ) -> Result<Evaluation, QueryError> {
        if !query.plan.is_async {
            let value = Interpreter::new(&source, self.library)
                .with_cancel(cancel)
                .run(&query.program)?;
            return Ok(Evaluation::Completed(value));
        }

        let program = query.program.clone();
        let library = self.library;
        let stream = QueryStream::spawn(cancel.clone(), move |sink| {
            Interpreter::new(&source, library)
                .with_sink(sink)
                .with_cancel(cancel)
                .run(&program)
                .map(|_| ())
        })?;
        Ok(Evaluation::Streaming(stream))
    }

    /// Plan, compile and invoke in one step.
    pub fn run(&self, text: &str, source: ContentSource) -> Result<Evaluation, QueryError> {
        self.run_cancellable(text, source, CancelFlag::new())
    }

    pub fn run_cancellable(
        &self,
        text: &str,
        source: ContentSource,
        cancel: CancelFlag,
    ) -> Result<Evaluation, QueryError> {
        let plan = self.plan(text)?;
        let query = self.compile(text, plan)?;
        self.invoke_cancellable(&query, source, cancel)
    }
}
