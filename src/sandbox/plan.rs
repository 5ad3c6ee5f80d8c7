//! Execution plan
//!
//! Decides, from the token stream alone, whether a query body needs an
//! implicit `return` and whether it runs as a streaming producer.

use serde::Serialize;

use crate::core::error::QueryError;
use crate::sandbox::lexer::{tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// No `return` anywhere: the trailing expression is the result.
    pub implicit_return: bool,
    /// Contains `yield` or `for await`: runs as a stream producer.
    pub is_async: bool,
}

impl ExecutionPlan {
    pub fn classify(source: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(source)?;
        let has_yield = tokens.iter().any(|(t, _)| *t == Token::Yield);
        let has_for_await = tokens
            .windows(2)
            .any(|w| w[0].0 == Token::For && w[1].0 == Token::Await);
        let has_return = tokens.iter().any(|(t, _)| *t == Token::Return);

        let is_async = has_yield || has_for_await;
        Ok(Self {
            implicit_return: !has_return && !is_async,
            is_async,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(source: &str) -> ExecutionPlan {
        ExecutionPlan::classify(source).unwrap()
    }

    #[test]
    fn test_bare_expression() {
        assert_eq!(
            plan("lines.filter(l => l.length > 0)"),
            ExecutionPlan {
                implicit_return: true,
                is_async: false
            }
        );
    }

    #[test]
    fn test_explicit_return() {
        let p = plan("const n = lines.length; return n * 2");
        assert!(!p.implicit_return);
        assert!(!p.is_async);
    }

    #[test]
    fn test_streaming_constructs() {
        assert!(plan("for (const l of linesAsync) yield l").is_async);
        let p = plan("for await (const l of linesAsync) { }");
        assert!(p.is_async);
        assert!(!p.implicit_return);
    }

    #[test]
    fn test_keywords_inside_strings_are_ignored() {
        let p = plan("lines.filter(l => l.includes('return yield'))");
        assert!(p.implicit_return);
        assert!(!p.is_async);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(&plan("lines")).unwrap();
        assert_eq!(json, r#"{"implicitReturn":true,"isAsync":false}"#);
    }
}
