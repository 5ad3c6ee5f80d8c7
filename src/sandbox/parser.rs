//! Recursive-descent parser
//!
//! Produces a [`Program`] from the token stream. Type annotations are
//! accepted wherever a typed snippet would carry them and are discarded.

use std::ops::Range;
use std::sync::Arc;

use crate::core::error::QueryError;
use crate::sandbox::ast::*;
use crate::sandbox::lexer::{compile_error, tokenize, Token};

/// Bound on syntax nesting. Operator chains count one level per link since
/// they build equally deep trees.
pub const MAX_DEPTH: usize = 128;

pub fn parse(source: &str) -> Result<Program, QueryError> {
    let tokens = tokenize(source)?;
    Parser::new(source, tokens).program()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    /// Nesting depth of arrow functions; `yield` is only legal at depth 0.
    function_depth: usize,
    depth: usize,
}

type PResult<T> = Result<T, QueryError>;

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<(Token, Range<usize>)>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            function_depth: 0,
            depth: 0,
        }
    }

    // ---- cursor helpers ----

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    /// Enter one nesting level; callers leave with [`Parser::leave`].
    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        compile_error(self.source, self.offset(), message)
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        match self.peek() {
            Some(token) => self.error(format!(
                "expected {}, found {}",
                expected,
                token.describe()
            )),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn expect(&mut self, token: Token) -> PResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Identifier or keyword in property position.
    fn property_name(&mut self) -> PResult<String> {
        if let Some(Token::Ident(_)) = self.peek() {
            return self.ident();
        }
        if let Some(name) = self.peek().and_then(Token::keyword_name) {
            self.pos += 1;
            return Ok(name.to_string());
        }
        Err(self.unexpected("property name"))
    }

    // ---- statements ----

    fn program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.eat(&Token::Semi) {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave(1);
        stmt
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        let stmt = match self.peek() {
            Some(Token::Const) | Some(Token::Let) | Some(Token::Var) => self.declaration()?,
            Some(Token::Return) => {
                self.advance();
                let value = if self.ends_statement() {
                    None
                } else {
                    Some(self.expression()?)
                };
                Stmt::Return(value)
            }
            Some(Token::Yield) => {
                if self.function_depth > 0 {
                    return Err(self.error("'yield' is only allowed at the top level of a query"));
                }
                self.advance();
                Stmt::Yield(self.expression()?)
            }
            Some(Token::If) => return self.if_statement(),
            Some(Token::For) => return self.for_statement(),
            Some(Token::While) => {
                self.advance();
                self.expect(Token::LParen)?;
                let test = self.expression()?;
                self.expect(Token::RParen)?;
                let body = Box::new(self.statement()?);
                return Ok(Stmt::While { test, body });
            }
            Some(Token::Break) => {
                self.advance();
                Stmt::Break
            }
            Some(Token::Continue) => {
                self.advance();
                Stmt::Continue
            }
            Some(Token::LBrace) => return Ok(Stmt::Block(self.block()?)),
            _ => match self.assignment()? {
                Some(assign) => assign,
                None => Stmt::Expr(self.expression()?),
            },
        };
        self.eat(&Token::Semi);
        Ok(stmt)
    }

    fn ends_statement(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Semi) | Some(Token::RBrace))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            if self.eat(&Token::Semi) {
                continue;
            }
            body.push(self.statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(body)
    }

    fn declaration(&mut self) -> PResult<Stmt> {
        self.advance();
        let name = self.ident()?;
        if self.eat(&Token::Colon) {
            self.skip_type()?;
        }
        let init = if self.eat(&Token::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Stmt::Declare { name, init })
    }

    /// `name = e`, `name += e`, `name -= e`, `name++`, `name--`
    fn assignment(&mut self) -> PResult<Option<Stmt>> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Ok(None),
        };
        let op = match self.peek_at(1) {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::PlusAssign) => AssignOp::Add,
            Some(Token::MinusAssign) => AssignOp::Sub,
            Some(Token::Increment) | Some(Token::Decrement) => {
                let op = if self.peek_at(1) == Some(&Token::Increment) {
                    AssignOp::Add
                } else {
                    AssignOp::Sub
                };
                self.pos += 2;
                return Ok(Some(Stmt::Assign {
                    name,
                    op,
                    value: Expr::Number(1.0),
                }));
            }
            _ => return Ok(None),
        };
        self.pos += 2;
        let value = self.expression()?;
        Ok(Some(Stmt::Assign { name, op, value }))
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect(Token::LParen)?;
        let test = self.expression()?;
        self.expect(Token::RParen)?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        let is_await = self.eat(&Token::Await);
        self.expect(Token::LParen)?;
        if !matches!(
            self.peek(),
            Some(Token::Const) | Some(Token::Let) | Some(Token::Var)
        ) {
            return Err(self.unexpected("'const', 'let' or 'var'"));
        }
        self.advance();
        let binding = self.ident()?;
        if self.eat(&Token::Colon) {
            self.skip_type()?;
        }
        if !self.eat(&Token::Of) {
            return Err(self.error("only 'for (... of ...)' loops are supported"));
        }
        let iterable = self.expression()?;
        self.expect(Token::RParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::ForOf {
            binding,
            iterable,
            body,
            is_await,
        })
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        self.enter()?;
        let expr = self.conditional();
        self.leave(1);
        expr
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.nullish()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect(Token::Colon)?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn nullish(&mut self) -> PResult<Expr> {
        let mut left = self.logical_or()?;
        let mut links = 0;
        while self.eat(&Token::Nullish) {
            self.enter()?;
            links += 1;
            let right = self.logical_or()?;
            left = logical(LogicalOp::Nullish, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.logical_and()?;
        let mut links = 0;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            links += 1;
            let right = self.logical_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.equality()?;
        let mut links = 0;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            links += 1;
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut left = self.relational()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNotEq) => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.relational()?;
            left = binary(op, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn relational(&mut self) -> PResult<Expr> {
        let mut left = self.additive()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::As) => {
                    self.advance();
                    self.skip_type()?;
                    continue;
                }
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut left = self.multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::TypeOf) => UnaryOp::TypeOf,
            // Iteration is already sequential; `await` is a no-op on values.
            Some(Token::Await) => {
                self.advance();
                self.enter()?;
                let expr = self.unary();
                self.leave(1);
                return expr;
            }
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave(1);
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if matches!(
                self.peek(),
                Some(Token::Dot | Token::QuestionDot | Token::LBracket | Token::LParen)
            ) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                Some(Token::QuestionDot) => {
                    self.advance();
                    if self.eat(&Token::LBracket) {
                        let index = self.expression()?;
                        self.expect(Token::RBracket)?;
                        expr = Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: true,
                        };
                    } else {
                        let property = self.property_name()?;
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                            optional: true,
                        };
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    };
                }
                Some(Token::LParen) => {
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                // non-null assertion
                Some(Token::Bang) => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.leave(links);
        Ok(expr)
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            args.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.unexpected("expression")),
        };
        match token {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Undefined => {
                self.advance();
                Ok(Expr::Undefined)
            }
            Token::Ident(name) => {
                if self.peek_at(1) == Some(&Token::Arrow) {
                    self.pos += 2;
                    return self.arrow_body(vec![name]);
                }
                self.advance();
                Ok(Expr::Ident(name))
            }
            Token::LParen => {
                if self.is_arrow_params() {
                    let params = self.arrow_params()?;
                    self.expect(Token::Arrow)?;
                    return self.arrow_body(params);
                }
                self.advance();
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.object_literal(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        self.expect(Token::LBrace)?;
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.peek() {
                Some(Token::Str(s)) => {
                    let s = s.clone();
                    self.advance();
                    s
                }
                Some(Token::Number(n)) => {
                    let n = *n;
                    self.advance();
                    crate::sandbox::value::format_number(n)
                }
                _ => self.property_name()?,
            };
            let value = if self.eat(&Token::Colon) {
                self.expression()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }

    /// Scan ahead from `(` to its matching `)` and check for `=>`.
    fn is_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some((token, _)) = self.tokens.get(i) {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1), Some((Token::Arrow, _)));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn arrow_params(&mut self) -> PResult<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            params.push(self.ident()?);
            // optional marker `x?: T`
            self.eat(&Token::Question);
            if self.eat(&Token::Colon) {
                self.skip_type()?;
            }
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    fn arrow_body(&mut self, params: Vec<String>) -> PResult<Expr> {
        self.function_depth += 1;
        let body = if self.check(&Token::LBrace) {
            self.block().map(FunctionBody::Block)
        } else {
            match self.assignment() {
                Ok(Some(assign)) => Ok(FunctionBody::Block(vec![assign])),
                Ok(None) => self.expression().map(|e| FunctionBody::Expr(Box::new(e))),
                Err(e) => Err(e),
            }
        };
        self.function_depth -= 1;
        Ok(Expr::Arrow(Arc::new(Function {
            params,
            body: body?,
        })))
    }

    // ---- type annotations (discarded) ----

    fn skip_type(&mut self) -> PResult<()> {
        loop {
            self.skip_type_atom()?;
            while self.check(&Token::LBracket) && self.peek_at(1) == Some(&Token::RBracket) {
                self.pos += 2;
            }
            if self.eat(&Token::Pipe) || self.eat(&Token::Amp) {
                continue;
            }
            return Ok(());
        }
    }

    fn skip_type_atom(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Ident(_))
            | Some(Token::Null)
            | Some(Token::Undefined)
            | Some(Token::Str(_))
            | Some(Token::Number(_)) => {
                self.advance();
                while self.check(&Token::Dot) {
                    self.advance();
                    self.ident()?;
                }
                if self.check(&Token::Lt) {
                    self.skip_balanced(Token::Lt, Token::Gt)?;
                }
                Ok(())
            }
            Some(Token::TypeOf) => {
                self.advance();
                self.skip_type_atom()
            }
            Some(Token::LParen) => {
                self.skip_balanced(Token::LParen, Token::RParen)?;
                if self.eat(&Token::Arrow) {
                    self.skip_type()?;
                }
                Ok(())
            }
            Some(Token::LBrace) => self.skip_balanced(Token::LBrace, Token::RBrace),
            Some(Token::LBracket) => self.skip_balanced(Token::LBracket, Token::RBracket),
            _ => Err(self.unexpected("type")),
        }
    }

    fn skip_balanced(&mut self, open: Token, close: Token) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            match self.advance() {
                Some(t) if t == open => depth += 1,
                Some(t) if t == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(self.unexpected(&close.describe())),
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_expr(source: &str) -> Expr {
        let program = parse(source).unwrap();
        match program.body.as_slice() {
            [Stmt::Expr(e)] => e.clone(),
            other => panic!("expected one expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_method_chain_with_arrow() {
        let expr = single_expr("lines.filter(x => x.length > 3)");
        let Expr::Call { callee, args } = expr else {
            panic!("expected call");
        };
        assert!(matches!(*callee, Expr::Member { ref property, .. } if property == "filter"));
        let Expr::Arrow(func) = &args[0] else {
            panic!("expected arrow");
        };
        assert_eq!(func.params, vec!["x"]);
        assert!(matches!(func.body, FunctionBody::Expr(_)));
    }

    #[test]
    fn test_precedence() {
        let expr = single_expr("1 + 2 * 3");
        assert_eq!(
            expr,
            binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0))
            )
        );
    }

    #[test]
    fn test_typed_snippet_annotations_are_dropped() {
        let program = parse(
            "const xs: Array<Array<string>> = lines as string[];\n\
             const f = (a: number, b?: string | null) => a;\n\
             return xs",
        )
        .unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(matches!(&program.body[0], Stmt::Declare { name, init: Some(Expr::Ident(_)) } if name == "xs"));
    }

    #[test]
    fn test_statements() {
        let program = parse(
            "let n = 0\n\
             for (const line of lines) { if (line.includes('x')) n++; else continue }\n\
             while (n > 10) { n -= 1; break }\n\
             return n",
        )
        .unwrap();
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[1], Stmt::ForOf { is_await: false, .. }));
        assert!(matches!(program.body[3], Stmt::Return(Some(_))));
    }

    #[test]
    fn test_for_await_and_yield() {
        let program = parse("for await (const l of linesAsync) yield l.trim();").unwrap();
        let Stmt::ForOf { is_await, body, .. } = &program.body[0] else {
            panic!("expected for-of");
        };
        assert!(is_await);
        assert!(matches!(**body, Stmt::Yield(_)));
    }

    #[test]
    fn test_yield_inside_arrow_is_rejected() {
        let err = parse("lines.forEach(l => { yield l })").unwrap_err();
        assert!(err.to_string().contains("top level"), "{}", err);
    }

    #[test]
    fn test_object_literal_and_shorthand() {
        let expr = single_expr("({ name, 'count': 2, of: 3 })");
        assert_eq!(
            expr,
            Expr::Object(vec![
                ("name".into(), Expr::Ident("name".into())),
                ("count".into(), Expr::Number(2.0)),
                ("of".into(), Expr::Number(3.0)),
            ])
        );
    }

    #[test]
    fn test_arrow_assignment_body() {
        let expr = single_expr("lines.forEach(l => total += l.length)");
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        let Expr::Arrow(func) = &args[0] else {
            panic!("expected arrow");
        };
        assert!(matches!(&func.body, FunctionBody::Block(b) if matches!(b[0], Stmt::Assign { op: AssignOp::Add, .. })));
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let expr = single_expr("doc?.fileName ?? 'none'");
        assert!(matches!(expr, Expr::Logical { op: LogicalOp::Nullish, .. }));
    }

    #[test]
    fn test_error_position() {
        match parse("lines.map(x =>)") {
            Err(QueryError::Compile { line, column, message }) => {
                assert_eq!((line, column), (1, 15));
                assert!(message.contains("expected expression"), "{}", message);
            }
            other => panic!("expected compile error, got {:?}", other),
        }
        assert!(parse("lines.filter(").is_err());
    }

    fn assert_too_deep(source: &str) {
        match parse(source) {
            Err(QueryError::Compile { message, .. }) => {
                assert_eq!(message, "expression nested too deeply")
            }
            other => panic!("expected compile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_runaway_nesting_is_a_compile_error() {
        let parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_too_deep(&parens);
        assert_too_deep(&format!("{}x", "!".repeat(50_000)));
        assert_too_deep(&format!("{}1", "[".repeat(50_000)));
        assert_too_deep(&format!("x{}", " + x".repeat(50_000)));
        assert_too_deep(&format!("lines{}", ".length".repeat(50_000)));
        assert_too_deep(&"{".repeat(50_000));
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let parens = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(single_expr(&parens), Expr::Number(1.0));
        assert!(parse(&format!("x{}", " + x".repeat(60))).is_ok());
        assert!(parse(&format!("lines{}", ".trim()".repeat(30))).is_ok());
    }
}
