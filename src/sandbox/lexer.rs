//! Query lexer
//!
//! Tokens are defined with the logos derive macro. Whitespace and both
//! comment styles are skipped.

use logos::Logos;
use std::ops::Range;

use crate::core::error::QueryError;

/// All tokens of the query language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*|/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unescape(lex.slice()))]
    #[regex(r"`([^`\\]|\\.)*`", |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Keywords
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("return")]
    Return,
    #[token("yield")]
    Yield,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("of")]
    Of,
    #[token("await")]
    Await,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,
    #[token("as")]
    As,
    #[token("typeof")]
    TypeOf,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("?.")]
    QuestionDot,
    #[token("?")]
    Question,
    #[token("??")]
    Nullish,
    #[token("=>")]
    Arrow,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("++")]
    Increment,
    #[token("--")]
    Decrement,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("===")]
    StrictEq,
    #[token("!==")]
    StrictNotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    // Only meaningful inside type annotations
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
}

impl Token {
    /// Short human description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Str(_) => "string literal".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            other => format!("'{}'", other.text()),
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Token::Const => "const",
            Token::Let => "let",
            Token::Var => "var",
            Token::Return => "return",
            Token::Yield => "yield",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::Of => "of",
            Token::Await => "await",
            Token::While => "while",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            Token::As => "as",
            Token::TypeOf => "typeof",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::QuestionDot => "?.",
            Token::Question => "?",
            Token::Nullish => "??",
            Token::Arrow => "=>",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::Increment => "++",
            Token::Decrement => "--",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::StrictEq => "===",
            Token::StrictNotEq => "!==",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Pipe => "|",
            Token::Amp => "&",
            Token::Number(_) | Token::Str(_) | Token::Ident(_) => "",
        }
    }

    /// Keywords that may still be used as property names (`x.of`, `{as: 1}`).
    pub fn keyword_name(&self) -> Option<&'static str> {
        match self {
            Token::Number(_) | Token::Str(_) | Token::Ident(_) => None,
            other => {
                let text = other.text();
                text.chars()
                    .all(|c| c.is_ascii_alphabetic())
                    .then_some(text)
            }
        }
    }
}

/// Strip quotes and resolve escapes.
fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map(|nl| before[nl + 1..].chars().count())
        .unwrap_or_else(|| before.chars().count())
        + 1;
    (line, column)
}

pub fn compile_error(source: &str, offset: usize, message: impl Into<String>) -> QueryError {
    let (line, column) = line_col(source, offset);
    QueryError::Compile {
        message: message.into(),
        line,
        column,
    }
}

/// Tokenize a query, failing on the first unrecognised character.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, QueryError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let slice = lexer.slice();
                let message = if slice.starts_with(['"', '\'', '`']) {
                    "unterminated string literal".to_string()
                } else {
                    format!("unexpected character '{}'", slice)
                };
                return Err(compile_error(source, lexer.span().start, message));
            }
        }
    }

    Ok(tokens)
}
