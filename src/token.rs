//! The token definition for the segment SQL dialect.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    Exists,
    Between,
    Like,
    Is,
    Null,
    In,
    Inner,
    Join,
    On,
    Group,
    By,
    Having,
    Interval,

    // Literals
    Identifier(&'a str),
    String(&'a str), // Raw content between single quotes, `''` still doubled
    Number(&'a str),

    // Punctuation
    LParen,    // (
    RParen,    // )
    Comma,     // ,
    Dot,       // .
    Semicolon, // ;
    Star,      // *
    Plus,      // +
    Minus,     // -

    // Operators
    Eq,    // =
    NotEq, // != or <>
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    // Special
    Illegal, // An unknown character or an unterminated literal
}

impl TokenKind<'_> {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq | TokenKind::NotEq | TokenKind::Gt | TokenKind::Lt | TokenKind::Gte | TokenKind::Lte
        )
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}
