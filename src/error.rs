use crate::peg::PegError;

/// A `Result` alias where the `Err` case is `rpl::Error`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid escape sequence in literal: \\{0}")]
    LiteralEscape(String),
    #[error("invalid escape sequence in string: \\{0}")]
    StringEscape(String),
    #[error("invalid escape sequence in character set: \\{0}")]
    CharsetEscape(String),
    #[error("unknown named charset: {0}")]
    UnknownCharset(String),
    #[error("character set intersection is not implemented")]
    CsetIntersection,
    #[error("character set difference is not implemented")]
    CsetDifference,
    #[error("unbound identifier: {0}")]
    Unbound(String),
    #[error("type mismatch: expected a {expected}, but '{name}' is bound to {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("pattern being repeated can match the empty string")]
    EmptyRepetition,
    #[error("lookbehind pattern does not have fixed length: {0}")]
    LookbehindNotFixed(String),
    #[error("lookbehind pattern too long: {0}")]
    LookbehindTooLong(String),
    #[error("lookbehind pattern has captures: {0}")]
    LookbehindCaptures(String),
    #[error("peg compilation error: {0}")]
    PegCompile(String),
    // left-recursion reports keep the back-end wording
    #[error("{0}")]
    LeftRecursive(String),
    #[error("error in function: '{0}'")]
    Function(String),
    #[error("{0}")]
    InvalidValue(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Translate a grammar-assembly failure from the back-end.
    pub(crate) fn from_grammar(e: PegError) -> Self {
        match e {
            e @ PegError::LeftRecursive(_) => Error::LeftRecursive(e.to_string()),
            e => Error::PegCompile(e.to_string()),
        }
    }
}
