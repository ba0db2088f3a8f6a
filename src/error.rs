//! Error types for each stage of the kou pipeline.

use thiserror::Error;

use crate::token::Pos;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: lexical error: {message}")]
pub struct LexError {
    pub message: String,
    pub pos: Pos,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: parse error: {message}")]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: semantic error: {message}")]
pub struct TypeError {
    pub message: String,
    pub pos: Pos,
}

/// Raised when lowering hits a broken pipeline invariant or an unresolvable
/// export. Carries no position: it is never caused by a single source site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("codegen error: {message}")]
pub struct CodegenError {
    pub message: String,
}

impl LexError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        LexError {
            message: message.into(),
            pos,
        }
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        ParseError {
            message: message.into(),
            pos,
        }
    }
}

impl TypeError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        TypeError {
            message: message.into(),
            pos,
        }
    }
}

impl CodegenError {
    pub fn new(message: impl Into<String>) -> Self {
        CodegenError {
            message: message.into(),
        }
    }
}

/// Any error raised by [`crate::compile`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl Error {
    /// Source position of the error, if the failing stage tracks one.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            Error::Lex(e) => Some(e.pos),
            Error::Parse(e) => Some(e.pos),
            Error::Type(e) => Some(e.pos),
            Error::Codegen(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
