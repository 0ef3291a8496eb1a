use crate::ast::{Identifier, Pos};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InnerError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(Identifier),
    #[error("{0} is already defined")]
    DuplicateSymbol(Identifier),
    #[error("{0}")]
    NonConstant(String),
    #[error("circular reference in definition of {0}")]
    CircularReference(Identifier),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    InvalidContext(String),
    #[error("origin exceeds FIT limit by {0}")]
    OriginOverflow(i32),
    #[error("fixup did not converge: {0}")]
    FixupDivergence(String),
    #[error("{0}")]
    ImageTooLarge(String),
    #[error("circular object reference {0}")]
    CircularObject(Identifier),
    #[error("object file {0} not found")]
    MissingObject(Identifier),
    #[error("no PUB routines found in {0}")]
    NoPublicMethods(Identifier),
    #[error("{0}")]
    ValueOutOfRange(String),
    #[error("division by zero in constant expression")]
    DivideByZero,
    #[error("{0}")]
    ClockSettings(String),
    #[error("address of {0} is not long aligned")]
    MisalignedAddress(Identifier),
}

impl InnerError {
    pub fn at(self, pos: Pos) -> CompileError {
        CompileError {
            inner: self,
            pos,
            file: None,
        }
    }

    pub(crate) fn context(msg: impl Into<String>) -> Self {
        Self::InvalidContext(msg.into())
    }

    pub(crate) fn non_constant(msg: impl Into<String>) -> Self {
        Self::NonConstant(msg.into())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CompileError {
    inner: InnerError,
    pos: Pos,
    file: Option<Identifier>,
}

impl CompileError {
    pub fn inner(&self) -> &InnerError {
        &self.inner
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Attaches the file name unless an inner stage already did.
    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_owned());
        }
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Pos { line, column } = self.pos;
        match &self.file {
            Some(file) => write!(f, "{file}:{line}:{column}: {}", self.inner),
            None => write!(f, "{line}:{column}: {}", self.inner),
        }
    }
}

impl fmt::Debug for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

/// Advisory diagnostic; never stops compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    pub file: Identifier,
    pub pos: Pos,
    pub message: String,
}

impl Warning {
    pub fn new(file: &str, pos: Pos, message: impl Into<String>) -> Self {
        let warning = Self {
            file: file.to_owned(),
            pos,
            message: message.into(),
        };
        log::warn!("{warning}");
        warning
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Pos { line, column } = self.pos;
        write!(f, "{}:{line}:{column}: warning: {}", self.file, self.message)
    }
}
