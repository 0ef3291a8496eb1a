use crate::error::InnerError;
use std::fmt;

/// Result of evaluating a constant expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
}

impl Value {
    pub fn is_int(self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Raw 32-bit pattern pushed by the interpreter.
    pub fn as_bits(self) -> i32 {
        match self {
            Self::Int(i) => i,
            Self::Float(f) => f.to_bits() as i32,
        }
    }

    pub fn int(self) -> Result<i32, InnerError> {
        match self {
            Self::Int(i) => Ok(i),
            Self::Float(_) => Err(InnerError::TypeMismatch(
                "floating-point expression not allowed".into(),
            )),
        }
    }

    pub fn float(self) -> Result<f32, InnerError> {
        match self {
            Self::Float(f) => Ok(f),
            Self::Int(_) => Err(InnerError::TypeMismatch(
                "integer expression not allowed".into(),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}
