use std::{error::Error, fmt};

use crate::lexer::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    DivisionByZero,
    UndefinedVariable,
    TypeMismatch,
    /// Step budget or wall clock limit exhausted.
    Timeout,
    /// `LEER` with no input line left.
    InputExhausted,
    CallDepthExceeded,
    Overflow,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::DivisionByZero => "division by zero",
            FailureKind::UndefinedVariable => "undefined name",
            FailureKind::TypeMismatch => "type mismatch",
            FailureKind::Timeout => "timeout",
            FailureKind::InputExhausted => "input exhausted",
            FailureKind::CallDepthExceeded => "call depth exceeded",
            FailureKind::Overflow => "integer overflow",
        };
        write!(f, "{name}")
    }
}

/// A valid program failing while it runs, at the statement being executed.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeFailure {
    pub kind: FailureKind,
    pub position: Position,
    pub message: String,
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.position, self.kind, self.message)
    }
}

impl Error for RuntimeFailure {}
