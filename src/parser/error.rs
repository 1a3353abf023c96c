use std::{error::Error, fmt};

use crate::lexer::Position;

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxErrorKind {
    UnexpectedToken,
    /// End of input reached while `construct` was still waiting for its
    /// closing keyword.
    UnclosedBlock {
        construct: String,
        opened_at: Position,
    },
    DuplicateMain {
        first: Position,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub kind: SyntaxErrorKind,
    pub position: Position,
    pub found: String,
    pub expected: String,
}

impl ParseError {
    /// Parsing cannot go on after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, SyntaxErrorKind::UnclosedBlock { .. })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SyntaxErrorKind::UnexpectedToken => write!(
                f,
                "{}: unexpected {}, expected {}",
                self.position, self.found, self.expected
            ),
            SyntaxErrorKind::UnclosedBlock {
                construct,
                opened_at,
            } => write!(
                f,
                "{}: `{}` opened at {} is never closed, expected {} before {}",
                self.position, construct, opened_at, self.expected, self.found
            ),
            SyntaxErrorKind::DuplicateMain { first } => write!(
                f,
                "{}: second `INICIO` block, the first one starts at {}",
                self.position, first
            ),
        }
    }
}

impl Error for ParseError {}
