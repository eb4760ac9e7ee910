//! Error types for diagram editing and reduction.
//!
//! Edits fail with [`GraphError`] and leave the diagram untouched. Reduction
//! fails with [`ReduceError`]; it never mutates the diagram, so every error is
//! recoverable at the call site. [`ParseError`] is shared by both.

use thiserror::Error;

use crate::block::BlockId;
use crate::diagram::ConnectionId;

/// A transfer-function expression or coefficient pair that could not be turned
/// into a valid ratio of polynomials.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot parse `{text}` at offset {offset}: {message}")]
pub struct ParseError {
    /// The offending text, as supplied by the user.
    pub text: String,
    /// Byte offset into `text` where the problem was detected.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(text: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset,
            message: message.into(),
        }
    }
}

/// Why [`crate::diagram::Diagram::add_connection`] rejected a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRejection {
    /// The source port is not an output port.
    SourceNotOutput,
    /// The destination port is not an input port.
    TargetNotInput,
    /// Source and destination belong to the same block.
    SelfLoop,
    /// The port index is beyond the block's arity.
    NoSuchPort,
    /// The destination input port already has an incoming connection.
    TargetOccupied,
    /// An identical connection already exists.
    Duplicate,
}

impl std::fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::SourceNotOutput => "source port must be an output",
            Self::TargetNotInput => "destination port must be an input",
            Self::SelfLoop => "cannot connect a block to itself",
            Self::NoSuchPort => "port index out of range",
            Self::TargetOccupied => "input port already has an incoming connection",
            Self::Duplicate => "connection already exists",
        };
        f.write_str(msg)
    }
}

/// Errors raised by diagram edit operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid connection: {reason}")]
    InvalidConnection { reason: ConnectionRejection },

    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A block or connection id is already taken (document loading, undo).
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// No id is left after the largest one in use.
    #[error("no {0} ids left")]
    IdExhausted(&'static str),

    /// A parameter edit that does not apply to the block's kind.
    #[error("cannot {action} on {kind} block {block}")]
    InvalidEdit {
        block: BlockId,
        kind: &'static str,
        action: &'static str,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl GraphError {
    pub(crate) fn rejected(reason: ConnectionRejection) -> Self {
        Self::InvalidConnection { reason }
    }
}

/// Errors raised while reducing a diagram to transfer functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    /// A block was evaluated without enough connected inputs.
    #[error("block `{block}` needs {expected} connected input(s), found {found}")]
    Arity {
        block: String,
        expected: usize,
        found: usize,
    },

    /// A cycle that does not pass through any Sum or Subtract block.
    #[error("cyclic dependency without a summing junction: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A modeled feedback loop whose loop gain makes `1 - L` vanish.
    #[error("feedback loop through `{block}` is singular (1 - loop gain = 0)")]
    SingularLoop { block: String },

    /// `g / (1 -+ g*h)` with a vanishing denominator.
    #[error("feedback composition is singular")]
    SingularFeedback,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::rejected(ConnectionRejection::TargetOccupied);
        assert_eq!(
            err.to_string(),
            "invalid connection: input port already has an incoming connection"
        );

        let err = ReduceError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency without a summing junction: a -> b -> a"
        );

        let err = ParseError::new("1/(s+", 5, "unexpected end of input");
        assert_eq!(
            err.to_string(),
            "cannot parse `1/(s+` at offset 5: unexpected end of input"
        );
    }
}
