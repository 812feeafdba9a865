//! Error types for the orchestrator and agent.

use crate::model::{ExpressionId, OwnerId, TaskId};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Expression parse errors.
///
/// The display text is what an Error-status expression carries as its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expression is empty")]
    EmptyExpression,

    #[error("invalid character in expression")]
    InvalidCharacter,

    #[error("invalid number")]
    InvalidNumber,

    #[error("mismatched parentheses")]
    MismatchedParentheses,

    #[error("unknown operator")]
    UnknownOperator,

    #[error("not enough operands")]
    NotEnoughOperands,

    #[error("expression is not valid")]
    InvalidExpression,

    #[error("division by zero")]
    DivisionByZero,
}

/// Scheduler and expression store errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The task is not currently dispatched: unknown id, already resolved,
    /// or requeued by its lease timeout before the result arrived.
    #[error("task id {id} not found")]
    TaskNotFound { id: TaskId },

    #[error("expression {id} not found for owner {owner}")]
    ExpressionNotFound { owner: OwnerId, id: ExpressionId },

    /// Recorded as an Error expression; `id` points at that record.
    #[error("expression {id} rejected: {source}")]
    InvalidExpression {
        id: ExpressionId,
        #[source]
        source: ParseError,
    },

    /// The recorded buffer position no longer holds the task's placeholder.
    #[error("task {id} points at a stale buffer position")]
    StalePosition { id: TaskId },
}

/// Agent-side transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Orchestrator returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The orchestrator refused a result as stale; drop it, never retry.
    #[error("Result for task {id} rejected: {reason}")]
    Rejected { id: TaskId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_texts() {
        assert_eq!(ParseError::EmptyExpression.to_string(), "expression is empty");
        assert_eq!(ParseError::DivisionByZero.to_string(), "division by zero");
    }

    #[test]
    fn invalid_expression_keeps_source() {
        use std::error::Error as _;

        let err = SchedulerError::InvalidExpression {
            id: ExpressionId(2),
            source: ParseError::MismatchedParentheses,
        };
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("mismatched parentheses".to_string())
        );
    }
}
