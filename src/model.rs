//! Shared data model: identifiers, tasks, results, and expression views.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calc::Operator;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identity of the user that submitted an expression.
    OwnerId
);
id_type!(
    /// Per-owner expression identifier, starting at 1.
    ExpressionId
);
id_type!(
    /// Globally unique, monotonically increasing task identifier.
    TaskId
);

/// One binary operation handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Left operand as a decimal string.
    pub arg1: String,
    /// Right operand as a decimal string.
    pub arg2: String,
    pub operation: Operator,
    /// Simulated cost of the operation, in milliseconds on the wire.
    #[serde(with = "duration_ms")]
    pub operation_time: Duration,
    pub owner_id: OwnerId,
    pub expression_id: ExpressionId,
}

/// Outcome a worker reports for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Computed value. Inf and NaN are legal values, not errors.
    #[serde(rename = "value", with = "wire_float")]
    Success(f64),
    /// The worker could not compute the task.
    #[serde(rename = "error")]
    Failure(String),
}

/// A task result as submitted back to the scheduler.
///
/// Serialized as `{"id": 1, "owner_id": 0, "value": 7}` or
/// `{"id": 1, "owner_id": 0, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    #[serde(default)]
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn success(task: &Task, value: f64) -> Self {
        Self {
            id: task.id,
            owner_id: task.owner_id,
            outcome: TaskOutcome::Success(value),
        }
    }

    pub fn failure(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            id: task.id,
            owner_id: task.owner_id,
            outcome: TaskOutcome::Failure(reason.into()),
        }
    }
}

/// Lifecycle status of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionStatus {
    /// Tasks are still outstanding.
    Waiting,
    /// Fully reduced; the result holds the value.
    Done,
    /// Rejected or failed; the result holds the reason.
    Error,
}

impl fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "Waiting",
            Self::Done => "Done",
            Self::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// Read-only snapshot of an expression record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionView {
    pub id: ExpressionId,
    pub status: ExpressionStatus,
    /// Empty while waiting.
    pub result: String,
    #[serde(rename = "expression")]
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expression counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionCounts {
    pub waiting: usize,
    pub done: usize,
    pub error: usize,
}

/// Scheduler-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Operator occurrences across accepted expressions, keyed by symbol.
    pub operations: BTreeMap<String, u64>,
    pub expressions: ExpressionCounts,
    pub ready_tasks: usize,
    pub leased_tasks: usize,
    pub requeued_total: u64,
    pub resolved_total: u64,
}

/// `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `f64` that survives JSON: non-finite values travel as `"+Inf"`, `"-Inf"`
/// and `"NaN"`.
pub mod wire_float {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::engine::format_value;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&format_value(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.trim() {
                "+Inf" | "Inf" | "inf" | "+inf" => Ok(f64::INFINITY),
                "-Inf" | "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" | "nan" => Ok(f64::NAN),
                other => other
                    .parse::<f64>()
                    .map_err(|_| D::Error::custom(format!("invalid float value: {other}"))),
            },
        }
    }
}
