use crate::model::{Task, TaskOutcome};

/// Evaluate one task. Inf and NaN results are returned as values; only
/// unreadable operands fail.
pub fn compute(task: &Task) -> TaskOutcome {
    let lhs = match task.arg1.trim().parse::<f64>() {
        Ok(value) => value,
        Err(_) => return TaskOutcome::Failure(format!("invalid operand {:?}", task.arg1)),
    };
    let rhs = match task.arg2.trim().parse::<f64>() {
        Ok(value) => value,
        Err(_) => return TaskOutcome::Failure(format!("invalid operand {:?}", task.arg2)),
    };
    TaskOutcome::Success(task.operation.apply(lhs, rhs))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::calc::Operator;
    use crate::model::{ExpressionId, OwnerId, TaskId};

    fn task(arg1: &str, operation: Operator, arg2: &str) -> Task {
        Task {
            id: TaskId(1),
            arg1: arg1.into(),
            arg2: arg2.into(),
            operation,
            operation_time: Duration::ZERO,
            owner_id: OwnerId(0),
            expression_id: ExpressionId(1),
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(compute(&task("3", Operator::Add, "4")), TaskOutcome::Success(7.0));
        assert_eq!(compute(&task("3", Operator::Sub, "4")), TaskOutcome::Success(-1.0));
        assert_eq!(compute(&task("1.5", Operator::Mul, "4")), TaskOutcome::Success(6.0));
        assert_eq!(compute(&task("1", Operator::Div, "4")), TaskOutcome::Success(0.25));
    }

    #[test]
    fn division_by_zero_is_a_value() {
        assert_eq!(
            compute(&task("2", Operator::Div, "0")),
            TaskOutcome::Success(f64::INFINITY)
        );
        let TaskOutcome::Success(nan) = compute(&task("0", Operator::Div, "0")) else {
            panic!("expected a value");
        };
        assert!(nan.is_nan());
    }

    #[test]
    fn bad_operand_fails() {
        assert!(matches!(
            compute(&task("x", Operator::Add, "1")),
            TaskOutcome::Failure(reason) if reason.contains("\"x\"")
        ));
    }
}
