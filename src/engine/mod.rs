//! Reduction engine: turns an expression's RPN buffer into tasks, one ready
//! triple at a time, and splices task results back in.
//!
//! - `buffer`: arena linked list with stable, generation-checked handles
//! - `reduction`: triple extraction and result splicing

pub mod buffer;
pub mod reduction;

pub use buffer::{Handle, TokenBuffer};
pub use reduction::{Progress, ReadyTriple, Reduction, TaskIdAllocator};

/// Canonical text for a computed value: shortest round-trip decimal for
/// finite values, `+Inf`, `-Inf` or `NaN` otherwise.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
