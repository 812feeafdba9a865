//! Calc orchestrator: distributed evaluation of arithmetic expressions.
//!
//! Expressions are parsed to RPN, reduced into independent binary-operation
//! tasks, and leased to agent workers that compute them and report back.

pub mod agent;
pub mod api;
pub mod calc;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod scheduler;
