//! HTTP surface of the orchestrator.

pub mod routes;

pub use routes::{AGENT_HEADER, AppState, OWNER_HEADER, api_routes};
