//! HTTP surface: workflow submission, status and results.

pub mod routes;

pub use routes::{ApiState, api_routes};
