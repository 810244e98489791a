//! Pluggable units of work, keyed by task type.

pub mod builtin;
pub mod job;
pub mod registry;

pub use job::{Job, Outcome};
pub use registry::JobRegistry;
