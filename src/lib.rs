//! Workflow runner: executes multi-step workflows of dependent tasks.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod worker;
pub mod workflows;
