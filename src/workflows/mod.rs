//! Workflow model and declarative definitions.

pub mod definition;
pub mod model;

pub use definition::{StepDefinition, WorkflowDefinition};
pub use model::{Task, TaskResult, TaskStatus, TaskSummary, Workflow, WorkflowStatus};
