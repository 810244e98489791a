//! Error types for the workflow runner.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while loading a declarative workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Failed to parse workflow definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Workflow definition {name} has no steps")]
    Empty { name: String },

    #[error("Step {step} is declared more than once")]
    DuplicateStep { step: u32 },

    #[error("Step {step} depends on unknown step {depends_on}")]
    UnknownDependency { step: u32, depends_on: u32 },

    #[error("Step {step} depends on itself")]
    SelfDependency { step: u32 },

    #[error("Step {step} is part of a dependency cycle")]
    Cycle { step: u32 },

    #[error("Step {step} uses task type {task_type} which has no registered job")]
    UnknownTaskType { step: u32, task_type: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a job while it runs.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A join job found no sibling tasks. Indicates a malformed workflow.
    #[error("No tasks to report in workflow {workflow_id}")]
    NothingToReport { workflow_id: Uuid },

    #[error("Invalid input for task {task_id}: {reason}")]
    InvalidInput { task_id: Uuid, reason: String },

    #[error("Job {task_type} failed: {reason}")]
    Failed { task_type: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the task executor.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("No job registered for task type: {task_type}")]
    UnknownTaskType { task_type: String },

    #[error("Task {task_id} cannot run: dependency {dependency_id} failed")]
    PredecessorFailed { task_id: Uuid, dependency_id: Uuid },

    #[error("Task {task_id} ({task_type}) failed: {source}")]
    JobFailed {
        task_id: Uuid,
        task_type: String,
        #[source]
        source: JobError,
    },

    #[error("Task {task_id} depends on missing task {dependency_id}")]
    DependencyNotFound { task_id: Uuid, dependency_id: Uuid },

    #[error("Task {task_id} depends on task {dependency_id} from another workflow")]
    CrossWorkflowDependency { task_id: Uuid, dependency_id: Uuid },

    #[error("Task {id} not found")]
    TaskNotFound { id: Uuid },

    #[error("Workflow {id} not found")]
    WorkflowNotFound { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl TaskError {
    /// True for errors caused by how a workflow was wired up rather than by
    /// a job failing at runtime.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::UnknownTaskType { .. }
            | Self::DependencyNotFound { .. }
            | Self::CrossWorkflowDependency { .. } => true,
            Self::JobFailed { source, .. } => matches!(source, JobError::NothingToReport { .. }),
            _ => false,
        }
    }
}

/// Result type alias for the runner.
pub type Result<T> = std::result::Result<T, Error>;
