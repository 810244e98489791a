//! `Database` trait: single async interface for workflow persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::workflows::model::{Task, TaskResult, TaskStatus, Workflow};

/// Backend-agnostic storage for workflows, tasks, and results.
///
/// Reads must reflect the latest writes committed by this process.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Workflows ───────────────────────────────────────────────────

    /// Insert a workflow together with all of its tasks.
    async fn create_workflow(&self, workflow: &Workflow, tasks: &[Task])
    -> Result<(), DatabaseError>;

    /// Get a workflow by ID.
    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, DatabaseError>;

    /// Persist a workflow's status and final result.
    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// All tasks of a workflow, in step order.
    async fn list_workflow_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, DatabaseError>;

    /// All tasks currently in `status`, across workflows.
    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DatabaseError>;

    /// Pick one queued task at random, or `None` when nothing is queued.
    async fn next_queued_task(&self) -> Result<Option<Task>, DatabaseError>;

    /// Persist `task` only if its stored status is still `queued`.
    ///
    /// Returns `false` when the row was already moved by someone else.
    async fn claim_task(&self, task: &Task) -> Result<bool, DatabaseError>;

    /// Persist every mutable field of a task.
    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError>;

    // ── Results ─────────────────────────────────────────────────────

    /// Insert a new result row.
    async fn insert_result(&self, result: &TaskResult) -> Result<(), DatabaseError>;

    /// Get a result by ID.
    async fn get_result(&self, id: Uuid) -> Result<Option<TaskResult>, DatabaseError>;
}
