//! Workflow data model: tasks, workflows, results, and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked up (or re-queued by a waiting join job).
    Queued,
    /// Claimed by the executor; its job is running.
    InProgress,
    /// Job produced a value.
    Completed,
    /// Job failed, or its dependency did.
    Failed,
}

impl TaskStatus {
    /// Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Queued or InProgress.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Aggregate status of a workflow, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, no task has finished yet.
    Initial,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// A single unit of work within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID.
    pub id: Uuid,
    /// Owning workflow.
    pub workflow_id: Uuid,
    /// Position within the workflow (1-based).
    pub step_number: u32,
    /// Client that submitted the workflow.
    pub client_id: String,
    /// Key selecting the job that runs this task.
    pub task_type: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Direct predecessor in the same workflow, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Uuid>,
    /// GeoJSON payload the workflow was submitted with.
    pub geo_json: String,
    /// Output of the predecessor, bound when the dependency completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Serialized result data, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Human-readable progress marker. Cleared on terminal transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Persisted result, once produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a queued task with no dependency.
    pub fn new(
        workflow_id: Uuid,
        step_number: u32,
        client_id: impl Into<String>,
        task_type: impl Into<String>,
        geo_json: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            step_number,
            client_id: client_id.into(),
            task_type: task_type.into(),
            status: TaskStatus::Queued,
            dependency: None,
            geo_json: geo_json.into(),
            input: None,
            output: None,
            progress: None,
            result_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set the predecessor.
    pub fn with_dependency(mut self, dependency: Uuid) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Builder: set status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set output.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// An ordered collection of tasks sharing a derived status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub client_id: String,
    /// Name of the definition this workflow was instantiated from.
    pub name: String,
    pub status: WorkflowStatus,
    /// Composed summary, present only once the workflow is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            name: name.into(),
            status: WorkflowStatus::Initial,
            final_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable record of a job's produced value. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub task_id: Uuid,
    /// JSON-serialized job value.
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(task_id: Uuid, data: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            data: data.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-task entry used in report and workflow summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: Uuid,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_failed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pending: Option<bool>,
}

impl TaskSummary {
    /// Map a task by its status: output when completed, a failure flag when
    /// failed, a pending flag otherwise.
    pub fn from_task(task: &Task) -> Self {
        let mut summary = Self {
            task_id: task.id,
            task_type: task.task_type.clone(),
            output: None,
            is_failed: None,
            is_pending: None,
        };
        match task.status {
            TaskStatus::Completed => summary.output = task.output.clone(),
            TaskStatus::Failed => summary.is_failed = Some(true),
            TaskStatus::Queued | TaskStatus::InProgress => summary.is_pending = Some(true),
        }
        summary
    }
}
