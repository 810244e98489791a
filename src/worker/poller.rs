//! Task poller: the scheduler loop.
//!
//! On start, resets tasks left `in_progress` by a previous process back to
//! `queued` (nothing survives a restart). Then, forever: pick one random
//! queued task, run it, sleep for the poll interval.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::store::Database;
use crate::worker::runner::{RunOutcome, TaskRunner};
use crate::workflows::model::TaskStatus;

/// Spawn the task poller background loop.
pub fn spawn_task_poller(
    store: Arc<dyn Database>,
    runner: Arc<TaskRunner>,
    config: &RunnerConfig,
) -> JoinHandle<()> {
    let poll_interval = config.poll_interval;
    let recover = config.recover_stale_tasks;

    tokio::spawn(async move {
        info!("Task poller started (interval: {}s)", poll_interval.as_secs());

        if recover {
            reset_stale_tasks(&store).await;
        }

        loop {
            poll_once(&store, &runner).await;
            tokio::time::sleep(poll_interval).await;
        }
    })
}

/// Pick one queued task and run it.
///
/// Returns whether a task was found. Task errors are logged, never raised.
pub async fn poll_once(store: &Arc<dyn Database>, runner: &TaskRunner) -> bool {
    let task = match store.next_queued_task().await {
        Ok(Some(task)) => task,
        Ok(None) => {
            debug!("No queued tasks");
            return false;
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch next queued task");
            return false;
        }
    };

    let task_id = task.id;
    let task_type = task.task_type.clone();
    match runner.run(task).await {
        Ok(RunOutcome::Completed { result_id }) => {
            debug!(task_id = %task_id, result_id = %result_id, "Poll cycle completed a task");
        }
        Ok(outcome) => {
            debug!(task_id = %task_id, ?outcome, "Poll cycle finished");
        }
        Err(e) if e.is_configuration() => {
            error!(
                task_id = %task_id,
                task_type = %task_type,
                error = %e,
                "Task is misconfigured"
            );
        }
        Err(e) => {
            warn!(
                task_id = %task_id,
                task_type = %task_type,
                error = %e,
                "Task failed"
            );
        }
    }
    true
}

/// Reset any `in_progress` tasks back to `queued`.
///
/// Returns how many were reset.
pub async fn reset_stale_tasks(store: &Arc<dyn Database>) -> usize {
    let stale = match store.list_tasks_by_status(TaskStatus::InProgress).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = %e, "Failed to list in_progress tasks for reset");
            return 0;
        }
    };

    if stale.is_empty() {
        return 0;
    }

    info!(count = stale.len(), "Resetting stale in_progress tasks to queued");

    let mut reset = 0;
    for mut task in stale {
        task.status = TaskStatus::Queued;
        task.progress = None;
        task.updated_at = chrono::Utc::now();
        if let Err(e) = store.update_task(&task).await {
            warn!(task_id = %task.id, error = %e, "Failed to reset task status");
            continue;
        }
        reset += 1;
    }
    reset
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::jobs::JobRegistry;
    use crate::store::LibSqlBackend;
    use crate::workflows::definition::WorkflowDefinition;
    use crate::workflows::model::{Task, Workflow, WorkflowStatus};

    const POLYGON: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

    async fn setup() -> (Arc<dyn Database>, Arc<TaskRunner>) {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = Arc::new(JobRegistry::with_builtin_jobs(store.clone()));
        let runner = Arc::new(TaskRunner::new(store.clone(), registry));
        (store, runner)
    }

    #[tokio::test]
    async fn poll_once_on_empty_store() {
        let (store, runner) = setup().await;
        assert!(!poll_once(&store, &runner).await);
    }

    #[tokio::test]
    async fn polling_drives_builtin_workflow_to_completion() {
        let (store, runner) = setup().await;
        let definition = WorkflowDefinition::builtin().unwrap();
        let (workflow, tasks) = definition.instantiate("client-1", POLYGON);
        store.create_workflow(&workflow, &tasks).await.unwrap();

        // Random selection, blocked tasks and waiting joins all take extra
        // cycles; bound the loop well above what four tasks need.
        for _ in 0..500 {
            if !poll_once(&store, &runner).await {
                break;
            }
        }

        let tasks = store.list_workflow_tasks(workflow.id).await.unwrap();
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

        let workflow = store.get_workflow(workflow.id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        let final_result = workflow.final_result.unwrap();
        assert!(final_result.starts_with("Workflow execution summary: "));

        let report = tasks.iter().find(|t| t.task_type == "report").unwrap();
        let output: serde_json::Value = serde_json::from_str(report.output.as_deref().unwrap()).unwrap();
        assert_eq!(output["tasks"].as_array().unwrap().len(), tasks.len() - 1);
    }

    #[tokio::test]
    async fn failing_task_is_swallowed() {
        let (store, runner) = setup().await;
        let workflow = Workflow::new("c", "w");
        let task = Task::new(workflow.id, 1, "c", "area", "not geojson");
        store.create_workflow(&workflow, std::slice::from_ref(&task)).await.unwrap();

        assert!(poll_once(&store, &runner).await);
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(!poll_once(&store, &runner).await);
    }

    #[tokio::test]
    async fn unknown_type_does_not_stall_workflow() {
        let (store, runner) = setup().await;
        let workflow = Workflow::new("c", "w");
        let tasks = vec![
            Task::new(workflow.id, 1, "c", "area", POLYGON),
            Task::new(workflow.id, 2, "c", "bogus", POLYGON),
            Task::new(workflow.id, 3, "c", "report", POLYGON),
        ];
        store.create_workflow(&workflow, &tasks).await.unwrap();

        let mut polls = 0;
        while poll_once(&store, &runner).await {
            polls += 1;
            assert!(polls < 200, "queue never drained");
        }

        let statuses: Vec<(String, TaskStatus)> = store
            .list_workflow_tasks(workflow.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.task_type, t.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("area".to_string(), TaskStatus::Completed),
                ("bogus".to_string(), TaskStatus::Failed),
                ("report".to_string(), TaskStatus::Completed),
            ]
        );
        let workflow = store.get_workflow(workflow.id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn reset_stale_requeues_in_progress() {
        let (store, _) = setup().await;
        let workflow = Workflow::new("c", "w");
        let mut stale = Task::new(workflow.id, 1, "c", "area", POLYGON).with_status(TaskStatus::InProgress);
        stale.progress = Some("starting job...".into());
        let done = Task::new(workflow.id, 2, "c", "area", POLYGON).with_status(TaskStatus::Completed);
        store.create_workflow(&workflow, &[stale.clone(), done.clone()]).await.unwrap();

        assert_eq!(reset_stale_tasks(&store).await, 1);
        let stored = store.get_task(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Queued);
        assert!(stored.progress.is_none());
        assert_eq!(
            store.get_task(done.id).await.unwrap().unwrap().status,
            TaskStatus::Completed
        );
        assert_eq!(reset_stale_tasks(&store).await, 0);
    }

    #[tokio::test]
    async fn spawned_poller_recovers_and_runs() {
        let (store, runner) = setup().await;
        let workflow = Workflow::new("c", "w");
        let task = Task::new(workflow.id, 1, "c", "area", POLYGON).with_status(TaskStatus::InProgress);
        store.create_workflow(&workflow, std::slice::from_ref(&task)).await.unwrap();

        let config = RunnerConfig {
            poll_interval: Duration::from_millis(10),
            ..RunnerConfig::default()
        };
        let handle = spawn_task_poller(store.clone(), runner, &config);

        let mut status = TaskStatus::InProgress;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = store.get_task(task.id).await.unwrap().unwrap().status;
            if status == TaskStatus::Completed {
                break;
            }
        }
        handle.abort();
        assert_eq!(status, TaskStatus::Completed);
    }
}
