//! Notification job.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::JobError;
use crate::jobs::job::{Job, Outcome};
use crate::workflows::model::Task;

/// Notifies the workflow's client about its predecessor's result.
///
/// Delivery goes to the log; the returned receipt records what was sent.
pub struct NotificationJob;

#[async_trait]
impl Job for NotificationJob {
    fn task_type(&self) -> &str {
        "notification"
    }

    fn description(&self) -> &str {
        "Notify the submitting client with the previous step's output"
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, JobError> {
        let message = match (task.input.as_deref(), task.dependency) {
            (Some(input), Some(dependency_id)) => format!(
                "Workflow {}: task {dependency_id} produced {input}",
                task.workflow_id
            ),
            (Some(input), None) => format!("Workflow {}: received {input}", task.workflow_id),
            (None, _) => format!(
                "Workflow {} reached step {}",
                task.workflow_id, task.step_number
            ),
        };

        info!(
            task_id = %task.id,
            workflow_id = %task.workflow_id,
            client_id = %task.client_id,
            %message,
            "Sending notification"
        );

        Ok(Outcome::Value(json!({
            "clientId": task.client_id,
            "dependencyId": task.dependency,
            "channel": "log",
            "message": message,
            "sentAt": Utc::now().to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn receipt_includes_input() {
        let predecessor = Uuid::new_v4();
        let mut task = Task::new(Uuid::new_v4(), 3, "client-7", "notification", "{}")
            .with_dependency(predecessor);
        task.input = Some("{\"vertexCount\":4}".into());

        let Outcome::Value(receipt) = NotificationJob.execute(&task).await.unwrap() else {
            panic!("expected a receipt");
        };
        assert_eq!(receipt["clientId"], "client-7");
        assert_eq!(receipt["channel"], "log");
        let message = receipt["message"].as_str().unwrap();
        assert!(message.contains("{\"vertexCount\":4}"));
        assert!(message.contains(&task.workflow_id.to_string()));
        assert!(message.contains(&format!("task {predecessor} produced")));
        assert!(!message.contains("step 3"));
        assert_eq!(receipt["dependencyId"], json!(predecessor));
    }

    #[tokio::test]
    async fn works_without_input() {
        let task = Task::new(Uuid::new_v4(), 1, "c", "notification", "{}");
        let Outcome::Value(receipt) = NotificationJob.execute(&task).await.unwrap() else {
            panic!("expected a receipt");
        };
        assert!(receipt["message"].as_str().unwrap().contains("reached step 1"));
    }
}
