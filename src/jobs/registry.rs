//! Job registry: explicit task type → job map, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DefinitionError;
use crate::jobs::builtin::{AnalysisJob, AreaJob, NotificationJob, ReportJob};
use crate::jobs::job::Job;
use crate::store::Database;
use crate::workflows::WorkflowDefinition;

/// Registry of available jobs.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn Job>>,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in jobs.
    pub fn with_builtin_jobs(store: Arc<dyn Database>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AreaJob));
        registry.register(Arc::new(AnalysisJob));
        registry.register(Arc::new(NotificationJob));
        registry.register(Arc::new(ReportJob::new(store)));
        registry
    }

    /// Register a job under its task type. Replaces any previous job.
    pub fn register(&mut self, job: Arc<dyn Job>) {
        let task_type = job.task_type().to_string();
        if self.jobs.insert(task_type.clone(), job).is_some() {
            tracing::warn!(task_type = %task_type, "Replaced previously registered job");
        } else {
            tracing::debug!(
                task_type = %task_type,
                description = self.jobs[&task_type].description(),
                "Registered job"
            );
        }
    }

    /// Ensure every step of `definition` has a registered job.
    pub fn check_definition(&self, definition: &WorkflowDefinition) -> Result<(), DefinitionError> {
        match definition.steps.iter().find(|s| !self.has(&s.task_type)) {
            Some(step) => Err(DefinitionError::UnknownTaskType {
                step: step.step_number,
                task_type: step.task_type.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Get the job for a task type.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(task_type).cloned()
    }

    /// Check if a job exists for a task type.
    pub fn has(&self, task_type: &str) -> bool {
        self.jobs.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self.jobs.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered jobs.
    pub fn count(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::JobError;
    use crate::jobs::job::Outcome;
    use crate::store::LibSqlBackend;
    use crate::workflows::model::Task;

    struct Fixed(&'static str, i64);

    #[async_trait]
    impl Job for Fixed {
        fn task_type(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "fixed value"
        }
        async fn execute(&self, _task: &Task) -> Result<Outcome, JobError> {
            Ok(Outcome::Value(serde_json::json!(self.1)))
        }
    }

    #[tokio::test]
    async fn builtin_registry_has_all_jobs() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = JobRegistry::with_builtin_jobs(store);
        assert_eq!(registry.count(), 4);
        assert_eq!(
            registry.list(),
            vec!["analysis", "area", "notification", "report"]
        );
        assert!(registry.get("report").is_some());
        assert!(!registry.has("bogus"));
    }

    #[tokio::test]
    async fn builtin_definition_passes_check() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = JobRegistry::with_builtin_jobs(store);
        let definition = WorkflowDefinition::builtin().unwrap();
        registry.check_definition(&definition).unwrap();
    }

    #[test]
    fn definition_with_unregistered_type_is_rejected() {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(Fixed("area", 1)));
        let definition = WorkflowDefinition::from_yaml(
            "name: d\nsteps:\n  - {taskType: area, stepNumber: 1}\n  - {taskType: bogus, stepNumber: 2}\n",
        )
        .unwrap();

        let err = registry.check_definition(&definition).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownTaskType { step: 2, ref task_type } if task_type == "bogus"
        ));
    }

    #[tokio::test]
    async fn register_replaces_same_type() {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(Fixed("area", 1)));
        registry.register(Arc::new(Fixed("area", 2)));
        assert_eq!(registry.count(), 1);

        let task = Task::new(uuid::Uuid::new_v4(), 1, "c", "area", "{}");
        let outcome = registry.get("area").unwrap().execute(&task).await.unwrap();
        assert_eq!(outcome, Outcome::Value(serde_json::json!(2)));
    }
}
