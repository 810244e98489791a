//! Declarative workflow definitions.
//!
//! A definition is a YAML document listing steps by number, each naming a
//! task type and optionally the single step it depends on. Instantiating a
//! definition produces a `Workflow` and its queued `Task`s with dependency
//! references resolved to task IDs.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::DefinitionError;
use crate::workflows::model::{Task, Workflow};

/// Definition used when no workflow file is configured.
pub const DEFAULT_DEFINITION: &str = include_str!("../../workflows/example_workflow.yml");

/// A single step of a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub task_type: String,
    pub step_number: u32,
    #[serde(default)]
    pub depends_on_step: Option<u32>,
}

/// A parsed and validated workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Parse and validate a YAML definition.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read a definition from disk.
    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// The embedded default definition.
    pub fn builtin() -> Result<Self, DefinitionError> {
        Self::from_yaml(DEFAULT_DEFINITION)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::Empty {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_number) {
                return Err(DefinitionError::DuplicateStep {
                    step: step.step_number,
                });
            }
        }

        for step in &self.steps {
            let Some(depends_on) = step.depends_on_step else {
                continue;
            };
            if depends_on == step.step_number {
                return Err(DefinitionError::SelfDependency {
                    step: step.step_number,
                });
            }
            if !seen.contains(&depends_on) {
                return Err(DefinitionError::UnknownDependency {
                    step: step.step_number,
                    depends_on,
                });
            }
        }

        // One predecessor per step: following the chain from any step must
        // reach a root without revisiting a step.
        let parent: HashMap<u32, u32> = self
            .steps
            .iter()
            .filter_map(|s| s.depends_on_step.map(|dep| (s.step_number, dep)))
            .collect();
        for step in &self.steps {
            let mut visited = HashSet::from([step.step_number]);
            let mut current = step.step_number;
            while let Some(&next) = parent.get(&current) {
                if !visited.insert(next) {
                    return Err(DefinitionError::Cycle {
                        step: step.step_number,
                    });
                }
                current = next;
            }
        }

        Ok(())
    }

    /// Build a workflow and its tasks for one submission.
    ///
    /// Tasks are returned in step order.
    pub fn instantiate(&self, client_id: &str, geo_json: &str) -> (Workflow, Vec<Task>) {
        let workflow = Workflow::new(client_id, self.name.as_str());

        let mut steps: Vec<&StepDefinition> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);

        let mut tasks: Vec<Task> = steps
            .iter()
            .map(|step| {
                Task::new(
                    workflow.id,
                    step.step_number,
                    client_id,
                    step.task_type.as_str(),
                    geo_json,
                )
            })
            .collect();

        let ids_by_step: HashMap<u32, uuid::Uuid> =
            tasks.iter().map(|t| (t.step_number, t.id)).collect();

        for (task, step) in tasks.iter_mut().zip(&steps) {
            task.dependency = step
                .depends_on_step
                .and_then(|dep| ids_by_step.get(&dep).copied());
        }

        debug!(
            workflow_id = %workflow.id,
            name = %self.name,
            tasks = tasks.len(),
            "Instantiated workflow definition"
        );

        (workflow, tasks)
    }
}
