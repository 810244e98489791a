//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, DefinitionError};
use crate::workflows::WorkflowDefinition;

/// Runner configuration, built from `WORKFLOW_RUNNER_*` environment variables.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Sleep between scheduler iterations.
    pub poll_interval: Duration,
    /// HTTP listen port.
    pub http_port: u16,
    /// Workflow definition YAML. `None` uses the embedded default.
    pub workflow_file: Option<PathBuf>,
    /// Reset tasks stranded `in_progress` on startup.
    pub recover_stale_tasks: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/workflow-runner.db"),
            poll_interval: Duration::from_secs(5),
            http_port: 3000,
            workflow_file: None,
            recover_stale_tasks: true,
        }
    }
}

impl RunnerConfig {
    /// Build config from environment variables. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("WORKFLOW_RUNNER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "WORKFLOW_RUNNER_POLL_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "WORKFLOW_RUNNER_POLL_INTERVAL_SECS".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(port) = parse_var::<u16>(&lookup, "WORKFLOW_RUNNER_HTTP_PORT")? {
            config.http_port = port;
        }

        config.workflow_file = lookup("WORKFLOW_RUNNER_WORKFLOW_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        if let Some(raw) = lookup("WORKFLOW_RUNNER_RECOVER_STALE") {
            config.recover_stale_tasks = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "WORKFLOW_RUNNER_RECOVER_STALE".into(),
                        message: format!("expected a boolean, got {raw:?}"),
                    });
                }
            };
        }

        Ok(config)
    }

    /// Load the configured workflow definition, or the embedded default.
    pub fn workflow_definition(&self) -> Result<WorkflowDefinition, DefinitionError> {
        match &self.workflow_file {
            Some(path) => WorkflowDefinition::from_file(path),
            None => WorkflowDefinition::builtin(),
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<RunnerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("./data/workflow-runner.db"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.http_port, 3000);
        assert!(config.workflow_file.is_none());
        assert!(config.recover_stale_tasks);
    }

    #[test]
    fn reads_all_variables() {
        let config = config_from(&[
            ("WORKFLOW_RUNNER_DB_PATH", "/tmp/runner.db"),
            ("WORKFLOW_RUNNER_POLL_INTERVAL_SECS", "2"),
            ("WORKFLOW_RUNNER_HTTP_PORT", "8080"),
            ("WORKFLOW_RUNNER_WORKFLOW_FILE", "flows/custom.yml"),
            ("WORKFLOW_RUNNER_RECOVER_STALE", "off"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/runner.db"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.workflow_file, Some(PathBuf::from("flows/custom.yml")));
        assert!(!config.recover_stale_tasks);
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, value) in [
            ("WORKFLOW_RUNNER_POLL_INTERVAL_SECS", "soon"),
            ("WORKFLOW_RUNNER_POLL_INTERVAL_SECS", "0"),
            ("WORKFLOW_RUNNER_HTTP_PORT", "70000"),
            ("WORKFLOW_RUNNER_RECOVER_STALE", "maybe"),
        ] {
            let err = config_from(&[(key, value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: ref k, .. } if k == key),
                "{key}={value}"
            );
        }
    }

    #[test]
    fn loads_definition_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yml");
        std::fs::write(&path, "name: single\nsteps:\n  - {taskType: area, stepNumber: 1}\n").unwrap();

        let config = RunnerConfig {
            workflow_file: Some(path),
            ..RunnerConfig::default()
        };
        let definition = config.workflow_definition().unwrap();
        assert_eq!(definition.name, "single");

        let builtin = RunnerConfig::default().workflow_definition().unwrap();
        assert!(!builtin.steps.is_empty());
    }

    #[test]
    fn missing_definition_file_is_io_error() {
        let config = RunnerConfig {
            workflow_file: Some(PathBuf::from("/nonexistent/flow.yml")),
            ..RunnerConfig::default()
        };
        assert!(matches!(
            config.workflow_definition().unwrap_err(),
            DefinitionError::Io(_)
        ));
    }
}
