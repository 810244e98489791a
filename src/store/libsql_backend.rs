//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::workflows::model::{Task, TaskResult, TaskStatus, Workflow, WorkflowStatus};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Shared UPDATE for `update_task` and `claim_task`.
    async fn write_task(&self, task: &Task, only_if_queued: bool) -> Result<u64, DatabaseError> {
        let sql = if only_if_queued {
            "UPDATE tasks SET status = ?1, input = ?2, output = ?3, progress = ?4, result_id = ?5, updated_at = ?6 WHERE id = ?7 AND status = 'queued'"
        } else {
            "UPDATE tasks SET status = ?1, input = ?2, output = ?3, progress = ?4, result_id = ?5, updated_at = ?6 WHERE id = ?7"
        };

        self.conn()
            .execute(
                sql,
                params![
                    task.status.as_str(),
                    task.input.as_deref(),
                    task.output.as_deref(),
                    task.progress.as_deref(),
                    task.result_id.map(|id| id.to_string()),
                    task.updated_at.to_rfc3339(),
                    task.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task: {e}")))
    }

    async fn collect_tasks(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("list tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list tasks row: {e}")))?
        {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

/// Read a nullable text column; NULL and empty strings both map to `None`.
fn opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok().filter(|s| !s.is_empty())
}

/// Column list for task SELECT queries (14 columns).
const TASK_COLUMNS: &str = "id, workflow_id, step_number, client_id, task_type, status, dependency_id, geo_json, input, output, progress, result_id, created_at, updated_at";

const WORKFLOW_COLUMNS: &str = "id, client_id, name, status, final_result, created_at, updated_at";

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let id_str: String = row.get(0).map_err(|e| DatabaseError::Query(format!("task.id: {e}")))?;
    let workflow_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("task.workflow_id: {e}")))?;
    let step_number: i64 = row.get(2).unwrap_or(0);
    let client_id: String = row.get(3).unwrap_or_default();
    let task_type: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("task.task_type: {e}")))?;
    let status_str: String = row
        .get(5)
        .map_err(|e| DatabaseError::Query(format!("task.status: {e}")))?;
    let status: TaskStatus = status_str
        .parse()
        .map_err(DatabaseError::Serialization)?;

    let dependency = opt_text(row, 6)
        .map(|s| parse_uuid(&s, "task.dependency_id"))
        .transpose()?;
    let result_id = opt_text(row, 11)
        .map(|s| parse_uuid(&s, "task.result_id"))
        .transpose()?;

    let created_str: String = row.get(12).unwrap_or_default();
    let updated_str: String = row.get(13).unwrap_or_default();

    Ok(Task {
        id: parse_uuid(&id_str, "task.id")?,
        workflow_id: parse_uuid(&workflow_str, "task.workflow_id")?,
        step_number: step_number as u32,
        client_id,
        task_type,
        status,
        dependency,
        geo_json: row.get(7).unwrap_or_default(),
        input: opt_text(row, 8),
        output: opt_text(row, 9),
        progress: opt_text(row, 10),
        result_id,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_workflow(row: &libsql::Row) -> Result<Workflow, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("workflow.id: {e}")))?;
    let status_str: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("workflow.status: {e}")))?;
    let status: WorkflowStatus = status_str
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let created_str: String = row.get(5).unwrap_or_default();
    let updated_str: String = row.get(6).unwrap_or_default();

    Ok(Workflow {
        id: parse_uuid(&id_str, "workflow.id")?,
        client_id: row.get(1).unwrap_or_default(),
        name: row.get(2).unwrap_or_default(),
        status,
        final_result: opt_text(row, 4),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Workflows ───────────────────────────────────────────────────

    async fn create_workflow(
        &self,
        workflow: &Workflow,
        tasks: &[Task],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_workflow begin: {e}")))?;

        tx.execute(
            "INSERT INTO workflows (id, client_id, name, status, final_result, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                workflow.id.to_string(),
                workflow.client_id.as_str(),
                workflow.name.as_str(),
                workflow.status.as_str(),
                workflow.final_result.as_deref(),
                workflow.created_at.to_rfc3339(),
                workflow.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("create_workflow: {e}")))?;

        for task in tasks {
            tx.execute(
                "INSERT INTO tasks (id, workflow_id, step_number, client_id, task_type, status, dependency_id, geo_json, input, output, progress, result_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    task.id.to_string(),
                    task.workflow_id.to_string(),
                    task.step_number as i64,
                    task.client_id.as_str(),
                    task.task_type.as_str(),
                    task.status.as_str(),
                    task.dependency.map(|id| id.to_string()),
                    task.geo_json.as_str(),
                    task.input.as_deref(),
                    task.output.as_deref(),
                    task.progress.as_deref(),
                    task.result_id.map(|id| id.to_string()),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_workflow task: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_workflow commit: {e}")))?;

        debug!(id = %workflow.id, tasks = tasks.len(), "Workflow created");
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_workflow: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_workflow(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_workflow row: {e}"))),
        }
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE workflows SET status = ?1, final_result = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    workflow.status.as_str(),
                    workflow.final_result.as_deref(),
                    workflow.updated_at.to_rfc3339(),
                    workflow.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_workflow: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "workflow".into(),
                id: workflow.id.to_string(),
            });
        }
        Ok(())
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_task(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task row: {e}"))),
        }
    }

    async fn list_workflow_tasks(&self, workflow_id: Uuid) -> Result<Vec<Task>, DatabaseError> {
        self.collect_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE workflow_id = ?1 ORDER BY step_number ASC, created_at ASC"
            ),
            params![workflow_id.to_string()],
        )
        .await
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DatabaseError> {
        self.collect_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at ASC"),
            params![status.as_str()],
        )
        .await
    }

    async fn next_queued_task(&self) -> Result<Option<Task>, DatabaseError> {
        let mut tasks = self
            .collect_tasks(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'queued' ORDER BY RANDOM() LIMIT 1"
                ),
                (),
            )
            .await?;
        Ok(tasks.pop())
    }

    async fn claim_task(&self, task: &Task) -> Result<bool, DatabaseError> {
        Ok(self.write_task(task, true).await? > 0)
    }

    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError> {
        if self.write_task(task, false).await? == 0 {
            return Err(DatabaseError::NotFound {
                entity: "task".into(),
                id: task.id.to_string(),
            });
        }
        Ok(())
    }

    // ── Results ─────────────────────────────────────────────────────

    async fn insert_result(&self, result: &TaskResult) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO results (id, task_id, data, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    result.id.to_string(),
                    result.task_id.to_string(),
                    result.data.as_str(),
                    result.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_result: {e}")))?;
        debug!(id = %result.id, task_id = %result.task_id, "Result stored");
        Ok(())
    }

    async fn get_result(&self, id: Uuid) -> Result<Option<TaskResult>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, task_id, data, created_at FROM results WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_result: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_result row: {e}"))),
        };

        let id_str: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("result.id: {e}")))?;
        let task_str: String = row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("result.task_id: {e}")))?;
        let created_str: String = row.get(3).unwrap_or_default();

        Ok(Some(TaskResult {
            id: parse_uuid(&id_str, "result.id")?,
            task_id: parse_uuid(&task_str, "result.task_id")?,
            data: row.get(2).unwrap_or_default(),
            created_at: parse_datetime(&created_str),
        }))
    }
}
