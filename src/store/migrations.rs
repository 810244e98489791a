//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::{Connection, params};
use tracing::{debug, info};

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'initial',
                final_result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                step_number INTEGER NOT NULL,
                client_id TEXT NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                dependency_id TEXT,
                geo_json TEXT NOT NULL,
                input TEXT,
                output TEXT,
                progress TEXT,
                result_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_workflow ON tasks(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        "#,
    },
    Migration {
        version: 2,
        name: "task_results",
        sql: r#"
            CREATE TABLE IF NOT EXISTS results (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_task ON results(task_id);
        "#,
    },
];

/// Apply every migration newer than the recorded schema version, in order.
///
/// The `_migrations` ledger is created on first use.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
        })?;
        record_applied(conn, migration).await?;
    }

    let version = schema_version(conn).await?;
    debug!(version, "Database migrations complete");
    Ok(())
}

/// Highest applied migration version, or 0 on a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("schema_version value: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!("schema_version row: {e}"))),
    }
}

async fn record_applied(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("record V{}: {e}", migration.version)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn migrated() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();
        run_migrations(&conn).await.unwrap();
        conn
    }

    async fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut rows = conn
            .query("SELECT name FROM pragma_table_info(?1) ORDER BY cid", params![table])
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn task_table_matches_backend_columns() {
        let conn = migrated().await;
        assert_eq!(
            columns(&conn, "tasks").await.join(", "),
            "id, workflow_id, step_number, client_id, task_type, status, dependency_id, \
             geo_json, input, output, progress, result_id, created_at, updated_at"
        );
        assert_eq!(
            columns(&conn, "results").await,
            vec!["id", "task_id", "data", "created_at"]
        );
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let conn = migrated().await;
        run_migrations(&conn).await.unwrap();

        let latest = MIGRATIONS.last().map(|m| m.version).unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), latest);
    }

    #[tokio::test]
    async fn applies_only_missing_versions() {
        let conn = migrated().await;
        conn.execute_batch("DROP TABLE results; DELETE FROM _migrations WHERE version = 2;")
            .await
            .unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), 1);

        run_migrations(&conn).await.unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), 2);
        assert!(!columns(&conn, "results").await.is_empty());
    }
}
