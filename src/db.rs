use crate::errors::{EngineError, EngineResult};
use crate::state::DbCommand;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

pub fn init_db(data_dir: &Path) -> EngineResult<DbPool> {
    std::fs::create_dir_all(data_dir).map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    let db_path = data_dir.join("maze_runner.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// Schema-initialised in-memory database, for tests and ephemeral runs.
pub fn open_in_memory() -> EngineResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Dedicated DB writer task. Reads commands from bounded channel, executes SQL.
/// This is the ONLY task that writes through the connection.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        if let Err(e) = execute_command(&db, cmd) {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn execute_command(db: &DbPool, cmd: DbCommand) -> EngineResult<()> {
    match cmd {
        DbCommand::InsertRun(record) => insert_run(db, &record),
    }
}

pub fn insert_run(db: &DbPool, record: &RunRecord) -> EngineResult<()> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))?;
    conn.execute(
        "INSERT INTO simulations (id, timestamp, scenario_type, n_samples, true_value, estimated_value, error, method, computation_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            record.id,
            record.timestamp,
            record.scenario_label,
            record.sample_count as i64,
            record.reference_price,
            record.final_estimate,
            record.error,
            record.method,
            record.elapsed_secs,
        ],
    )?;
    tracing::debug!(id = %record.id, "run persisted");
    Ok(())
}

/// Most recent runs first. No ranking, just insertion time.
pub fn recent_runs(db: &DbPool, limit: usize) -> EngineResult<Vec<RunRecord>> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, scenario_type, n_samples, true_value, estimated_value, error, method, computation_time
         FROM simulations ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
        Ok(RunRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            scenario_label: row.get(2)?,
            sample_count: row.get::<_, i64>(3)? as usize,
            reference_price: row.get(4)?,
            final_estimate: row.get(5)?,
            error: row.get(6)?,
            method: row.get(7)?,
            elapsed_secs: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ── Row types ──

/// One finalized run, as handed to persistence.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub timestamp: String,
    pub scenario_label: String,
    pub sample_count: usize,
    pub reference_price: f64,
    pub final_estimate: f64,
    /// |final_estimate - reference_price|
    pub error: f64,
    pub method: String,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, timestamp: &str) -> RunRecord {
        RunRecord {
            id: id.into(),
            timestamp: timestamp.into(),
            scenario_label: "European Call Option".into(),
            sample_count: 5000,
            reference_price: 10.4506,
            final_estimate: 10.41,
            error: 0.0406,
            method: "antithetic".into(),
            elapsed_secs: 0.012,
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let db = open_in_memory().unwrap();
        let r = record("a", "2026-01-01T00:00:00Z");
        insert_run(&db, &r).unwrap();
        let rows = recent_runs(&db, 10).unwrap();
        assert_eq!(rows, vec![r]);
    }

    #[test]
    fn test_recent_runs_newest_first_and_limited() {
        let db = open_in_memory().unwrap();
        insert_run(&db, &record("old", "2026-01-01T00:00:00Z")).unwrap();
        insert_run(&db, &record("mid", "2026-01-02T00:00:00Z")).unwrap();
        insert_run(&db, &record("new", "2026-01-03T00:00:00Z")).unwrap();

        let rows = recent_runs(&db, 2).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid"]);
    }

    #[test]
    fn test_duplicate_id_is_an_error() {
        let db = open_in_memory().unwrap();
        insert_run(&db, &record("dup", "2026-01-01T00:00:00Z")).unwrap();
        assert!(matches!(
            insert_run(&db, &record("dup", "2026-01-01T00:00:00Z")),
            Err(EngineError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_task_drains_channel() {
        let db = open_in_memory().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let writer = tokio::spawn(run_db_writer(db.clone(), rx));

        tx.send(DbCommand::InsertRun(record("w", "2026-01-01T00:00:00Z")))
            .await
            .unwrap();
        drop(tx);
        writer.await.unwrap();

        assert_eq!(recent_runs(&db, 5).unwrap().len(), 1);
    }

    #[test]
    fn test_init_db_creates_file() {
        let dir = std::env::temp_dir().join(format!("maze_runner_test_{}", uuid::Uuid::new_v4()));
        let db = init_db(&dir).unwrap();
        insert_run(&db, &record("f", "2026-01-01T00:00:00Z")).unwrap();
        assert!(dir.join("maze_runner.db").exists());
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
