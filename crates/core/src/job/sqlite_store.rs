//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CreateJobRequest, DateRange, JobFilter, JobStatus, JobStatusUpdate, JobStore, LogLevel,
    StoreError, SyncJob, SyncLogEntry,
};

const JOB_COLUMNS: &str = "id, account_id, start_date, end_date, status, total_files, \
     synced_files, failed_files, error_message, created_at, updated_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) a database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sync_jobs (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL,
                total_files INTEGER NOT NULL DEFAULT 0,
                synced_files INTEGER NOT NULL DEFAULT 0,
                failed_files INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_jobs_account ON sync_jobs(account_id, status);
            CREATE INDEX IF NOT EXISTS idx_sync_jobs_created_at ON sync_jobs(created_at);

            CREATE TABLE IF NOT EXISTS sync_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL REFERENCES sync_jobs(id),
                file_name TEXT,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_logs_job ON sync_logs(job_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn parse_date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<SyncJob> {
        let start: String = row.get(2)?;
        let end: String = row.get(3)?;
        let status: String = row.get(4)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        Ok(SyncJob {
            id: row.get(0)?,
            account_id: row.get(1)?,
            range: DateRange::new(Self::parse_date(&start), Self::parse_date(&end)),
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
            total_files: row.get::<_, i64>(5)?.max(0) as u64,
            synced_files: row.get::<_, i64>(6)?.max(0) as u64,
            failed_files: row.get::<_, i64>(7)?.max(0) as u64,
            error_message: row.get(8)?,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn fetch_job(conn: &Connection, id: &str) -> Result<Option<SyncJob>, StoreError> {
        let job = conn
            .query_row(
                &format!("SELECT {} FROM sync_jobs WHERE id = ?", JOB_COLUMNS),
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, request: CreateJobRequest) -> Result<SyncJob, StoreError> {
        let conn = self.lock()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sync_jobs (id, account_id, start_date, end_date, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.account_id,
                request.range.start.to_string(),
                request.range.end.to_string(),
                JobStatus::Pending.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(SyncJob {
            id,
            account_id: request.account_id,
            range: request.range,
            status: JobStatus::Pending,
            total_files: 0,
            synced_files: 0,
            failed_files: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_job(&self, id: &str) -> Result<Option<SyncJob>, StoreError> {
        let conn = self.lock()?;
        Self::fetch_job(&conn, id)
    }

    fn update_job_status(&self, id: &str, update: JobStatusUpdate) -> Result<SyncJob, StoreError> {
        let conn = self.lock()?;

        let current =
            Self::fetch_job(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if current.status.is_terminal() {
            return Err(StoreError::Terminal {
                job_id: id.to_string(),
                status: current.status,
            });
        }

        conn.execute(
            r#"UPDATE sync_jobs SET
                status = ?1,
                total_files = COALESCE(?2, total_files),
                synced_files = MAX(synced_files, COALESCE(?3, synced_files)),
                failed_files = MAX(failed_files, COALESCE(?4, failed_files)),
                error_message = COALESCE(?5, error_message),
                updated_at = ?6
            WHERE id = ?7"#,
            params![
                update.status.as_str(),
                update.total_files.map(|v| v as i64),
                update.synced_files.map(|v| v as i64),
                update.failed_files.map(|v| v as i64),
                update.error_message,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;

        Self::fetch_job(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_logs (job_id, file_name, level, message, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                entry.job_id,
                entry.file_name,
                entry.level.as_str(),
                entry.message,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn sync_logs(&self, job_id: &str) -> Result<Vec<SyncLogEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, file_name, level, message, created_at FROM sync_logs WHERE job_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![job_id], |row| {
            let level: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            Ok(SyncLogEntry {
                job_id: row.get(0)?,
                file_name: row.get(1)?,
                level: LogLevel::parse(&level),
                message: row.get(3)?,
                created_at: Self::parse_timestamp(&created_at),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn active_jobs(&self, account_id: &str) -> Result<Vec<SyncJob>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_jobs WHERE account_id = ? AND status IN ('pending', 'running') ORDER BY created_at ASC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![account_id], Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<SyncJob>, StoreError> {
        let conn = self.lock()?;

        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ref account_id) = filter.account_id {
            conditions.push("account_id = ?");
            values.push(Box::new(account_id.clone()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM sync_jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let jobs = stmt
            .query_map(params.as_slice(), Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    fn request(account: &str) -> CreateJobRequest {
        CreateJobRequest {
            account_id: account.to_string(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ),
        }
    }

    #[test]
    fn test_create_and_get_job() {
        let store = create_test_store();
        let job = store.create_job(request("acct-1")).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_files, 0);

        let fetched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.account_id, "acct-1");
        assert_eq!(fetched.range, job.range);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn test_get_nonexistent_job() {
        let store = create_test_store();
        assert!(store.get_job("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_status_keeps_absent_fields() {
        let store = create_test_store();
        let job = store.create_job(request("acct-1")).unwrap();

        store
            .update_job_status(
                &job.id,
                JobStatusUpdate::new(JobStatus::Running).with_total(25),
            )
            .unwrap();
        store
            .update_job_status(
                &job.id,
                JobStatusUpdate::new(JobStatus::Running)
                    .with_counts(10, 0)
                    .with_error("Batch 2 failed: worker lost"),
            )
            .unwrap();
        let updated = store
            .update_job_status(&job.id, JobStatusUpdate::new(JobStatus::Running))
            .unwrap();

        assert_eq!(updated.total_files, 25);
        assert_eq!(updated.synced_files, 10);
        assert_eq!(
            updated.error_message.as_deref(),
            Some("Batch 2 failed: worker lost")
        );
    }

    #[test]
    fn test_counters_never_decrease() {
        let store = create_test_store();
        let job = store.create_job(request("acct-1")).unwrap();

        store
            .update_job_status(
                &job.id,
                JobStatusUpdate::new(JobStatus::Running).with_counts(8, 2),
            )
            .unwrap();
        let updated = store
            .update_job_status(
                &job.id,
                JobStatusUpdate::new(JobStatus::Running).with_counts(5, 1),
            )
            .unwrap();

        assert_eq!(updated.synced_files, 8);
        assert_eq!(updated.failed_files, 2);
    }

    #[test]
    fn test_terminal_job_rejects_updates() {
        let store = create_test_store();
        let job = store.create_job(request("acct-1")).unwrap();
        store
            .update_job_status(&job.id, JobStatusUpdate::new(JobStatus::Completed))
            .unwrap();

        let result = store.update_job_status(&job.id, JobStatusUpdate::new(JobStatus::Failed));
        assert!(matches!(
            result,
            Err(StoreError::Terminal {
                status: JobStatus::Completed,
                ..
            })
        ));
    }

    #[test]
    fn test_update_nonexistent_job() {
        let store = create_test_store();
        let result = store.update_job_status("nope", JobStatusUpdate::new(JobStatus::Running));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_active_jobs_per_account() {
        let store = create_test_store();
        let a = store.create_job(request("acct-1")).unwrap();
        let b = store.create_job(request("acct-1")).unwrap();
        store.create_job(request("acct-2")).unwrap();
        store
            .update_job_status(&b.id, JobStatusUpdate::new(JobStatus::Failed))
            .unwrap();

        let active = store.active_jobs("acct-1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }

    #[test]
    fn test_list_jobs_with_filter() {
        let store = create_test_store();
        for _ in 0..3 {
            store.create_job(request("acct-1")).unwrap();
        }
        let other = store.create_job(request("acct-2")).unwrap();
        store
            .update_job_status(&other.id, JobStatusUpdate::new(JobStatus::Running))
            .unwrap();

        assert_eq!(store.list_jobs(&JobFilter::new()).unwrap().len(), 4);
        assert_eq!(
            store
                .list_jobs(&JobFilter::new().with_account("acct-1"))
                .unwrap()
                .len(),
            3
        );
        let running = store
            .list_jobs(&JobFilter::new().with_status(JobStatus::Running))
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, other.id);
        assert_eq!(
            store
                .list_jobs(&JobFilter::new().with_limit(2))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_sync_logs_in_order() {
        let store = create_test_store();
        let job = store.create_job(request("acct-1")).unwrap();

        store
            .append_sync_log(SyncLogEntry::new(&job.id, LogLevel::Info, "Found 2 files"))
            .unwrap();
        store
            .append_sync_log(
                SyncLogEntry::new(&job.id, LogLevel::Success, "https://cdn/a.jpg").for_file("a"),
            )
            .unwrap();
        store
            .append_sync_log(
                SyncLogEntry::new(&job.id, LogLevel::Error, "[Timeout] slow").for_file("b"),
            )
            .unwrap();

        let logs = store.sync_logs(&job.id).unwrap();
        let levels: Vec<_> = logs.iter().map(|l| l.level).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Info, LogLevel::Success, LogLevel::Error]
        );
        assert_eq!(logs[1].file_name.as_deref(), Some("a"));
        assert!(store.sync_logs("other").unwrap().is_empty());
    }

    #[test]
    fn test_file_based_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::new(&path).unwrap();
            store.create_job(request("acct-1")).unwrap().id
        };

        let reopened = SqliteJobStore::new(&path).unwrap();
        assert!(reopened.get_job(&id).unwrap().is_some());
    }
}
