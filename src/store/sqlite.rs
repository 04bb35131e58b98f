use super::{RequestFilter, UpliftStore};
use crate::error::{Error, Result};
use crate::request::{NewUpliftRequest, ReplicationTarget, UpliftRequest};
use crate::types::{Phid, RevisionId, UpliftStatus};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row, TransactionBehavior, params};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How long a writer waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS uplift_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    revision_id INTEGER NOT NULL,
    repository TEXT NOT NULL,
    form_json TEXT NOT NULL,
    requester_email TEXT NOT NULL,
    status TEXT NOT NULL,
    target_revision_id INTEGER,
    target_revision_phid TEXT,
    target_diff_phid TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (revision_id, repository)
);
";

const COLUMNS: &str = "id, revision_id, repository, form_json, requester_email, status, \
    target_revision_id, target_revision_phid, target_diff_phid, last_error, created_at, updated_at";

/// Store backed by a SQLite database file
///
/// The `(revision, repository)` pair carries a `UNIQUE` constraint and every
/// status change runs in an immediate write transaction that only updates
/// the row if its status is still the one read. Several processes can share
/// one database file.
///
/// rusqlite is synchronous; every call runs on the blocking pool.
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

fn storage(action: &str, e: impl Display) -> Error {
    Error::Persistence(format!("{action}: {e}"))
}

fn conflict(request: &UpliftRequest) -> Error {
    Error::Conflict {
        revision_id: request.revision_id,
        repository: request.repository.clone(),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<UpliftRequest> {
    let form: String = row.get(3)?;
    let status: String = row.get(5)?;
    Ok(UpliftRequest {
        id: row.get(0)?,
        revision_id: RevisionId(row.get(1)?),
        repository: row.get(2)?,
        form: serde_json::from_str(&form)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        requester_email: row.get(4)?,
        status: status
            .parse()
            .map_err(|_| rusqlite::Error::InvalidColumnType(5, status.clone(), Type::Text))?,
        target_revision_id: row.get::<_, Option<u64>>(6)?.map(RevisionId),
        target_revision_phid: row.get::<_, Option<String>>(7)?.map(Phid::from),
        target_diff_phid: row.get::<_, Option<String>>(8)?.map(Phid::from),
        last_error: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn fetch(conn: &Connection, clause: &str, params: impl Params) -> Result<Option<UpliftRequest>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM uplift_requests WHERE {clause}"),
        params,
        read_row,
    )
    .optional()
    .map_err(|e| storage("cannot read uplift request", e))
}

/// Apply `change` to request `id` and write it back
///
/// The update is conditioned on the status read at the start, so a writer
/// that moved the row in between turns into a conflict.
fn update(
    conn: &mut Connection,
    id: u64,
    change: impl FnOnce(&mut UpliftRequest) -> Result<()>,
) -> Result<UpliftRequest> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| storage("cannot start transaction", e))?;
    let mut request = fetch(&tx, "id = ?1", params![id])?.ok_or(Error::RequestNotFound(id))?;
    let read_status = request.status;
    change(&mut request)?;

    let changed = tx
        .execute(
            "UPDATE uplift_requests
             SET status = ?1, target_revision_id = ?2, target_revision_phid = ?3,
                 target_diff_phid = ?4, last_error = ?5, updated_at = ?6
             WHERE id = ?7 AND status = ?8",
            params![
                request.status.to_string(),
                request.target_revision_id.map(|r| r.0),
                request.target_revision_phid.as_ref().map(Phid::as_str),
                request.target_diff_phid.as_ref().map(Phid::as_str),
                request.last_error,
                request.updated_at,
                id,
                read_status.to_string(),
            ],
        )
        .map_err(|e| storage("cannot update uplift request", e))?;
    if changed == 0 {
        return Err(conflict(&request));
    }
    tx.commit().map_err(|e| storage("cannot commit", e))?;
    Ok(request)
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || Self::connect(&path))
                .await
                .map_err(|e| storage("cannot open store", e))??
        };
        debug!(path = %path.display(), "opened uplift store");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let action = format!("cannot open store {}", path.display());
        let conn = Connection::open(path).map_err(|e| storage(&action, e))?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(|e| storage(&action, e))?;
        // Readers do not block the writer holding the lock
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| storage(&action, e))?;
        conn.execute_batch(SCHEMA).map_err(|e| storage(&action, e))?;
        Ok(conn)
    }

    async fn with_conn<T, F>(&self, action: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Persistence(format!("{action}: store connection poisoned")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| storage(action, e))?
    }
}

#[async_trait]
impl UpliftStore for SqliteStore {
    async fn insert(&self, request: NewUpliftRequest) -> Result<UpliftRequest> {
        let form = serde_json::to_string(&request.form)?;
        let now = Utc::now();
        self.with_conn("insert", move |conn| {
            let inserted = conn.execute(
                "INSERT INTO uplift_requests
                 (revision_id, repository, form_json, requester_email, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    request.revision_id.0,
                    request.repository,
                    form,
                    request.requester_email,
                    UpliftStatus::Created.to_string(),
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(Error::Conflict {
                        revision_id: request.revision_id,
                        repository: request.repository,
                    });
                }
                Err(e) => return Err(storage("cannot insert uplift request", e)),
            }
            fetch(
                conn,
                "revision_id = ?1 AND repository = ?2",
                params![request.revision_id.0, request.repository],
            )?
            .ok_or_else(|| Error::Persistence("inserted uplift request vanished".to_string()))
        })
        .await
    }

    async fn get(&self, id: u64) -> Result<Option<UpliftRequest>> {
        self.with_conn("get", move |conn| fetch(conn, "id = ?1", params![id]))
            .await
    }

    async fn find(&self, revision_id: RevisionId, repository: &str) -> Result<Option<UpliftRequest>> {
        let repository = repository.to_string();
        self.with_conn("find", move |conn| {
            fetch(
                conn,
                "revision_id = ?1 AND repository = ?2",
                params![revision_id.0, repository],
            )
        })
        .await
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<UpliftRequest>> {
        let filter = filter.clone();
        self.with_conn("list", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM uplift_requests
                     WHERE (?1 IS NULL OR revision_id = ?1)
                       AND (?2 IS NULL OR repository = ?2)
                       AND (?3 IS NULL OR status = ?3)
                     ORDER BY id"
                ))
                .map_err(|e| storage("cannot list uplift requests", e))?;
            let rows = stmt
                .query_map(
                    params![
                        filter.revision_id.map(|r| r.0),
                        filter.repository,
                        filter.status.map(|s| s.to_string()),
                    ],
                    read_row,
                )
                .map_err(|e| storage("cannot list uplift requests", e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| storage("cannot list uplift requests", e))
        })
        .await
    }

    async fn transition(&self, id: u64, expected: UpliftStatus, next: UpliftStatus) -> Result<UpliftRequest> {
        self.with_conn("transition", move |conn| {
            update(conn, id, |request| {
                if request.status != expected {
                    return Err(conflict(request));
                }
                request.transition(next)
            })
        })
        .await
    }

    async fn record_replication(&self, id: u64, target: &ReplicationTarget) -> Result<UpliftRequest> {
        let target = target.clone();
        self.with_conn("record replication", move |conn| {
            update(conn, id, |request| {
                request.record_replication(&target);
                Ok(())
            })
        })
        .await
    }

    async fn record_failure(&self, id: u64, message: &str) -> Result<UpliftRequest> {
        let message = message.to_string();
        self.with_conn("record failure", move |conn| {
            update(conn, id, |request| request.record_failure(&message))
        })
        .await
    }
}
