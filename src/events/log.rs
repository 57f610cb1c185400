use crate::error::{BackupError, Result};
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const BATCH_SIZE: usize = 50;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Kind of event recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A run started
    Start,
    /// Source scan and manifest build finished
    Scan,
    /// A file was written to a destination
    Copy,
    /// A file's content hash was re-checked after the copy phase
    Verify,
    /// A file at a destination already matched the source and was left alone
    Skip,
    /// A pre-existing destination file was moved aside rather than overwritten
    Quarantine,
    /// A copy, verify, or pre-flight failure
    Error,
    /// The run was cancelled
    Cancel,
    /// A destination, or the whole session, reached a terminal success state
    Complete,
}

impl EventKind {
    /// Critical events force an immediate flush rather than waiting for
    /// the next batch boundary
    fn is_critical(&self) -> bool {
        matches!(self, Self::Start | Self::Complete | Self::Cancel | Self::Error)
    }
}

/// Severity of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Fine-grained detail, not normally surfaced to an operator
    Debug,
    /// Routine progress
    Info,
    /// Worth an operator's attention but not a failure
    Warn,
    /// A failure
    Error,
}

/// One recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Session this event belongs to
    pub session_id: Uuid,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub kind: EventKind,
    /// How serious this event is
    pub severity: Severity,
    /// Path relative to the source root, for per-file events
    pub file_path: Option<PathBuf>,
    /// Destination root this event concerns
    pub destination_path: Option<PathBuf>,
    /// File size in bytes, for copy/verify/skip events
    pub size: Option<u64>,
    /// Content hash involved
    pub hash: Option<String>,
    /// Error text, for `Error` events
    pub error_msg: Option<String>,
    /// How long the operation took
    pub duration_ms: Option<u64>,
    /// Free-form JSON for anything not covered by a typed field
    pub metadata: Option<String>,
}

impl Event {
    /// Build an event stamped with the current time; every typed field
    /// starts `None` and is filled in with the `with_*` builders.
    pub fn new(session_id: Uuid, kind: EventKind, severity: Severity) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
            severity,
            file_path: None,
            destination_path: None,
            size: None,
            hash: None,
            error_msg: None,
            duration_ms: None,
            metadata: None,
        }
    }

    /// Attach a source-relative file path
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Attach a destination root
    pub fn with_destination_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination_path = Some(path.into());
        self
    }

    /// Attach a size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach a content hash
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Attach an error message
    pub fn with_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Attach a duration in milliseconds
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Attach free-form metadata (expected to be a JSON-encoded string)
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Status a session ended in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Still running
    InProgress,
    /// Every destination completed with no failures
    Succeeded,
    /// Completed with at least one file failure
    SucceededWithFailures,
    /// Cancelled before completion
    Cancelled,
}

/// A backup run, as recorded in the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: Uuid,
    /// Source directory
    pub source: PathBuf,
    /// Destination directories
    pub destinations: Vec<PathBuf>,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal state, if it has
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: SessionStatus,
}

enum WriteMsg {
    Event(Event),
    Session(Session),
    Flush(Sender<()>),
    Shutdown,
}

/// Durable event log backed by SQLite, written by a single dedicated thread
pub struct EventLog {
    sender: Sender<WriteMsg>,
    pool: Pool<SqliteConnectionManager>,
    writer: Option<thread::JoinHandle<()>>,
}

impl EventLog {
    /// Open (creating if necessary) the event log at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::new(manager).map_err(|e| BackupError::Internal(format!("event log pool: {e}")))?;

        {
            let conn = pool.get().map_err(|e| BackupError::Internal(format!("event log connection: {e}")))?;
            init_schema(&conn)?;
        }

        let writer_conn = Connection::open(db_path).map_err(|e| BackupError::Internal(format!("event log writer connection: {e}")))?;
        init_schema(&writer_conn)?;

        let (sender, receiver) = unbounded();
        let writer = thread::spawn(move || writer_loop(writer_conn, receiver));

        Ok(Self { sender, pool, writer: Some(writer) })
    }

    /// Record the start of a session
    pub fn record_session_start(&self, session: &Session) {
        self.send(WriteMsg::Session(session.clone()));
        self.record(
            Event::new(session.id, EventKind::Start, Severity::Info)
                .with_metadata(format!("{{\"source\":\"{}\"}}", session.source.display())),
        );
    }

    /// Record an event, flushing immediately if it is critical
    pub fn record(&self, event: Event) {
        let critical = event.kind.is_critical();
        self.send(WriteMsg::Event(event));
        if critical {
            self.flush();
        }
    }

    /// Force the writer thread to flush any batched rows now
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.sender.send(WriteMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn send(&self, msg: WriteMsg) {
        let _ = self.sender.send(msg);
    }

    /// All events recorded for `session_id`, oldest first
    pub fn events_for_session(&self, session_id: Uuid) -> Result<Vec<Event>> {
        let conn = self.pool.get().map_err(|e| BackupError::Internal(format!("event log connection: {e}")))?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, kind, severity, file_path, destination_path, size, hash, error_msg, duration_ms, metadata
                 FROM events WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| BackupError::Internal(e.to_string()))?;
        let rows = stmt
            .query_map([session_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })
            .map_err(|e| BackupError::Internal(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (timestamp, kind, severity, file_path, destination_path, size, hash, error_msg, duration_ms, metadata) =
                row.map_err(|e| BackupError::Internal(e.to_string()))?;
            events.push(Event {
                session_id,
                timestamp: timestamp.parse().unwrap_or_else(|_| Utc::now()),
                kind: deserialize_kind(&kind),
                severity: deserialize_severity(&severity),
                file_path: file_path.map(PathBuf::from),
                destination_path: destination_path.map(PathBuf::from),
                size: size.map(|s| s as u64),
                hash,
                error_msg,
                duration_ms: duration_ms.map(|d| d as u64),
                metadata,
            });
        }
        Ok(events)
    }

    /// The most recently started session, if any have been recorded
    pub fn latest_session(&self) -> Result<Option<Uuid>> {
        let conn = self.pool.get().map_err(|e| BackupError::Internal(format!("event log connection: {e}")))?;
        conn.query_row("SELECT id FROM sessions ORDER BY started_at DESC LIMIT 1", [], |row| {
            let id: String = row.get(0)?;
            Ok(id)
        })
        .optional()
        .map_err(|e| BackupError::Internal(e.to_string()))?
        .map(|id| Uuid::parse_str(&id).map_err(|e| BackupError::Internal(e.to_string())))
        .transpose()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let _ = self.sender.send(WriteMsg::Shutdown);
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            destinations TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            file_path TEXT,
            destination_path TEXT,
            size INTEGER,
            hash TEXT,
            error_msg TEXT,
            duration_ms INTEGER,
            metadata TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);",
    )
    .map_err(|e| BackupError::Internal(e.to_string()))?;
    Ok(())
}

fn writer_loop(conn: Connection, receiver: Receiver<WriteMsg>) {
    let mut batch: Vec<Event> = Vec::new();
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(WriteMsg::Event(event)) => {
                batch.push(event);
                if batch.len() >= BATCH_SIZE {
                    flush_batch(&conn, &mut batch);
                }
            }
            Ok(WriteMsg::Session(session)) => {
                write_session(&conn, &session);
            }
            Ok(WriteMsg::Flush(ack)) => {
                flush_batch(&conn, &mut batch);
                let _ = ack.send(());
            }
            Ok(WriteMsg::Shutdown) => {
                flush_batch(&conn, &mut batch);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !batch.is_empty() {
                    flush_batch(&conn, &mut batch);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush_batch(&conn, &mut batch);
                break;
            }
        }
    }
}

fn flush_batch(conn: &Connection, batch: &mut Vec<Event>) {
    if batch.is_empty() {
        return;
    }
    let tx = match conn.unchecked_transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("event log transaction failed: {e}");
            return;
        }
    };
    for event in batch.drain(..) {
        let result = tx.execute(
            "INSERT INTO events (session_id, timestamp, kind, severity, file_path, destination_path, size, hash, error_msg, duration_ms, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                serialize_kind(&event.kind),
                serialize_severity(&event.severity),
                event.file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                event.destination_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                event.size.map(|s| s as i64),
                event.hash,
                event.error_msg,
                event.duration_ms.map(|d| d as i64),
                event.metadata,
            ],
        );
        if let Err(e) = result {
            tracing::error!("event log insert failed: {e}");
        }
    }
    if let Err(e) = tx.commit() {
        tracing::error!("event log commit failed: {e}");
    }
}

fn write_session(conn: &Connection, session: &Session) {
    let result = conn.execute(
        "INSERT OR REPLACE INTO sessions (id, source, destinations, started_at, completed_at, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            session.id.to_string(),
            session.source.to_string_lossy(),
            serde_json::to_string(&session.destinations).unwrap_or_default(),
            session.started_at.to_rfc3339(),
            session.completed_at.map(|t| t.to_rfc3339()),
            serde_json::to_string(&session.status).unwrap_or_default(),
        ],
    );
    if let Err(e) = result {
        tracing::error!("event log session write failed: {e}");
    }
}

fn serialize_kind(kind: &EventKind) -> String {
    serde_json::to_string(kind).unwrap_or_default()
}

fn deserialize_kind(raw: &str) -> EventKind {
    serde_json::from_str(raw).unwrap_or(EventKind::Start)
}

fn serialize_severity(severity: &Severity) -> String {
    serde_json::to_string(severity).unwrap_or_default()
}

fn deserialize_severity(raw: &str) -> Severity {
    serde_json::from_str(raw).unwrap_or(Severity::Info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_and_read_back_events() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(&dir.path().join("events.db")).unwrap();
        let session = Session {
            id: Uuid::new_v4(),
            source: PathBuf::from("/src"),
            destinations: vec![PathBuf::from("/d1")],
            started_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::InProgress,
        };
        log.record_session_start(&session);
        log.record(Event::new(session.id, EventKind::Complete, Severity::Info));

        let events = log.events_for_session(session.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Start);
        assert_eq!(events[1].kind, EventKind::Complete);
    }

    #[test]
    fn typed_fields_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(&dir.path().join("events.db")).unwrap();
        let session_id = Uuid::new_v4();

        let event = Event::new(session_id, EventKind::Copy, Severity::Info)
            .with_file_path("a/b.bin")
            .with_destination_path("/dst")
            .with_size(1234)
            .with_hash("deadbeef")
            .with_duration_ms(42);
        log.record(event);
        log.flush();

        let events = log.events_for_session(session_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_path, Some(PathBuf::from("a/b.bin")));
        assert_eq!(events[0].size, Some(1234));
        assert_eq!(events[0].hash.as_deref(), Some("deadbeef"));
        assert_eq!(events[0].duration_ms, Some(42));
    }

    #[test]
    fn error_events_flush_immediately() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(&dir.path().join("events.db")).unwrap();
        let session_id = Uuid::new_v4();

        log.record(Event::new(session_id, EventKind::Error, Severity::Error).with_error_msg("disk full"));
        // No explicit flush() call: critical events bypass batching on their own.
        let events = log.events_for_session(session_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error_msg.as_deref(), Some("disk full"));
    }

    #[test]
    fn latest_session_returns_most_recently_started() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(&dir.path().join("events.db")).unwrap();
        let session = Session {
            id: Uuid::new_v4(),
            source: PathBuf::from("/src"),
            destinations: vec![],
            started_at: Utc::now(),
            completed_at: None,
            status: SessionStatus::InProgress,
        };
        log.record_session_start(&session);
        log.flush();

        assert_eq!(log.latest_session().unwrap(), Some(session.id));
    }
}
