use crate::corpus::Mode;
use crate::session::TestResult;
use chrono::{DateTime, Local};
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use std::error::Error;
use std::path::{Path, PathBuf};

pub type SinkError = Box<dyn Error + Send + Sync>;

/// Destination for completed session records. Fire-and-forget from the
/// core's perspective; recording failures are the sink's problem.
pub trait ResultSink: Send {
    fn record(&mut self, result: &TestResult) -> Result<(), SinkError>;
}

/// A result row as persisted, timestamp included.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub id: i64,
    pub wpm: u32,
    pub raw_wpm: u32,
    pub accuracy: u32,
    pub duration_secs: u32,
    pub mode: Mode,
    pub characters: usize,
    pub errors: usize,
    pub timestamp: DateTime<Local>,
}

/// SQLite-backed store of finished typing tests
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (creating if needed) the history database in the user's state
    /// directory.
    pub fn new() -> rusqlite::Result<Self> {
        let db_path = Self::db_path().unwrap_or_else(|| PathBuf::from("typemaster_history.db"));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        Self::open(&db_path)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        Self::open(path.as_ref())
    }

    fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS typing_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wpm INTEGER NOT NULL,
                raw_wpm INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                mode TEXT NOT NULL,
                characters INTEGER NOT NULL,
                errors INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_typing_tests_mode ON typing_tests(mode)",
            [],
        )?;

        Ok(HistoryDb { conn })
    }

    /// Database file path under $HOME/.local/state/typemaster
    fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("typemaster");
            Some(state_dir.join("history.db"))
        } else {
            ProjectDirs::from("", "", "typemaster")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("history.db"))
        }
    }

    pub fn record_result(&self, result: &TestResult) -> rusqlite::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO typing_tests
            (wpm, raw_wpm, accuracy, duration, mode, characters, errors, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                result.wpm,
                result.raw_wpm,
                result.accuracy,
                result.duration_secs,
                result.mode.file_name(),
                result.characters as i64,
                result.errors as i64,
                Local::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Most recent results first.
    pub fn recent(&self, limit: usize) -> rusqlite::Result<Vec<StoredResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, wpm, raw_wpm, accuracy, duration, mode, characters, errors, timestamp
            FROM typing_tests ORDER BY id DESC LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_result)?;
        rows.collect()
    }

    /// Every stored result, oldest first.
    pub fn all(&self) -> rusqlite::Result<Vec<StoredResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, wpm, raw_wpm, accuracy, duration, mode, characters, errors, timestamp
            FROM typing_tests ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map([], Self::row_to_result)?;
        rows.collect()
    }

    pub fn best_wpm(&self, mode: Mode) -> rusqlite::Result<Option<u32>> {
        self.conn.query_row(
            "SELECT MAX(wpm) FROM typing_tests WHERE mode = ?1",
            params![mode.file_name()],
            |row| row.get(0),
        )
    }

    pub fn test_count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM typing_tests", [], |row| row.get(0))
    }

    /// Write the full history as CSV. Returns the number of exported rows.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize, Box<dyn Error>> {
        let results = self.all()?;

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "timestamp",
            "mode",
            "duration_secs",
            "wpm",
            "raw_wpm",
            "accuracy",
            "characters",
            "errors",
        ])?;
        for r in &results {
            writer.write_record([
                r.timestamp.to_rfc3339(),
                r.mode.file_name(),
                r.duration_secs.to_string(),
                r.wpm.to_string(),
                r.raw_wpm.to_string(),
                r.accuracy.to_string(),
                r.characters.to_string(),
                r.errors.to_string(),
            ])?;
        }
        writer.flush()?;

        Ok(results.len())
    }

    fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<StoredResult> {
        let mode: String = row.get(5)?;
        let ts: String = row.get(8)?;
        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map(|t| t.with_timezone(&Local))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(StoredResult {
            id: row.get(0)?,
            wpm: row.get(1)?,
            raw_wpm: row.get(2)?,
            accuracy: row.get(3)?,
            duration_secs: row.get(4)?,
            mode: Mode::parse_or_default(&mode),
            characters: row.get::<_, i64>(6)? as usize,
            errors: row.get::<_, i64>(7)? as usize,
            timestamp,
        })
    }
}

impl ResultSink for HistoryDb {
    fn record(&mut self, result: &TestResult) -> Result<(), SinkError> {
        self.record_result(result).map_err(|e| Box::new(e) as SinkError)
    }
}
