mod local;
mod models;
mod queries;

pub use local::LocalStore;
pub use models::*;

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Owner-scoped CRUD over the five record tables.
///
/// Implementations are plain storage: they never classify, stamp, validate or
/// cascade. Every method takes the owning user id and only sees that user's
/// rows. `begin`/`commit`/`rollback` nest, so a caller can group several
/// writes and undo all of them on failure.
pub trait Backend {
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Run `f` between `begin` and `commit`, rolling back if it fails.
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(undo) = self.rollback() {
                    tracing::error!("rollback failed: {undo}");
                }
                Err(e)
            }
        }
    }

    // ── Profiles ──
    fn get_profile(&self, owner: &str) -> Result<Option<UserProfile>>;
    fn insert_profile(&self, profile: &UserProfile) -> Result<()>;

    // ── Ideas ──
    /// Newest first.
    fn list_ideas(&self, owner: &str) -> Result<Vec<Idea>>;
    fn get_idea(&self, owner: &str, id: &str) -> Result<Option<Idea>>;
    fn insert_idea(&self, owner: &str, idea: &Idea) -> Result<()>;
    /// Replace the stored row. Returns false when no such row exists.
    fn update_idea(&self, owner: &str, idea: &Idea) -> Result<bool>;
    fn delete_idea(&self, owner: &str, id: &str) -> Result<bool>;

    // ── Tasks ──
    /// Newest first, each with its subtasks.
    fn list_tasks(&self, owner: &str) -> Result<Vec<Task>>;
    fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>>;
    fn task_ids_for_idea(&self, owner: &str, idea_id: &str) -> Result<Vec<String>>;
    /// Inserts the task row together with `task.subtasks`.
    fn insert_task(&self, owner: &str, task: &Task) -> Result<()>;
    /// Replace the task row. Subtasks are left untouched.
    fn update_task(&self, owner: &str, task: &Task) -> Result<bool>;
    /// Remove the task row only.
    fn delete_task(&self, owner: &str, id: &str) -> Result<bool>;

    // ── Subtasks ──
    fn get_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<Option<Subtask>>;
    /// Returns false when the parent task does not exist for this owner.
    fn insert_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool>;
    fn update_subtask(&self, owner: &str, task_id: &str, subtask: &Subtask) -> Result<bool>;
    fn delete_subtask(&self, owner: &str, task_id: &str, id: &str) -> Result<bool>;
    fn delete_subtasks_for_task(&self, owner: &str, task_id: &str) -> Result<usize>;

    // ── Tags ──
    /// Ordered by name.
    fn list_tags(&self, owner: &str) -> Result<Vec<Tag>>;
    fn get_tag(&self, owner: &str, id: &str) -> Result<Option<Tag>>;
    fn insert_tag(&self, owner: &str, tag: &Tag) -> Result<()>;
    fn delete_tag(&self, owner: &str, id: &str) -> Result<bool>;
}

/// Relational backend on `SQLite`.
pub struct Store {
    pub conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!("opened database at {}", path.display());
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Store {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT,
                avatar_url TEXT,
                preferences TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ideas (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                impact INTEGER NOT NULL DEFAULT 3 CHECK (impact BETWEEN 1 AND 5),
                effort INTEGER NOT NULL DEFAULT 3 CHECK (effort BETWEEN 1 AND 5),
                quadrant TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ideas_user ON ideas(user_id, created_at);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                idea_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'not_started',
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                estimated_hours REAL,
                actual_hours REAL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_idea ON tasks(user_id, idea_id);

            CREATE TABLE IF NOT EXISTS subtasks (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                title TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_subtasks_task ON subtasks(task_id);

            CREATE TABLE IF NOT EXISTS tags (
                user_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'custom',
                PRIMARY KEY (user_id, id)
            );
            ",
        )?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn timestamp_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn date_to_sql(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
