mod messages;
pub mod sessions;
mod tokens;
pub mod types;
mod users;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::platform::{NativePlatform, Platform};

/// Relational store backing the relay: sessions, their message transcripts,
/// users, and API tokens. A single SQLite connection guarded by an async
/// mutex; the relay's read-decode-persist-forward loop is sequential, so
/// contention stays low.
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(data_dir);

        let db_path = data_dir.join("webedt.db");
        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);

        let store = Self::bootstrap(db)?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(db: Connection) -> Result<Self> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                worker_credential TEXT,
                github_token TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(id),
                worker_session_id TEXT,
                user_request TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                repository_url TEXT,
                branch TEXT,
                auto_commit INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id),
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                images TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS api_tokens (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "INSERT OR IGNORE INTO users (username) VALUES ('default')",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}
