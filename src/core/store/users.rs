use anyhow::{Result, anyhow};
use rusqlite::params;

use super::Store;
use super::types::UserRecord;

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRecord> {
    let credential: Option<String> = row.get("worker_credential")?;
    let github: Option<String> = row.get("github_token")?;
    Ok(UserRecord {
        id: row.get("id")?,
        username: row.get("username")?,
        has_worker_credential: credential.is_some(),
        has_github_token: github.is_some(),
        created_at: row.get("created_at")?,
    })
}

impl Store {
    pub async fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT * FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], row_to_user)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// The `default` user backs open-access loopback mode.
    pub async fn default_user_id(&self) -> Result<i64> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT id FROM users WHERE username = 'default'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| anyhow!("default user missing: {e}"))
    }

    pub async fn set_worker_credential(&self, user_id: i64, credential: &str) -> Result<()> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE users SET worker_credential = ?1 WHERE id = ?2",
            params![credential, user_id],
        )?;
        if rows == 0 {
            return Err(anyhow!("user {user_id} not found"));
        }
        Ok(())
    }

    pub async fn worker_credential(&self, user_id: i64) -> Result<Option<String>> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT worker_credential FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| anyhow!("user {user_id} not found: {e}"))
    }

    pub async fn set_github_token(&self, user_id: i64, token: &str) -> Result<()> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE users SET github_token = ?1 WHERE id = ?2",
            params![token, user_id],
        )?;
        if rows == 0 {
            return Err(anyhow!("user {user_id} not found"));
        }
        Ok(())
    }

    pub async fn github_token(&self, user_id: i64) -> Result<Option<String>> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT github_token FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| anyhow!("user {user_id} not found: {e}"))
    }
}
