use anyhow::{Result, anyhow};
use rusqlite::params;

use super::Store;
use super::types::{Session, SessionStatus};

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let status_raw: String = row.get("status")?;
    let auto_commit: i64 = row.get("auto_commit")?;
    Ok(Session {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        worker_session_id: row.get("worker_session_id")?,
        user_request: row.get("user_request")?,
        status: SessionStatus::parse(&status_raw).unwrap_or(SessionStatus::Error),
        repository_url: row.get("repository_url")?,
        branch: row.get("branch")?,
        auto_commit: auto_commit != 0,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    })
}

pub struct NewSession<'a> {
    pub owner_id: i64,
    pub user_request: &'a str,
    pub repository_url: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub auto_commit: bool,
}

impl Store {
    pub async fn create_session(&self, new: NewSession<'_>) -> Result<Session> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions (owner_id, user_request, repository_url, branch, auto_commit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.owner_id,
                new.user_request,
                new.repository_url,
                new.branch,
                new.auto_commit as i64
            ],
        )?;
        let id = db.last_insert_rowid();
        db.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], |row| {
            row_to_session(row)
        })
        .map_err(|e| anyhow!("failed to read created session: {e}"))
    }

    pub async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], row_to_session)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn list_sessions(&self, owner_id: i64, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT * FROM sessions WHERE owner_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![owner_id, limit as i64], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Delete a session and its transcript. Refused while the session is
    /// still running.
    pub async fn delete_session(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let status: Option<String> = db
            .query_row(
                "SELECT status FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .ok();
        match status.as_deref() {
            None => return Ok(false),
            Some("running") => return Err(anyhow!("cannot delete a running session")),
            Some(_) => {}
        }
        db.execute("DELETE FROM messages WHERE session_id = ?1", params![id])?;
        let rows = db.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// pending → running. Returns false if the session already left pending.
    pub async fn mark_session_running(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sessions SET status = 'running' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(rows > 0)
    }

    /// Terminal transition. The status guard makes completed/error absorbing:
    /// a second call is a no-op and `completed_at` is written exactly once.
    pub async fn finalize_session(&self, id: i64, status: SessionStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(anyhow!("finalize_session called with non-terminal status"));
        }
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sessions SET status = ?1, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?2 AND status IN ('pending', 'running')",
            params![status.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    /// First-writer-wins capture of the worker's own session identifier.
    /// The `IS NULL` guard keeps this correct even if event handling is ever
    /// parallelized.
    pub async fn set_worker_session_id(&self, id: i64, worker_session_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sessions SET worker_session_id = ?1
             WHERE id = ?2 AND worker_session_id IS NULL",
            params![worker_session_id, id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::MessageKind;

    async fn store_with_session() -> (Store, Session) {
        let store = Store::open_in_memory().unwrap();
        let session = store
            .create_session(NewSession {
                owner_id: 1,
                user_request: "add a button",
                repository_url: None,
                branch: None,
                auto_commit: false,
            })
            .await
            .unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn new_session_starts_pending() {
        let (_store, session) = store_with_session().await;
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.worker_session_id.is_none());
        assert!(session.completed_at.is_none());
    }

    #[tokio::test]
    async fn worker_session_id_first_writer_wins() {
        let (store, session) = store_with_session().await;
        assert!(store
            .set_worker_session_id(session.id, "worker-a")
            .await
            .unwrap());
        assert!(!store
            .set_worker_session_id(session.id, "worker-b")
            .await
            .unwrap());
        let session = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(session.worker_session_id.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn terminal_status_is_absorbing() {
        let (store, session) = store_with_session().await;
        assert!(store.mark_session_running(session.id).await.unwrap());
        assert!(store
            .finalize_session(session.id, SessionStatus::Completed)
            .await
            .unwrap());
        // A later error must not overwrite the terminal state.
        assert!(!store
            .finalize_session(session.id, SessionStatus::Error)
            .await
            .unwrap());
        assert!(!store.mark_session_running(session.id).await.unwrap());

        let session = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn no_messages_after_terminal() {
        let (store, session) = store_with_session().await;
        store
            .append_message(session.id, MessageKind::User, "hello", None)
            .await
            .unwrap();
        store
            .finalize_session(session.id, SessionStatus::Error)
            .await
            .unwrap();
        assert!(store
            .append_message(session.id, MessageKind::Assistant, "late", None)
            .await
            .is_err());
        let messages = store.list_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn running_session_cannot_be_deleted() {
        let (store, session) = store_with_session().await;
        store.mark_session_running(session.id).await.unwrap();
        assert!(store.delete_session(session.id).await.is_err());
        store
            .finalize_session(session.id, SessionStatus::Completed)
            .await
            .unwrap();
        assert!(store.delete_session(session.id).await.unwrap());
        assert!(store.get_session(session.id).await.unwrap().is_none());
    }
}
