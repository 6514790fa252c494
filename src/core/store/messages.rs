use anyhow::{Result, anyhow};
use rusqlite::params;

use super::Store;
use super::types::{Message, MessageKind};

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let kind_raw: String = row.get("kind")?;
    let images_raw: Option<String> = row.get("images")?;
    Ok(Message {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        kind: MessageKind::parse(&kind_raw).unwrap_or(MessageKind::System),
        content: row.get("content")?,
        images: images_raw.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get("created_at")?,
    })
}

impl Store {
    /// Append one message to a session's transcript. Insertion order is the
    /// only ordering guarantee the transcript gives. Terminal sessions take
    /// no further messages.
    pub async fn append_message(
        &self,
        session_id: i64,
        kind: MessageKind,
        content: &str,
        images: Option<&serde_json::Value>,
    ) -> Result<Message> {
        let db = self.db.lock().await;

        let status: String = db
            .query_row(
                "SELECT status FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|_| anyhow!("session {session_id} not found"))?;
        if status == "completed" || status == "error" {
            return Err(anyhow!("session {session_id} is already {status}"));
        }

        let images_json = images.map(|v| v.to_string());
        db.execute(
            "INSERT INTO messages (session_id, kind, content, images) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, kind.as_str(), content, images_json],
        )?;
        let id = db.last_insert_rowid();
        db.query_row("SELECT * FROM messages WHERE id = ?1", params![id], |row| {
            row_to_message(row)
        })
        .map_err(|e| anyhow!("failed to read created message: {e}"))
    }

    pub async fn list_messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT * FROM messages WHERE session_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![session_id], row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}
