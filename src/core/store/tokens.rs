use anyhow::Result;
use rusqlite::params;
use sha2::{Digest, Sha256};

use super::Store;
use super::types::ApiTokenRecord;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("wek_{}", hex::encode(bytes))
}

impl Store {
    pub async fn create_api_token(
        &self,
        user_id: i64,
        name: &str,
    ) -> Result<(String, ApiTokenRecord)> {
        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let id = uuid::Uuid::new_v4().to_string();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (id, user_id, name, token_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, name, token_hash],
        )?;

        let created_at = db.query_row(
            "SELECT created_at FROM api_tokens WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )?;

        Ok((
            raw_token,
            ApiTokenRecord {
                id,
                name: name.to_string(),
                created_at,
            },
        ))
    }

    pub async fn list_api_tokens(&self, user_id: i64) -> Result<Vec<ApiTokenRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, name, created_at FROM api_tokens
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ApiTokenRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?);
        }
        Ok(tokens)
    }

    pub async fn delete_api_token(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM api_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Resolve a raw bearer token to its owning user.
    pub async fn validate_api_token(&self, raw_token: &str) -> Result<Option<i64>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let user_id = db
            .query_row(
                "SELECT user_id FROM api_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| row.get(0),
            )
            .ok();
        Ok(user_id)
    }

    pub async fn has_any_api_tokens(&self) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM api_tokens", [], |row| row.get(0))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let user_id = store.default_user_id().await.unwrap();
        assert!(!store.has_any_api_tokens().await.unwrap());

        let (raw, record) = store.create_api_token(user_id, "laptop").await.unwrap();
        assert!(raw.starts_with("wek_"));
        assert!(store.has_any_api_tokens().await.unwrap());
        assert_eq!(
            store.validate_api_token(&raw).await.unwrap(),
            Some(user_id)
        );
        assert_eq!(store.validate_api_token("wek_bogus").await.unwrap(), None);

        assert!(store.delete_api_token(&record.id).await.unwrap());
        assert_eq!(store.validate_api_token(&raw).await.unwrap(), None);
    }
}
