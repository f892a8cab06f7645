//! libSQL backend — async `VoteStore` implementation.
//!
//! Supports local file and in-memory databases. The options mapping is
//! normalized into a `vote_options` table so a vote is a single atomic
//! `UPDATE ... SET count = count + 1`, guarded by the poll being open.
//! Concurrent votes on the same option therefore never lose updates.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StorageError;
use crate::poll::model::{Vote, VoteOption};
use crate::store::migrations;
use crate::store::traits::VoteStore;

/// libSQL vote store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Open(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl VoteStore for LibSqlStore {
    async fn insert_vote(&self, vote: &Vote) -> Result<(), StorageError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to begin transaction: {e}")))?;

        tx.execute(
            "INSERT INTO votes (id, question, created_by, is_closed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                vote.id.as_str(),
                vote.question.as_str(),
                vote.created_by.as_str(),
                vote.is_closed as i64,
                vote.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("Failed to insert vote: {e}")))?;

        for (position, option) in vote.options.iter().enumerate() {
            tx.execute(
                "INSERT INTO vote_options (vote_id, label, position, count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    vote.id.as_str(),
                    option.label.as_str(),
                    position as i64,
                    option.count as i64,
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to insert vote option: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to commit vote insert: {e}")))?;

        Ok(())
    }

    async fn get_vote(&self, id: &str) -> Result<Option<Vote>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, question, created_by, is_closed, created_at
                 FROM votes WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to select vote: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to read vote row: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let vote_id: String = row
            .get(0)
            .map_err(|e| StorageError::Query(format!("Failed to read vote id: {e}")))?;
        let question: String = row
            .get(1)
            .map_err(|e| StorageError::Query(format!("Failed to read question: {e}")))?;
        let created_by: String = row
            .get(2)
            .map_err(|e| StorageError::Query(format!("Failed to read created_by: {e}")))?;
        let is_closed: i64 = row
            .get(3)
            .map_err(|e| StorageError::Query(format!("Failed to read is_closed: {e}")))?;
        let created_str: String = row
            .get(4)
            .map_err(|e| StorageError::Query(format!("Failed to read created_at: {e}")))?;

        let mut options = Vec::new();
        let mut option_rows = self
            .conn
            .query(
                "SELECT label, count FROM vote_options
                 WHERE vote_id = ?1 ORDER BY position",
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to select vote options: {e}")))?;

        while let Some(row) = option_rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to read option row: {e}")))?
        {
            let label: String = row
                .get(0)
                .map_err(|e| StorageError::Query(format!("Failed to read option label: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| StorageError::Query(format!("Failed to read option count: {e}")))?;
            options.push(VoteOption {
                label,
                count: count.max(0) as u64,
            });
        }

        Ok(Some(Vote {
            id: vote_id,
            question,
            options,
            created_by,
            is_closed: is_closed != 0,
            created_at: parse_datetime(&created_str),
        }))
    }

    async fn vote_exists(&self, id: &str) -> Result<bool, StorageError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM votes WHERE id = ?1", params![id])
            .await
            .map_err(|e| StorageError::Query(format!("Failed to check vote existence: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to read existence check: {e}")))?;

        match row {
            Some(row) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            None => Ok(false),
        }
    }

    async fn increment_option(&self, id: &str, label: &str) -> Result<u64, StorageError> {
        // The EXISTS guard makes "still open" part of the same atomic
        // statement as the increment, so a close racing with a vote can
        // never produce a post-close increment.
        self.conn
            .execute(
                "UPDATE vote_options SET count = count + 1
                 WHERE vote_id = ?1 AND label = ?2
                   AND EXISTS (SELECT 1 FROM votes WHERE id = ?1 AND is_closed = 0)",
                params![id, label],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to increment option: {e}")))
    }

    async fn set_closed(&self, id: &str) -> Result<(), StorageError> {
        self.conn
            .execute("UPDATE votes SET is_closed = 1 WHERE id = ?1", params![id])
            .await
            .map_err(|e| StorageError::Query(format!("Failed to close vote: {e}")))?;
        Ok(())
    }

    async fn delete_vote(&self, id: &str) -> Result<(), StorageError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to begin transaction: {e}")))?;

        tx.execute(
            "DELETE FROM vote_options WHERE vote_id = ?1",
            params![id],
        )
        .await
        .map_err(|e| StorageError::Query(format!("Failed to delete vote options: {e}")))?;

        tx.execute("DELETE FROM votes WHERE id = ?1", params![id])
            .await
            .map_err(|e| StorageError::Query(format!("Failed to delete vote: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(format!("Failed to commit vote delete: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vote() -> Vote {
        Vote::new(
            "What pizza?",
            &["Pepperoni".to_string(), "Mushroom".to_string()],
            "alice",
        )
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vote = sample_vote();
        store.insert_vote(&vote).await.unwrap();

        let loaded = store.get_vote(&vote.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, vote.id);
        assert_eq!(loaded.question, "What pizza?");
        assert_eq!(loaded.created_by, "alice");
        assert!(!loaded.is_closed);
        // Creation order preserved.
        assert_eq!(loaded.options[0].label, "Pepperoni");
        assert_eq!(loaded.options[1].label, "Mushroom");
        assert!(loaded.options.iter().all(|o| o.count == 0));
    }

    #[tokio::test]
    async fn get_missing_vote_is_none() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.get_vote("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exists_reflects_insert_and_delete() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vote = sample_vote();
        assert!(!store.vote_exists(&vote.id).await.unwrap());

        store.insert_vote(&vote).await.unwrap();
        assert!(store.vote_exists(&vote.id).await.unwrap());

        store.delete_vote(&vote.id).await.unwrap();
        assert!(!store.vote_exists(&vote.id).await.unwrap());
        assert!(store.get_vote(&vote.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_bumps_exactly_one_option() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vote = sample_vote();
        store.insert_vote(&vote).await.unwrap();

        let rows = store.increment_option(&vote.id, "Mushroom").await.unwrap();
        assert_eq!(rows, 1);

        let loaded = store.get_vote(&vote.id).await.unwrap().unwrap();
        assert_eq!(loaded.option("Mushroom").unwrap().count, 1);
        assert_eq!(loaded.option("Pepperoni").unwrap().count, 0);
    }

    #[tokio::test]
    async fn increment_unknown_option_touches_nothing() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vote = sample_vote();
        store.insert_vote(&vote).await.unwrap();

        let rows = store.increment_option(&vote.id, "Hawaiian").await.unwrap();
        assert_eq!(rows, 0);

        let loaded = store.get_vote(&vote.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_votes(), 0);
    }

    #[tokio::test]
    async fn increment_on_closed_poll_is_rejected() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let vote = sample_vote();
        store.insert_vote(&vote).await.unwrap();

        store.increment_option(&vote.id, "Pepperoni").await.unwrap();
        store.set_closed(&vote.id).await.unwrap();

        let rows = store.increment_option(&vote.id, "Pepperoni").await.unwrap();
        assert_eq!(rows, 0);

        let loaded = store.get_vote(&vote.id).await.unwrap().unwrap();
        assert!(loaded.is_closed);
        assert_eq!(loaded.option("Pepperoni").unwrap().count, 1);
    }

    #[tokio::test]
    async fn local_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.db");

        let vote = sample_vote();
        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.insert_vote(&vote).await.unwrap();
            store.increment_option(&vote.id, "Pepperoni").await.unwrap();
        }

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let loaded = store.get_vote(&vote.id).await.unwrap().unwrap();
        assert_eq!(loaded.option("Pepperoni").unwrap().count, 1);
    }
}
