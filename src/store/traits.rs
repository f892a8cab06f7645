//! Backend-agnostic `VoteStore` trait.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::poll::model::Vote;

/// Durable owner of poll records.
///
/// The lifecycle engine is the sole caller; it relies on
/// `increment_option` being atomic at the storage layer so that concurrent
/// votes on the same option never lose updates.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Insert a new poll with all of its options.
    async fn insert_vote(&self, vote: &Vote) -> Result<(), StorageError>;

    /// Point lookup by poll id, options in creation order.
    async fn get_vote(&self, id: &str) -> Result<Option<Vote>, StorageError>;

    /// Check whether a poll exists.
    async fn vote_exists(&self, id: &str) -> Result<bool, StorageError>;

    /// Atomically increment one option's count by one, guarded by the poll
    /// still being open. Returns the number of rows updated: 1 on success,
    /// 0 when the poll is closed, missing, or has no such option.
    async fn increment_option(&self, id: &str, label: &str) -> Result<u64, StorageError>;

    /// Flip the poll's closed flag to true.
    async fn set_closed(&self, id: &str) -> Result<(), StorageError>;

    /// Permanently remove a poll and its options.
    async fn delete_vote(&self, id: &str) -> Result<(), StorageError>;
}
