//! Poll lifecycle engine — validated state transitions over the vote store.
//!
//! The engine is the sole writer of poll state. It enforces creator-only
//! close/delete, option-existence validation, and the monotonic open→closed
//! transition. Vote increments happen atomically in the store, so concurrent
//! votes on the same option never lose updates.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PollError, StorageError};
use crate::poll::model::Vote;
use crate::store::VoteStore;

/// Bound on any single storage call. A slow store surfaces as a transient
/// error instead of hanging the message-handling task.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll lifecycle engine.
pub struct PollEngine {
    store: Arc<dyn VoteStore>,
    store_timeout: Duration,
}

impl PollEngine {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(store: Arc<dyn VoteStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Run a store call under the configured timeout.
    async fn store_call<T, F>(&self, fut: F) -> Result<T, PollError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(PollError::from),
            Err(_) => Err(PollError::Storage(StorageError::Timeout {
                timeout: self.store_timeout,
            })),
        }
    }

    /// Create a new poll and return its id.
    pub async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        creator_id: &str,
    ) -> Result<String, PollError> {
        if question.trim().is_empty() {
            return Err(PollError::EmptyQuestion);
        }
        if options.is_empty() {
            return Err(PollError::NoOptions);
        }
        for (i, label) in options.iter().enumerate() {
            if options[..i].contains(label) {
                return Err(PollError::DuplicateOption {
                    option: label.clone(),
                });
            }
        }

        let vote = Vote::new(question.trim(), options, creator_id);
        self.store_call(self.store.insert_vote(&vote)).await?;

        info!(vote_id = %vote.id, creator = creator_id, "Poll created");
        Ok(vote.id)
    }

    /// Record one vote. Returns the resolved option label.
    ///
    /// The voter id is logged but deliberately not used for duplicate-vote
    /// prevention; re-voting is allowed.
    pub async fn cast_vote(
        &self,
        vote_id: &str,
        option_ref: &str,
        voter_id: &str,
    ) -> Result<String, PollError> {
        let vote = self
            .store_call(self.store.get_vote(vote_id))
            .await?
            .ok_or_else(|| PollError::NotFound {
                id: vote_id.to_string(),
            })?;

        if vote.is_closed {
            return Err(PollError::Closed {
                id: vote_id.to_string(),
            });
        }

        let label = vote
            .resolve_option(option_ref)
            .ok_or_else(|| PollError::InvalidOption {
                id: vote_id.to_string(),
                option: option_ref.to_string(),
            })?
            .to_string();

        let updated = self
            .store_call(self.store.increment_option(vote_id, &label))
            .await?;

        if updated == 0 {
            // The increment is guarded by the poll being open, so zero rows
            // means a close or delete won the race since our read.
            return match self.store_call(self.store.get_vote(vote_id)).await? {
                Some(v) if v.is_closed => Err(PollError::Closed {
                    id: vote_id.to_string(),
                }),
                Some(_) => Err(PollError::InvalidOption {
                    id: vote_id.to_string(),
                    option: option_ref.to_string(),
                }),
                None => Err(PollError::NotFound {
                    id: vote_id.to_string(),
                }),
            };
        }

        debug!(vote_id, option = %label, voter = voter_id, "Vote recorded");
        Ok(label)
    }

    /// Fetch a poll's current state. Read-only.
    pub async fn results(&self, vote_id: &str) -> Result<Vote, PollError> {
        self.store_call(self.store.get_vote(vote_id))
            .await?
            .ok_or_else(|| PollError::NotFound {
                id: vote_id.to_string(),
            })
    }

    /// Close a poll. Creator-only; irreversible.
    pub async fn close_poll(&self, vote_id: &str, requester_id: &str) -> Result<(), PollError> {
        let vote = self
            .store_call(self.store.get_vote(vote_id))
            .await?
            .ok_or_else(|| PollError::NotFound {
                id: vote_id.to_string(),
            })?;

        if vote.created_by != requester_id {
            return Err(PollError::Forbidden {
                id: vote_id.to_string(),
                user_id: requester_id.to_string(),
            });
        }
        if vote.is_closed {
            return Err(PollError::AlreadyClosed {
                id: vote_id.to_string(),
            });
        }

        self.store_call(self.store.set_closed(vote_id)).await?;
        info!(vote_id, requester = requester_id, "Poll closed");
        Ok(())
    }

    /// Permanently delete a poll. Creator-only.
    pub async fn delete_poll(&self, vote_id: &str, requester_id: &str) -> Result<(), PollError> {
        let vote = self
            .store_call(self.store.get_vote(vote_id))
            .await?
            .ok_or_else(|| PollError::NotFound {
                id: vote_id.to_string(),
            })?;

        if vote.created_by != requester_id {
            return Err(PollError::Forbidden {
                id: vote_id.to_string(),
                user_id: requester_id.to_string(),
            });
        }

        self.store_call(self.store.delete_vote(vote_id)).await?;
        info!(vote_id, requester = requester_id, "Poll deleted");
        Ok(())
    }
}
