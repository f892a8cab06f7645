//! The `Vote` entity — one poll with its question, options, and tallies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One labeled choice within a poll, with its running count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub label: String,
    pub count: u64,
}

/// A poll record.
///
/// `options` keeps creation order so replies can render a numbered list and
/// a numeric vote argument can be resolved by position. Labels are unique
/// within a poll; counts only ever increase. Once `is_closed` flips to true
/// it never flips back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub question: String,
    pub options: Vec<VoteOption>,
    pub created_by: String,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    /// Build a fresh open poll with every option at zero.
    pub fn new(question: &str, options: &[String], created_by: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            options: options
                .iter()
                .map(|label| VoteOption {
                    label: label.clone(),
                    count: 0,
                })
                .collect(),
            created_by: created_by.to_string(),
            is_closed: false,
            created_at: Utc::now(),
        }
    }

    /// Look up an option by its exact label.
    pub fn option(&self, label: &str) -> Option<&VoteOption> {
        self.options.iter().find(|o| o.label == label)
    }

    /// Resolve a vote argument to an option label.
    ///
    /// A value that parses as a 1-based index within range refers to the
    /// option at that position (the create reply numbers the options).
    /// Anything else is matched as a literal label.
    pub fn resolve_option(&self, reference: &str) -> Option<&str> {
        if let Ok(index) = reference.parse::<usize>() {
            if index >= 1 && index <= self.options.len() {
                return Some(&self.options[index - 1].label);
            }
        }
        self.option(reference).map(|o| o.label.as_str())
    }

    /// Sum of all option counts.
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.count).sum()
    }
}
