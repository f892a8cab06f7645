//! Command dispatcher — routes parsed commands to the engine and renders
//! user-facing replies.
//!
//! This is the single place where engine errors are downgraded into chat
//! text. Internal detail goes to the log; the channel only ever sees plain
//! language. Nothing below this layer writes to chat.

use tracing::{error, info, warn};

use crate::error::PollError;
use crate::poll::command::Command;
use crate::poll::engine::PollEngine;
use crate::poll::model::Vote;

/// Strip the canonical `@botname` mention prefix from a raw channel message.
///
/// Returns the command body, or `None` when the message is not addressed to
/// the bot and should be ignored.
pub fn strip_mention(text: &str, bot_name: &str) -> Option<String> {
    let text = text.trim();
    let rest = text.strip_prefix('@')?.strip_prefix(bot_name)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim().to_string())
    } else {
        // "@botnameish ..." mentions someone else.
        None
    }
}

/// Command dispatcher.
pub struct Dispatcher {
    engine: PollEngine,
    bot_name: String,
}

impl Dispatcher {
    pub fn new(engine: PollEngine, bot_name: impl Into<String>) -> Self {
        Self {
            engine,
            bot_name: bot_name.into(),
        }
    }

    /// Handle one command body from `user_id` and produce the reply text.
    ///
    /// Never returns an error: every failure is rendered as a reply and
    /// logged with full detail here.
    pub async fn handle(&self, text: &str, user_id: &str) -> String {
        info!(user = user_id, command = text, "Handling command");

        let result = match Command::parse(text) {
            Command::Help => return self.help_text(),
            Command::Create { question, options } => {
                self.handle_create(&question, &options, user_id).await
            }
            Command::Vote { vote_id, option } => self.handle_vote(&vote_id, &option, user_id).await,
            Command::Results { vote_id } => self.handle_results(&vote_id).await,
            Command::Close { vote_id } => self.handle_close(&vote_id, user_id).await,
            Command::Delete { vote_id } => self.handle_delete(&vote_id, user_id).await,
        };

        match result {
            Ok(reply) => reply,
            Err(err) => {
                match &err {
                    PollError::Storage(detail) => {
                        error!(user = user_id, command = text, %detail, "Storage failure");
                    }
                    other => {
                        warn!(user = user_id, command = text, %other, "Command rejected");
                    }
                }
                self.render_error(&err)
            }
        }
    }

    async fn handle_create(
        &self,
        question: &str,
        options: &[String],
        user_id: &str,
    ) -> Result<String, PollError> {
        let vote_id = self.engine.create_poll(question, options, user_id).await?;

        let mut reply = format!(
            "**New poll created**\nID: `{vote_id}`\nQuestion: {question}\nOptions:\n"
        );
        for (i, option) in options.iter().enumerate() {
            reply.push_str(&format!("{}. {option}\n", i + 1));
        }
        reply.push_str(&format!(
            "\nTo vote: `@{} vote {vote_id} <option or number>`",
            self.bot_name
        ));
        Ok(reply)
    }

    async fn handle_vote(
        &self,
        vote_id: &str,
        option: &str,
        user_id: &str,
    ) -> Result<String, PollError> {
        let label = self.engine.cast_vote(vote_id, option, user_id).await?;
        Ok(format!(
            "Your vote for \"{label}\" has been counted!\nSee the results: `@{} results {vote_id}`",
            self.bot_name
        ))
    }

    async fn handle_results(&self, vote_id: &str) -> Result<String, PollError> {
        let vote = self.engine.results(vote_id).await?;
        Ok(self.render_results(&vote))
    }

    async fn handle_close(&self, vote_id: &str, user_id: &str) -> Result<String, PollError> {
        self.engine.close_poll(vote_id, user_id).await?;
        Ok(format!("Poll `{vote_id}` is now closed."))
    }

    async fn handle_delete(&self, vote_id: &str, user_id: &str) -> Result<String, PollError> {
        self.engine.delete_poll(vote_id, user_id).await?;
        Ok(format!("Poll `{vote_id}` has been deleted."))
    }

    fn render_results(&self, vote: &Vote) -> String {
        let mut reply = format!("**Poll results**\nQuestion: {}\n", vote.question);
        for option in &vote.options {
            reply.push_str(&format!("- {}: {} votes\n", option.label, option.count));
        }
        reply.push_str(&format!("\nTotal votes: {}", vote.total_votes()));

        if vote.is_closed {
            reply.push_str("\n\nThis poll is closed.");
        } else {
            reply.push_str(&format!(
                "\n\nTo vote: `@{} vote {} <option or number>`",
                self.bot_name, vote.id
            ));
        }
        reply
    }

    /// Translate an engine error into plain language. Raw internals never
    /// reach the channel.
    fn render_error(&self, err: &PollError) -> String {
        match err {
            PollError::NotFound { .. } => {
                "No poll found with that ID. Check the ID and try again.".to_string()
            }
            PollError::Closed { .. } => {
                "This poll is closed; no more votes are accepted.".to_string()
            }
            PollError::AlreadyClosed { .. } => "This poll is already closed.".to_string(),
            PollError::Forbidden { .. } => {
                "Only the poll creator can do that.".to_string()
            }
            PollError::InvalidOption { option, .. } => format!(
                "Option \"{option}\" does not exist in this poll.\nSee the options: `@{} results <poll ID>`",
                self.bot_name
            ),
            PollError::EmptyQuestion | PollError::NoOptions => format!(
                "To create a poll, give a question and at least one option:\n`@{} create \"Question\" \"Option 1\" \"Option 2\" ...`",
                self.bot_name
            ),
            PollError::DuplicateOption { option } => {
                format!("Option \"{option}\" appears more than once. Each option may be listed only once.")
            }
            PollError::Storage(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }

    /// The fixed help text enumerating every command form.
    fn help_text(&self) -> String {
        let bot = &self.bot_name;
        format!(
            "**Poll bot commands:**\n\n\
             1. Create a poll:\n   `@{bot} create \"Question\" \"Option 1\" \"Option 2\" ...`\n\n\
             2. Cast a vote:\n   `@{bot} vote <poll ID> <option or number>`\n   \
             or the shorthand `@{bot} <poll ID> <option>`\n\n\
             3. Show results:\n   `@{bot} results <poll ID>`\n\n\
             4. Close a poll (creator only):\n   `@{bot} close <poll ID>`\n\n\
             5. Delete a poll (creator only):\n   `@{bot} delete <poll ID>`"
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::StorageError;
    use crate::store::{LibSqlStore, VoteStore};

    async fn test_dispatcher() -> Dispatcher {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        Dispatcher::new(PollEngine::new(store), "vote-bot")
    }

    /// Pull the poll id out of a create reply ("ID: `...`").
    fn extract_id(reply: &str) -> String {
        let start = reply.find('`').unwrap() + 1;
        let end = reply[start..].find('`').unwrap() + start;
        reply[start..end].to_string()
    }

    #[tokio::test]
    async fn create_reply_lists_id_question_options_and_hint() {
        let dispatcher = test_dispatcher().await;
        let reply = dispatcher
            .handle(r#"create "What pizza?" "Pepperoni" "Mushroom""#, "alice")
            .await;

        assert!(reply.contains("**New poll created**"));
        assert!(reply.contains("Question: What pizza?"));
        assert!(reply.contains("1. Pepperoni"));
        assert!(reply.contains("2. Mushroom"));
        assert!(reply.contains("To vote: `@vote-bot vote "));
    }

    #[tokio::test]
    async fn full_lifecycle_through_the_dispatcher() {
        let dispatcher = test_dispatcher().await;
        let id = extract_id(
            &dispatcher
                .handle(r#"create "Q?" "A" "B""#, "alice")
                .await,
        );

        let reply = dispatcher.handle(&format!("vote {id} A"), "bob").await;
        assert!(reply.contains("Your vote for \"A\" has been counted!"));

        // Shorthand vote, by index.
        let reply = dispatcher.handle(&format!("{id} 2"), "carol").await;
        assert!(reply.contains("Your vote for \"B\" has been counted!"));

        let reply = dispatcher.handle(&format!("results {id}"), "bob").await;
        assert!(reply.contains("- A: 1 votes"));
        assert!(reply.contains("- B: 1 votes"));
        assert!(reply.contains("Total votes: 2"));
        assert!(reply.contains("To vote:"));

        let reply = dispatcher.handle(&format!("close {id}"), "alice").await;
        assert!(reply.contains("is now closed"));

        let reply = dispatcher.handle(&format!("results {id}"), "bob").await;
        assert!(reply.contains("This poll is closed."));
        assert!(!reply.contains("To vote:"));

        let reply = dispatcher.handle(&format!("delete {id}"), "alice").await;
        assert!(reply.contains("has been deleted"));

        let reply = dispatcher.handle(&format!("results {id}"), "bob").await;
        assert!(reply.contains("No poll found"));
    }

    #[tokio::test]
    async fn failures_become_plain_language() {
        let dispatcher = test_dispatcher().await;
        let id = extract_id(
            &dispatcher
                .handle(r#"create "Q?" "A" "B""#, "alice")
                .await,
        );

        let reply = dispatcher.handle(&format!("vote {id} Z"), "bob").await;
        assert!(reply.contains("Option \"Z\" does not exist"));

        let reply = dispatcher.handle(&format!("close {id}"), "mallory").await;
        assert!(reply.contains("Only the poll creator"));

        dispatcher.handle(&format!("close {id}"), "alice").await;
        let reply = dispatcher.handle(&format!("close {id}"), "alice").await;
        assert!(reply.contains("already closed"));

        let reply = dispatcher.handle(&format!("vote {id} A"), "bob").await;
        assert!(reply.contains("no more votes"));
    }

    #[tokio::test]
    async fn unrecognized_input_gets_help() {
        let dispatcher = test_dispatcher().await;
        for input in ["help", "nonsense", "create what pizza??!"] {
            let reply = dispatcher.handle(input, "alice").await;
            // "create" without quotes is a validation prompt, not help.
            if input.starts_with("create") {
                assert!(reply.contains("give a question and at least one option"));
            } else {
                assert!(reply.contains("**Poll bot commands:**"), "input: {input}");
            }
        }
    }

    /// Store whose every call fails, for exercising the downgrade path.
    struct BrokenStore;

    #[async_trait]
    impl VoteStore for BrokenStore {
        async fn insert_vote(&self, _: &crate::poll::model::Vote) -> Result<(), StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
        async fn get_vote(
            &self,
            _: &str,
        ) -> Result<Option<crate::poll::model::Vote>, StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
        async fn vote_exists(&self, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
        async fn increment_option(&self, _: &str, _: &str) -> Result<u64, StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
        async fn set_closed(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
        async fn delete_vote(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Query("connection reset by peer".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failures_never_leak_internals() {
        let dispatcher = Dispatcher::new(PollEngine::new(Arc::new(BrokenStore)), "vote-bot");

        let reply = dispatcher.handle(r#"create "Q?" "A""#, "alice").await;
        assert!(reply.contains("try again later"));
        assert!(!reply.contains("connection reset"));

        let reply = dispatcher.handle("vote some-id A", "bob").await;
        assert!(reply.contains("try again later"));
        assert!(!reply.contains("connection reset"));
    }

    #[test]
    fn mention_stripping() {
        assert_eq!(
            strip_mention("@vote-bot results abc", "vote-bot"),
            Some("results abc".to_string())
        );
        assert_eq!(
            strip_mention("  @vote-bot   help  ", "vote-bot"),
            Some("help".to_string())
        );
        assert_eq!(strip_mention("@vote-bot", "vote-bot"), Some(String::new()));
        assert_eq!(strip_mention("@vote-botty hi", "vote-bot"), None);
        assert_eq!(strip_mention("hello everyone", "vote-bot"), None);
        assert_eq!(strip_mention("@other-bot help", "vote-bot"), None);
    }
}
