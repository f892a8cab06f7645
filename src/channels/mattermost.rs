//! Mattermost channel — REST API v4 client that polls the configured
//! channel for new posts and posts replies back into it.
//!
//! Startup resolves the bot account, team, and channel by name; the listener
//! then polls `GET /channels/{id}/posts?since=` and feeds new posts into the
//! message stream, one `IncomingMessage` per post not authored by the bot.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::Config;
use crate::error::ChannelError;

/// Per-request timeout for all Mattermost API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Mattermost channel, connected to one team channel.
pub struct MattermostChannel {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
    bot_user_id: String,
    channel_id: String,
    poll_interval: Duration,
}

impl MattermostChannel {
    /// Connect: validate the token and resolve team and channel ids.
    pub async fn connect(config: &Config) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "mattermost".to_string(),
                reason: e.to_string(),
            })?;

        let base_url = config.server_url.trim_end_matches('/').to_string();
        let token = config.token.clone();

        let me = get_json(&client, &base_url, &token, "users/me").await?;
        let bot_user_id = str_field(&me, "id").ok_or_else(|| ChannelError::AuthFailed {
            name: "mattermost".to_string(),
            reason: "users/me returned no id".to_string(),
        })?;
        let username = str_field(&me, "username").unwrap_or_default();
        if username != config.bot_name {
            warn!(
                configured = %config.bot_name,
                actual = %username,
                "Bot account name differs from configured name; mentions use the configured name"
            );
        }
        info!(username = %username, "Logged in to Mattermost");

        let team = get_json(
            &client,
            &base_url,
            &token,
            &format!("teams/name/{}", config.team_name),
        )
        .await?;
        let team_id = str_field(&team, "id").ok_or_else(|| ChannelError::StartupFailed {
            name: "mattermost".to_string(),
            reason: format!("team {:?} not found", config.team_name),
        })?;

        let channel = get_json(
            &client,
            &base_url,
            &token,
            &format!("teams/{team_id}/channels/name/{}", config.channel_name),
        )
        .await?;
        let channel_id = str_field(&channel, "id").ok_or_else(|| ChannelError::StartupFailed {
            name: "mattermost".to_string(),
            reason: format!("channel {:?} not found", config.channel_name),
        })?;

        info!(team = %config.team_name, channel = %config.channel_name, "Mattermost channel resolved");

        Ok(Self {
            base_url,
            token,
            client,
            bot_user_id,
            channel_id,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    async fn post_message(&self, message: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "channel_id": self.channel_id,
            "message": message,
        });

        let resp = self
            .client
            .post(format!("{}/api/v4/posts", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "mattermost".to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "mattermost".to_string(),
                reason: format!("createPost returned {status}: {detail}"),
            });
        }

        Ok(())
    }
}

/// One post pulled from the channel, in posting order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelPost {
    id: String,
    user_id: String,
    create_at: i64,
    message: String,
}

/// Extract the posts newer than `since` (millis) that were not authored by
/// the bot, oldest first. The API returns posts keyed by id with a separate
/// newest-first `order` array; sorting by `create_at` restores post order.
fn collect_new_posts(data: &Value, since: i64, bot_user_id: &str) -> Vec<ChannelPost> {
    let Some(posts) = data.get("posts").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out: Vec<ChannelPost> = posts
        .values()
        .filter_map(|post| {
            let create_at = post.get("create_at").and_then(Value::as_i64)?;
            if create_at <= since {
                return None;
            }
            let user_id = str_field(post, "user_id")?;
            if user_id == bot_user_id {
                return None;
            }
            Some(ChannelPost {
                id: str_field(post, "id")?,
                user_id,
                create_at,
                message: str_field(post, "message")?,
            })
        })
        .collect();

    out.sort_by_key(|p| p.create_at);
    out
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

async fn get_json(
    client: &reqwest::Client,
    base_url: &str,
    token: &SecretString,
    path: &str,
) -> Result<Value, ChannelError> {
    let resp = client
        .get(format!("{base_url}/api/v4/{path}"))
        .bearer_auth(token.expose_secret())
        .send()
        .await
        .map_err(|e| ChannelError::Http(e.to_string()))?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ChannelError::AuthFailed {
            name: "mattermost".to_string(),
            reason: format!("{path} returned {status}"),
        });
    }
    if !status.is_success() {
        let detail = resp.text().await.unwrap_or_default();
        return Err(ChannelError::Http(format!(
            "{path} returned {status}: {detail}"
        )));
    }

    resp.json()
        .await
        .map_err(|e| ChannelError::InvalidMessage(format!("{path}: {e}")))
}

#[async_trait]
impl Channel for MattermostChannel {
    fn name(&self) -> &str {
        "mattermost"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let token = self.token.clone();
        let channel_id = self.channel_id.clone();
        let bot_user_id = self.bot_user_id.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            // Only posts made after startup are commands.
            let mut since = chrono::Utc::now().timestamp_millis();

            info!("Mattermost channel listening for messages...");

            loop {
                tokio::time::sleep(poll_interval).await;

                let path = format!("channels/{channel_id}/posts?since={since}");
                let data = match get_json(&client, &base_url, &token, &path).await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Mattermost poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for post in collect_new_posts(&data, since, &bot_user_id) {
                    since = since.max(post.create_at);

                    let incoming = IncomingMessage::new("mattermost", &post.user_id, &post.message)
                        .with_metadata(serde_json::json!({ "post_id": post.id }));

                    if tx.send(incoming).is_err() {
                        info!("Mattermost listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.post_message(&response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        get_json(&self.client, &self.base_url, &self.token, "users/me").await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        info!("Mattermost channel shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts_payload() -> Value {
        serde_json::json!({
            "order": ["p3", "p2", "p1"],
            "posts": {
                "p1": {"id": "p1", "user_id": "u1", "create_at": 100, "message": "first"},
                "p2": {"id": "p2", "user_id": "bot", "create_at": 200, "message": "bot reply"},
                "p3": {"id": "p3", "user_id": "u2", "create_at": 300, "message": "second"},
            }
        })
    }

    #[test]
    fn collect_skips_old_and_own_posts() {
        let posts = collect_new_posts(&posts_payload(), 100, "bot");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "p3");
        assert_eq!(posts[0].message, "second");
    }

    #[test]
    fn collect_orders_oldest_first() {
        let posts = collect_new_posts(&posts_payload(), 0, "nobody");
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn collect_tolerates_malformed_payloads() {
        assert!(collect_new_posts(&serde_json::json!({}), 0, "bot").is_empty());
        assert!(collect_new_posts(&serde_json::json!({"posts": []}), 0, "bot").is_empty());
        let missing_fields = serde_json::json!({"posts": {"p1": {"create_at": 100}}});
        assert!(collect_new_posts(&missing_fields, 0, "bot").is_empty());
    }
}
