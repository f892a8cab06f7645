//! Environment-based configuration.
//!
//! All required settings are loaded once at startup; a missing value is a
//! fatal startup condition (main exits before connecting to anything).

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which chat boundary to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Mattermost REST channel (default).
    Mattermost,
    /// Local stdin/stdout REPL for testing. Chat-server settings not required.
    Cli,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub chat_mode: ChatMode,
    /// Mattermost server base URL, e.g. `http://localhost:8065`.
    pub server_url: String,
    /// Bot account access token.
    pub token: SecretString,
    pub team_name: String,
    pub channel_name: String,
    /// Bot account name, used as the `@mention` command prefix.
    pub bot_name: String,
    /// libSQL database path (or `:memory:`).
    pub db_path: String,
    /// Channel poll interval in seconds.
    pub poll_interval_secs: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a lookup function. Tests inject their own
    /// lookup instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let chat_mode = match lookup("MATTERVOTE_CHAT_MODE").as_deref() {
            Some("cli") => ChatMode::Cli,
            Some("mattermost") | None => ChatMode::Mattermost,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "MATTERVOTE_CHAT_MODE".to_string(),
                    message: format!("unknown mode {other:?} (expected mattermost or cli)"),
                });
            }
        };

        let db_path = require("MATTERVOTE_DB_PATH")?;

        let poll_interval_secs = match lookup("MATTERVOTE_POLL_INTERVAL_SECS") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MATTERVOTE_POLL_INTERVAL_SECS".to_string(),
                message: format!("{v:?} is not a number of seconds"),
            })?,
            None => 2,
        };

        // The CLI REPL has no chat server to talk to.
        let (server_url, token, team_name, channel_name, bot_name) = match chat_mode {
            ChatMode::Cli => (
                String::new(),
                SecretString::from(String::new()),
                String::new(),
                String::new(),
                lookup("MATTERMOST_BOT_NAME").unwrap_or_else(|| "mattervote".to_string()),
            ),
            ChatMode::Mattermost => (
                require("MATTERMOST_SERVER")?,
                SecretString::from(require("MATTERMOST_TOKEN")?),
                require("MATTERMOST_TEAM")?,
                require("MATTERMOST_CHANNEL")?,
                require("MATTERMOST_BOT_NAME")?,
            ),
        };

        Ok(Self {
            chat_mode,
            server_url,
            token,
            team_name,
            channel_name,
            bot_name,
            db_path,
            poll_interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("MATTERMOST_SERVER", "http://localhost:8065"),
            ("MATTERMOST_TOKEN", "token-123"),
            ("MATTERMOST_TEAM", "myteam"),
            ("MATTERMOST_CHANNEL", "polls"),
            ("MATTERMOST_BOT_NAME", "vote-bot"),
            ("MATTERVOTE_DB_PATH", "./data/votes.db"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn loads_full_config() {
        let config = load(&full_env()).unwrap();
        assert_eq!(config.chat_mode, ChatMode::Mattermost);
        assert_eq!(config.server_url, "http://localhost:8065");
        assert_eq!(config.team_name, "myteam");
        assert_eq!(config.channel_name, "polls");
        assert_eq!(config.bot_name, "vote-bot");
        assert_eq!(config.db_path, "./data/votes.db");
        assert_eq!(config.poll_interval_secs, 2);
    }

    #[test]
    fn missing_required_var_is_an_error() {
        for key in [
            "MATTERMOST_SERVER",
            "MATTERMOST_TOKEN",
            "MATTERMOST_TEAM",
            "MATTERMOST_CHANNEL",
            "MATTERMOST_BOT_NAME",
            "MATTERVOTE_DB_PATH",
        ] {
            let mut env = full_env();
            env.remove(key);
            let err = load(&env).unwrap_err();
            match err {
                ConfigError::MissingEnvVar(missing) => assert_eq!(missing, key),
                other => panic!("expected MissingEnvVar, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = full_env();
        env.insert("MATTERMOST_TOKEN", "");
        assert!(matches!(
            load(&env),
            Err(ConfigError::MissingEnvVar(key)) if key == "MATTERMOST_TOKEN"
        ));
    }

    #[test]
    fn cli_mode_skips_chat_settings() {
        let env = HashMap::from([
            ("MATTERVOTE_CHAT_MODE", "cli"),
            ("MATTERVOTE_DB_PATH", ":memory:"),
        ]);
        let config = load(&env).unwrap();
        assert_eq!(config.chat_mode, ChatMode::Cli);
        assert_eq!(config.bot_name, "mattervote");
    }

    #[test]
    fn bad_poll_interval_is_rejected() {
        let mut env = full_env();
        env.insert("MATTERVOTE_POLL_INTERVAL_SECS", "soon");
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidValue { key, .. }) if key == "MATTERVOTE_POLL_INTERVAL_SECS"
        ));
    }
}
