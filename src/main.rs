use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use mattervote::channels::{Channel, CliChannel, MattermostChannel, OutgoingResponse};
use mattervote::config::{ChatMode, Config};
use mattervote::poll::dispatcher::strip_mention;
use mattervote::poll::{Dispatcher, PollEngine};
use mattervote::store::LibSqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Missing configuration is fatal before anything is connected.
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📊 mattervote v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bot name: @{}", config.bot_name);
    eprintln!("   Database: {}", config.db_path);

    let store = Arc::new(
        LibSqlStore::new_local(Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {e}", config.db_path);
                std::process::exit(1);
            }),
    );

    let engine = PollEngine::new(store);
    let dispatcher = Arc::new(Dispatcher::new(engine, config.bot_name.clone()));

    let channel: Arc<dyn Channel> = match config.chat_mode {
        ChatMode::Cli => {
            eprintln!("   Channel: cli (type commands, Ctrl-D to exit)\n");
            Arc::new(CliChannel::new())
        }
        ChatMode::Mattermost => {
            eprintln!(
                "   Channel: mattermost ({} / {} / {})\n",
                config.server_url, config.team_name, config.channel_name
            );
            Arc::new(
                MattermostChannel::connect(&config)
                    .await
                    .unwrap_or_else(|e| {
                        eprintln!("Error: Failed to connect to Mattermost: {e}");
                        std::process::exit(1);
                    }),
            )
        }
    };

    let mut stream = channel.start().await?;
    tracing::info!(channel = channel.name(), "Listening for commands");

    // One task per inbound message; a failing command never affects the
    // handling of any other.
    while let Some(msg) = stream.next().await {
        let body = match config.chat_mode {
            ChatMode::Cli => Some(msg.content.clone()),
            ChatMode::Mattermost => strip_mention(&msg.content, &config.bot_name),
        };
        // Not addressed to the bot.
        let Some(body) = body else { continue };

        let dispatcher = Arc::clone(&dispatcher);
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            let reply = dispatcher.handle(&body, &msg.sender).await;
            if let Err(e) = channel.respond(&msg, OutgoingResponse::text(reply)).await {
                tracing::error!(sender = %msg.sender, "Failed to send reply: {e}");
            }
        });
    }

    channel.shutdown().await?;
    Ok(())
}
