//! Courier application binary - composition root.
//!
//! 1. Load configuration from TOML, apply CLI overrides
//! 2. Open the SQLite-backed offline queue store
//! 3. Wire network client, queue, notifications and coordinator
//! 4. Run one CLI command and print the notifications it raised

mod cli;

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use courier_chat::{
    AgentDirectory, ChatError, ConnectivityMonitor, ConversationState, DeliveryCoordinator,
    HttpTransport, NetworkClient, OfflineQueue, RetryPolicy, SpeechError, SpeechGuard,
    SpeechSink, SpeechTarget, SubmitOutcome,
};
use courier_core::config::CourierConfig;
use courier_core::events::{ClientEvent, EventBus};
use courier_notify::NotificationCenter;
use courier_storage::{Database, SqliteStore};

use cli::{CliArgs, Command};

/// Speech sink for terminals: writes the reply to the log.
struct LogSpeechSink;

#[async_trait]
impl SpeechSink for LogSpeechSink {
    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<(), SpeechError> {
        tracing::info!(voice_id, language, "Speaking: {}", text);
        Ok(())
    }
}

/// Log every client event at debug level.
fn spawn_event_log(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match &event {
                    ClientEvent::QueueProcessed {
                        succeeded, failed, ..
                    } => tracing::debug!(succeeded, failed, "queue_processed"),
                    other => tracing::debug!(event = other.event_name(), "Client event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = CourierConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(url) = &args.base_url {
        config.network.base_url = url.clone();
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Courier v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if args.command == Command::InitConfig {
        config.save(&config_file)?;
        println!("Wrote {}", config_file.display());
        return Ok(());
    }

    // Storage.
    let data_dir = cli::expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("courier.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    let store = Arc::new(SqliteStore::new(db));

    // Components.
    let events = EventBus::new();
    let event_log = spawn_event_log(&events);

    let connectivity = ConnectivityMonitor::new(!args.offline, events.clone());
    let transport = Arc::new(HttpTransport::new(config.network.base_url.clone())?);
    let client = Arc::new(NetworkClient::new(
        transport,
        RetryPolicy::from_config(&config.network),
    ));
    let conversation = Arc::new(ConversationState::new(events.clone()));
    let notifications = NotificationCenter::new(config.notifications.clone(), events.clone());
    let queue = OfflineQueue::open(
        config.queue.clone(),
        store,
        connectivity.clone(),
        conversation.clone(),
        notifications.clone(),
        events.clone(),
    );
    let speech = Arc::new(SpeechGuard::new(
        &config.speech,
        notifications.clone(),
        events.clone(),
    ));
    let coordinator = DeliveryCoordinator::new(
        client.clone(),
        queue.clone(),
        conversation.clone(),
        notifications.clone(),
        connectivity,
        speech,
    );
    let agents = AgentDirectory::new(client, config.agents.cache_ttl());

    match args.command {
        Command::Send {
            agent,
            message,
            speak,
        } => {
            if message.trim().is_empty() {
                return Err(ChatError::EmptyMessage.into());
            }
            let target = if speak {
                let mut target = SpeechTarget::with_defaults(Arc::new(LogSpeechSink), &config.speech);
                match agents.find(&agent).await {
                    Ok(Some(found)) => {
                        if let Some(voice) = found.voice_id {
                            target.voice_id = voice;
                        }
                        if let Some(language) = found.language {
                            target.language = language;
                        }
                    }
                    Ok(None) => tracing::warn!(agent_id = %agent, "Unknown agent, using default voice"),
                    Err(e) => tracing::warn!(error = %e, "Agent lookup failed, using default voice"),
                }
                Some(target)
            } else {
                None
            };

            let submission = coordinator.submit(agent.as_str(), message, target);
            println!("> [{}] {}", agent, submission.message_id);
            match submission.await {
                SubmitOutcome::Delivered { reply_id } => {
                    if let Some(reply) = conversation.get(&agent, &reply_id) {
                        println!("< [{}] {}", agent, reply.content);
                    }
                }
                SubmitOutcome::Queued { queue_id } => {
                    println!("Offline: message held in queue as {}", queue_id);
                }
                SubmitOutcome::Failed { error, .. } => {
                    println!("Delivery failed ({})", error.code());
                }
            }
        }
        Command::Queue => {
            let items = queue.items();
            if items.is_empty() {
                println!("Offline queue is empty.");
            }
            for item in items {
                println!(
                    "{}  {:<8} {:<12} retries={}  {}",
                    item.id,
                    item.status.to_string(),
                    item.agent_id,
                    item.retry_count,
                    item.message
                );
            }
        }
        Command::Flush => {
            let summary = queue.run_pass().await;
            println!(
                "Delivered {}, failed {}, still queued {}",
                summary.succeeded,
                summary.failed,
                queue.len()
            );
        }
        Command::Retry => {
            let delivered = queue.retry_failed().await;
            println!("Delivered {}, still queued {}", delivered, queue.len());
        }
        Command::Remove { id } => {
            let removed = queue.remove(&id)?;
            println!("Removed {} ({})", removed.id, removed.message);
        }
        Command::Clear { agent } => {
            let before = queue.len();
            coordinator.clear_conversation(&agent);
            println!(
                "Dropped {} queued message(s) for {}",
                before.saturating_sub(queue.len()),
                agent
            );
        }
        Command::Agents => match agents.agents().await {
            Ok(list) => {
                for agent in list {
                    println!(
                        "{:<12} {}{}",
                        agent.id,
                        agent.name,
                        agent
                            .description
                            .map(|d| format!(" - {}", d))
                            .unwrap_or_default()
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to list agents");
                return Err(e.into());
            }
        },
        Command::InitConfig => {}
    }

    for notification in notifications.active() {
        eprintln!("[{}] {}", notification.kind, notification.message);
    }

    event_log.abort();
    Ok(())
}
