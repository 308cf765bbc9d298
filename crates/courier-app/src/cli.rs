//! CLI argument definitions for the Courier client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Courier - deliver chat messages to remote agents, offline or not.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the offline queue database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the reply service.
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Treat the network as unavailable; sends go to the offline queue.
    #[arg(long = "offline")]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send a message to an agent.
    Send {
        agent: String,
        message: String,
        /// Voice the reply through the speech sink.
        #[arg(long)]
        speak: bool,
    },
    /// List queued messages.
    Queue,
    /// Deliver pending queued messages now.
    Flush,
    /// Move failed queued messages back to pending and deliver them.
    Retry,
    /// Drop one queued message.
    Remove { id: String },
    /// Forget a conversation and every message queued for its agent.
    Clear { agent: String },
    /// List the agents the service exposes.
    Agents,
    /// Write the effective configuration to the config path.
    InitConfig,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > COURIER_CONFIG env var > ~/.courier/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("COURIER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE").ok();
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME").ok();
    home
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => PathBuf::from(home).join(".courier").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")), home_dir()) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let args = CliArgs::try_parse_from([
            "courier", "--offline", "send", "tutor", "hello there", "--speak",
        ])
        .unwrap();
        assert!(args.offline);
        assert_eq!(
            args.command,
            Command::Send {
                agent: "tutor".into(),
                message: "hello there".into(),
                speak: true,
            }
        );
    }

    #[test]
    fn test_parse_overrides() {
        let args = CliArgs::try_parse_from([
            "courier",
            "-c",
            "/tmp/c.toml",
            "--base-url",
            "http://example.test",
            "-l",
            "debug",
            "queue",
        ])
        .unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/c.toml"));
        assert_eq!(args.base_url.as_deref(), Some("http://example.test"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert_eq!(args.command, Command::Queue);
    }

    #[test]
    fn test_parse_clear() {
        let args = CliArgs::try_parse_from(["courier", "clear", "tutor"]).unwrap();
        assert_eq!(
            args.command,
            Command::Clear {
                agent: "tutor".into()
            }
        );
    }

    #[test]
    fn test_command_required() {
        assert!(CliArgs::try_parse_from(["courier"]).is_err());
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/var/lib/courier"), PathBuf::from("/var/lib/courier"));
        assert_eq!(expand_home("data"), PathBuf::from("data"));
    }
}
