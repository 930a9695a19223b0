// src/cli/mod.rs — CLI definition (clap derive)

pub mod check;
pub mod list;
pub mod parse;
pub mod watch;

use clap::{Args, Parser, Subcommand};

use crate::infra::config::Config;

#[derive(Parser)]
#[command(
    name = "pagecap",
    about = "Capture paginated bot responses from a chat channel",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a channel and capture paginated responses (default)
    Watch(WatchArgs),
    /// List recorded capture sessions, newest first
    List {
        /// Maximum number of sessions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },
    /// Print the pages stored for a document as JSON
    Show {
        /// Document name, as printed by `list`
        document: String,
    },
    /// Parse a footer like "3 / 12" and print the position
    Parse {
        /// Footer text
        text: String,
    },
    /// Validate the bot token and channel access
    Check {
        /// Channel to check instead of the configured one
        #[arg(long)]
        channel: Option<String>,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct WatchArgs {
    /// Channel id to monitor
    #[arg(long)]
    pub channel: Option<String>,

    /// Display name of the responder whose pages are captured
    #[arg(long)]
    pub responder: Option<String>,

    /// Trigger prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Keep captures in memory instead of writing documents and the ledger
    #[arg(long)]
    pub dry_run: bool,
}

impl WatchArgs {
    /// Flags win over the config file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref channel) = self.channel {
            config.watch.channel = Some(channel.clone());
        }
        if let Some(ref responder) = self.responder {
            config.watch.responder = responder.clone();
        }
        if let Some(ref prefix) = self.prefix {
            config.watch.trigger_prefix = prefix.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.watch.poll_interval_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["pagecap"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_watch_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pagecap",
            "watch",
            "--channel",
            "42",
            "--prefix",
            "!",
            "--interval-ms",
            "250",
            "--dry-run",
        ])
        .unwrap();
        let Some(Commands::Watch(args)) = cli.command else {
            panic!("expected watch");
        };
        assert!(args.dry_run);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.watch.channel.as_deref(), Some("42"));
        assert_eq!(config.watch.trigger_prefix, "!");
        assert_eq!(config.watch.poll_interval_ms, 250);
        assert_eq!(config.watch.responder, "Mudae");
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["pagecap", "list", "--config", "/tmp/p.toml", "-n", "5"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/p.toml"));
        assert!(matches!(cli.command, Some(Commands::List { limit: 5 })));
    }

    #[test]
    fn test_show_requires_document() {
        assert!(Cli::try_parse_from(["pagecap", "show"]).is_err());
    }
}
