// src/main.rs — pagecap entry point

use clap::Parser;

use pagecap::cli::{Cli, Commands, WatchArgs};
use pagecap::infra::config::Config;
use pagecap::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Capture notices are info-level; everything else stays quiet by default
    let level = match cli.command {
        None | Some(Commands::Watch(_)) => "info",
        _ => "warn",
    };
    logger::init_logging(level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Some(Commands::List { limit }) => pagecap::cli::list::run_list(limit).await,
        Some(Commands::Show { document }) => {
            pagecap::cli::list::run_show(&config, &document).await
        }
        Some(Commands::Parse { text }) => pagecap::cli::parse::run_parse(&text),
        Some(Commands::Check { channel }) => {
            pagecap::cli::check::run_check(&config, channel.as_deref()).await
        }
        Some(Commands::Watch(args)) => watch(&mut config, &args).await,
        None => watch(&mut config, &WatchArgs::default()).await,
    }
}

async fn watch(config: &mut Config, args: &WatchArgs) -> anyhow::Result<()> {
    args.apply(config);
    config.validate()?;
    pagecap::cli::watch::run_watch(config, args.dry_run).await
}
