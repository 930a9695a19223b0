// src/cli/check.rs — Validate credentials and channel access

use crate::infra::config::Config;
use crate::infra::paths;
use crate::integrations::discord::DiscordSource;
use crate::integrations::types::MessageSource;

pub async fn run_check(config: &Config, channel: Option<&str>) -> anyhow::Result<()> {
    println!("pagecap v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config:    {} (loaded)", config_path.display());
    } else {
        println!("  Config:    (using defaults)");
    }
    println!("  Captures:  {}", config.store.captures_dir().display());
    println!("  Responder: {}", config.watch.responder);
    println!("  Prefix:    {}", config.watch.trigger_prefix);

    let channel = match channel {
        Some(c) => c,
        None => config.channel()?,
    };
    let token = config.discord.token()?;
    let source = DiscordSource::new(token, config.advance.reaction.clone())?;

    eprint!("  Checking Discord... ");
    match source.validate(channel).await {
        Ok(summary) => {
            eprintln!("ok");
            println!("    {summary}");
            match source.fetch_latest(channel).await {
                Ok(Some(latest)) => println!(
                    "    Latest message: {} by {} at {}",
                    latest.id,
                    latest.author,
                    latest.timestamp.format("%Y-%m-%d %H:%M:%S")
                ),
                Ok(None) => println!("    Channel has no messages yet"),
                Err(e) => println!("    Could not read messages: {e}"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("FAILED");
            Err(e.into())
        }
    }
}
