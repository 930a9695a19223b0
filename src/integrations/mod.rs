// src/integrations/mod.rs — Chat service adapters

pub mod discord;
pub mod types;

pub use discord::DiscordSource;
pub use types::{Block, Message, MessageSource, PageAdvancer};
