// src/integrations/types.rs — Message source traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::infra::errors::PagecapError;

/// A structured sub-content block attached to a message (a Discord embed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Footer text; paginated responses carry their `N / M` marker here.
    pub footer: Option<String>,
    pub body: Option<String>,
}

/// A chat message as seen by the capture pipeline.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub channel: String,
    /// Server/guild the channel belongs to, when the source knows it.
    pub guild: Option<String>,
    /// Display name of the author.
    pub author: String,
    pub author_id: String,
    pub author_is_bot: bool,
    pub text: String,
    pub blocks: Vec<Block>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Minimal message with no blocks; mostly useful for building fixtures.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let author = author.into();
        Self {
            id: id.into(),
            channel: String::new(),
            guild: None,
            author_id: author.clone(),
            author,
            author_is_bot: false,
            text: text.into(),
            blocks: Vec::new(),
            timestamp,
        }
    }

    /// Builder: attach a block.
    pub fn with_block(mut self, footer: Option<&str>, body: Option<&str>) -> Self {
        self.blocks.push(Block {
            footer: footer.map(str::to_string),
            body: body.map(str::to_string),
        });
        self
    }

    /// Builder: set channel and guild provenance.
    pub fn in_channel(mut self, channel: impl Into<String>, guild: Option<&str>) -> Self {
        self.channel = channel.into();
        self.guild = guild.map(str::to_string);
        self
    }

    /// Builder: flag the author as a bot account.
    pub fn from_bot(mut self) -> Self {
        self.author_is_bot = true;
        self
    }
}

/// Read side of a chat service.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Identifier used in logs and errors.
    fn id(&self) -> &str;

    /// The single most recent message in `channel`, if any.
    async fn fetch_latest(&self, channel: &str) -> Result<Option<Message>, PagecapError>;

    /// Up to `limit` recent messages, oldest first.
    async fn fetch_recent(&self, channel: &str, limit: u32)
        -> Result<Vec<Message>, PagecapError>;

    /// Re-read one message by id (its blocks may have been edited since).
    async fn fetch_message(&self, channel: &str, id: &str)
        -> Result<Option<Message>, PagecapError>;

    /// The account this process acts as, if the source has one.
    fn self_id(&self) -> Option<&str> {
        None
    }
}

/// Asks an automated responder to show the next page of a paginated message.
#[async_trait]
pub trait PageAdvancer: Send + Sync {
    async fn request_next(&self, message: &Message) -> Result<(), PagecapError>;
}
