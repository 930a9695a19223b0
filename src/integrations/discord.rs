// src/integrations/discord.rs — Discord adapter (Bot API)
//
// Uses the Discord REST API (https://discord.com/developers/docs/reference).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::infra::errors::PagecapError;
use crate::integrations::types::{Block, Message, MessageSource, PageAdvancer};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const SOURCE_ID: &str = "discord";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Discord message source.
pub struct DiscordSource {
    client: Client,
    bot_token: String,
    /// Bot user id, filled by `connect`.
    self_id: Option<String>,
    /// Reaction used to ask the responder for its next page.
    advance_reaction: String,
    /// channel id -> guild id
    guilds: Mutex<HashMap<String, Option<String>>>,
}

impl DiscordSource {
    pub fn new(bot_token: String, advance_reaction: String) -> Result<Self, PagecapError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PagecapError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            bot_token,
            self_id: None,
            advance_reaction,
            guilds: Mutex::new(HashMap::new()),
        })
    }

    /// Validate the token and remember which user we are.
    pub async fn connect(mut self) -> Result<Self, PagecapError> {
        let me = self.current_user().await?;
        tracing::info!("Authenticated with Discord as {}", me.username);
        self.self_id = Some(me.id);
        Ok(self)
    }

    async fn current_user(&self) -> Result<DiscordAuthor, PagecapError> {
        self.api_get("/users/@me", &[]).await
    }

    /// Validate the token and channel access; returns a short description.
    pub async fn validate(&self, channel: &str) -> Result<String, PagecapError> {
        let me = self.current_user().await?;
        let info: DiscordChannel = self.api_get(&format!("/channels/{channel}"), &[]).await?;
        Ok(format!(
            "Authenticated as {}; channel #{} ({})",
            me.username,
            info.name.unwrap_or_else(|| channel.to_string()),
            info.guild_id.as_deref().unwrap_or("direct message")
        ))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PagecapError> {
        let mut url = Url::parse(DISCORD_API_BASE)
            .map_err(|e| PagecapError::Config(format!("Discord base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PagecapError::Config("Discord base URL cannot be a base".into()))?
            .extend(segments);
        Ok(url)
    }

    /// Authenticated request; only transport failures are mapped here.
    async fn send_raw(
        &self,
        method: Method,
        url: Url,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, PagecapError> {
        let path = url.path().to_string();
        let mut req = self
            .client
            .request(method.clone(), url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .query(params);
        if method == Method::PUT {
            // Discord rejects bodiless PUTs without an explicit length
            req = req.header("Content-Length", "0");
        }
        req.send().await.map_err(|e| PagecapError::Source {
            source_id: SOURCE_ID.into(),
            message: format!("{path}: {e}"),
            retriable: true,
        })
    }

    /// Map HTTP failures onto retriable/non-retriable errors.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PagecapError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .json::<RateLimitBody>()
                .await
                .map(|b| (b.retry_after * 1000.0) as u64)
                .unwrap_or(0);
            return Err(PagecapError::RateLimited {
                source_id: SOURCE_ID.into(),
                retry_after_ms,
            });
        }

        let path = resp.url().path().to_string();
        let body = resp.text().await.unwrap_or_default();
        Err(PagecapError::Source {
            source_id: SOURCE_ID.into(),
            message: format!("{path} returned {status}: {body}"),
            retriable: status.is_server_error(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, PagecapError> {
        Self::check(self.send_raw(method, url, params).await?).await
    }

    fn api_url(&self, path: &str) -> Result<Url, PagecapError> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        self.url(&segments)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, PagecapError> {
        let path = resp.url().path().to_string();
        resp.json::<T>().await.map_err(|e| PagecapError::Source {
            source_id: SOURCE_ID.into(),
            message: format!("{path}: invalid response body: {e}"),
            retriable: false,
        })
    }

    async fn api_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PagecapError> {
        let resp = self.send(Method::GET, self.api_url(path)?, params).await?;
        Self::decode(resp).await
    }

    /// Guild of a channel, looked up once and cached.
    async fn guild_of(&self, channel: &str) -> Option<String> {
        let cached = self.guilds.lock().ok().and_then(|g| g.get(channel).cloned());
        if let Some(guild) = cached {
            return guild;
        }
        let guild = match self
            .api_get::<DiscordChannel>(&format!("/channels/{channel}"), &[])
            .await
        {
            Ok(info) => info.guild_id,
            Err(e) => {
                tracing::debug!("Could not resolve guild for channel {}: {}", channel, e);
                return None;
            }
        };
        if let Ok(mut guilds) = self.guilds.lock() {
            guilds.insert(channel.to_string(), guild.clone());
        }
        guild
    }

    async fn convert_messages(
        &self,
        channel: &str,
        raw: Vec<DiscordMessage>,
    ) -> Result<Vec<Message>, PagecapError> {
        let guild = self.guild_of(channel).await;
        raw.into_iter()
            .map(|m| m.into_message(guild.clone()))
            .collect()
    }
}

// -- Discord API response types --

#[derive(Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    author: DiscordAuthor,
    #[serde(default)]
    content: String,
    timestamp: String,
    #[serde(default)]
    embeds: Vec<DiscordEmbed>,
}

impl DiscordMessage {
    fn into_message(self, guild: Option<String>) -> Result<Message, PagecapError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PagecapError::Source {
                source_id: SOURCE_ID.into(),
                message: format!("message {} has bad timestamp: {e}", self.id),
                retriable: false,
            })?;

        Ok(Message {
            id: self.id,
            channel: self.channel_id,
            guild,
            author: self.author.username,
            author_id: self.author.id,
            author_is_bot: self.author.bot,
            text: self.content,
            blocks: self
                .embeds
                .into_iter()
                .map(|e| Block {
                    footer: e.footer.map(|f| f.text),
                    body: e.description,
                })
                .collect(),
            timestamp,
        })
    }
}

#[derive(Deserialize)]
struct DiscordAuthor {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct DiscordEmbed {
    description: Option<String>,
    footer: Option<DiscordFooter>,
}

#[derive(Deserialize)]
struct DiscordFooter {
    text: String,
}

#[derive(Deserialize)]
struct DiscordChannel {
    name: Option<String>,
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

// -- MessageSource implementation --

#[async_trait]
impl MessageSource for DiscordSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_latest(&self, channel: &str) -> Result<Option<Message>, PagecapError> {
        Ok(self.fetch_recent(channel, 1).await?.pop())
    }

    async fn fetch_recent(
        &self,
        channel: &str,
        limit: u32,
    ) -> Result<Vec<Message>, PagecapError> {
        let limit_str = limit.clamp(1, 100).to_string();
        let raw: Vec<DiscordMessage> = self
            .api_get(
                &format!("/channels/{channel}/messages"),
                &[("limit", &limit_str)],
            )
            .await?;

        // Discord returns newest first
        let mut messages = self.convert_messages(channel, raw).await?;
        messages.reverse();
        Ok(messages)
    }

    async fn fetch_message(
        &self,
        channel: &str,
        id: &str,
    ) -> Result<Option<Message>, PagecapError> {
        let url = self.api_url(&format!("/channels/{channel}/messages/{id}"))?;
        let resp = self.send_raw(Method::GET, url, &[]).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: DiscordMessage = Self::decode(Self::check(resp).await?).await?;
        Ok(self.convert_messages(channel, vec![raw]).await?.pop())
    }

    fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }
}

// -- PageAdvancer implementation --

#[async_trait]
impl PageAdvancer for DiscordSource {
    /// Toggle our reaction on the responder's message. The previous one is
    /// removed first so the add registers as a fresh click.
    async fn request_next(&self, message: &Message) -> Result<(), PagecapError> {
        let url = self.url(&[
            "channels",
            &message.channel,
            "messages",
            &message.id,
            "reactions",
            &self.advance_reaction,
            "@me",
        ])?;

        if let Err(e) = self.send(Method::DELETE, url.clone(), &[]).await {
            tracing::debug!("Removing previous reaction on {} failed: {}", message.id, e);
        }
        self.send(Method::PUT, url, &[]).await?;
        Ok(())
    }
}
