/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/discord.rs
 * Responsibility: Discord domain types, the platform seam, and the raw REST client.
 */

use crate::config::Config;
use crate::retry::{Backoff, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Discord rejects message bodies longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// A message fetched during a poll cycle; used once and dropped.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MessageCandidate {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: Author,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => write!(f, "{}#{}", self.username, d),
            _ => f.write_str(&self.username),
        }
    }
}

/// The slice of the chat platform the bot consumes.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn current_user(&self) -> anyhow::Result<BotIdentity>;

    /// Newest first, as the platform returns them. Any failure yields an
    /// empty list.
    async fn recent_messages(&self, channel_id: u64, limit: u8) -> Vec<MessageCandidate>;

    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<()>;

    async fn reply_to(&self, message: &MessageCandidate, content: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<P: ChatPlatform + ?Sized> ChatPlatform for Arc<P> {
    async fn current_user(&self) -> anyhow::Result<BotIdentity> {
        (**self).current_user().await
    }

    async fn recent_messages(&self, channel_id: u64, limit: u8) -> Vec<MessageCandidate> {
        (**self).recent_messages(channel_id, limit).await
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<()> {
        (**self).send_message(channel_id, content).await
    }

    async fn reply_to(&self, message: &MessageCandidate, content: &str) -> anyhow::Result<()> {
        (**self).reply_to(message, content).await
    }
}

/// First eight characters of a token, safe to log.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        "***".to_string()
    }
}

/// Shorten `text` to at most `max` characters for log previews and message limits.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct RestClient {
    http: reqwest::Client,
    api_base: String,
    authorization: String,
    label: String,
    mention_author: bool,
    send_retry: RetryPolicy,
}

impl RestClient {
    pub fn new(token: &str, config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timing.http_timeout())
            .build()?;
        let authorization = if config.discord.bot_account && !token.starts_with("Bot ") {
            format!("Bot {}", token)
        } else {
            token.to_string()
        };
        let send_retry = RetryPolicy {
            max_attempts: config.timing.send_attempts.max(1),
            backoff: Backoff::Fixed(config.timing.message_delay()),
        };

        Ok(Self {
            http,
            api_base: config.discord.api_base.clone(),
            authorization,
            label: mask_token(token),
            mention_author: config.reply.mention_author,
            send_retry,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn post_message(&self, channel_id: &str, payload: &Value) -> anyhow::Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let label = format!("[{}] Discord send to #{}", self.label, channel_id);

        let url = url.as_str();
        let http = &self.http;
        let authorization = self.authorization.as_str();

        self.send_retry
            .run(&label, move || async move {
                let response = http
                    .post(url)
                    .header("Authorization", authorization)
                    .json(payload)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(anyhow::anyhow!("Discord API Error ({}): {}", status, body));
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl ChatPlatform for RestClient {
    async fn current_user(&self) -> anyhow::Result<BotIdentity> {
        let url = format!("{}/users/@me", self.api_base);
        let response = self
            .http
            .get(url)
            .header("Authorization", &self.authorization)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Discord rejected token {} ({}): {}",
                self.label,
                status,
                body
            ));
        }
        Ok(response.json::<BotIdentity>().await?)
    }

    async fn recent_messages(&self, channel_id: u64, limit: u8) -> Vec<MessageCandidate> {
        let url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, channel_id, limit
        );
        let response = match self
            .http
            .get(url)
            .header("Authorization", &self.authorization)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("⚠️ [{}] Fetch from #{} failed: {}", self.label, channel_id, e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            debug!(
                "[{}] Fetch from #{} returned {}, treating as empty",
                self.label,
                channel_id,
                response.status()
            );
            return Vec::new();
        }

        match response.json::<Vec<MessageCandidate>>().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("⚠️ [{}] Unreadable messages from #{}: {}", self.label, channel_id, e);
                Vec::new()
            }
        }
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<()> {
        let payload = json!({ "content": truncate_chars(content, MAX_MESSAGE_CHARS) });
        self.post_message(&channel_id.to_string(), &payload).await
    }

    async fn reply_to(&self, message: &MessageCandidate, content: &str) -> anyhow::Result<()> {
        let payload = reply_payload(message, content, self.mention_author);
        self.post_message(&message.channel_id, &payload).await
    }
}

fn reply_payload(message: &MessageCandidate, content: &str, mention_author: bool) -> Value {
    let mut reference = json!({
        "message_id": message.id,
        "channel_id": message.channel_id,
    });
    if let Some(guild_id) = &message.guild_id {
        reference["guild_id"] = json!(guild_id);
    }
    json!({
        "content": truncate_chars(content, MAX_MESSAGE_CHARS),
        "message_reference": reference,
        "allowed_mentions": { "replied_user": mention_author }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> MessageCandidate {
        MessageCandidate {
            id: "501".to_string(),
            channel_id: "42".to_string(),
            guild_id: Some("7".to_string()),
            author: Author {
                id: "9".to_string(),
                username: "sam".to_string(),
                bot: false,
            },
            content: "hello".to_string(),
        }
    }

    #[test]
    fn test_message_candidate_parses_discord_payload() {
        let raw = r#"[
            {"id": "2", "channel_id": "42", "content": "newest", "author": {"id": "5", "username": "bo", "bot": true}, "attachments": []},
            {"id": "1", "channel_id": "42", "content": "older", "author": {"id": "6", "username": "al"}}
        ]"#;
        let messages: Vec<MessageCandidate> = serde_json::from_str(raw).unwrap();

        assert_eq!(messages.len(), 2);
        assert!(messages[0].author.bot);
        assert!(!messages[1].author.bot);
        assert_eq!(messages[1].guild_id, None);
    }

    #[test]
    fn test_reply_payload_references_candidate() {
        let payload = reply_payload(&candidate(), "hey", false);

        assert_eq!(payload["content"], "hey");
        assert_eq!(payload["message_reference"]["message_id"], "501");
        assert_eq!(payload["message_reference"]["channel_id"], "42");
        assert_eq!(payload["message_reference"]["guild_id"], "7");
        assert_eq!(payload["allowed_mentions"]["replied_user"], false);
    }

    #[test]
    fn test_mask_token_keeps_only_prefix() {
        assert_eq!(mask_token("OTMzMjYyOTIzNzg1MTgzMjUz.GErSUP"), "OTMzMjYy…");
        assert_eq!(mask_token("short"), "***");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_identity_display_hides_zero_discriminator() {
        let legacy = BotIdentity {
            id: "1".to_string(),
            username: "buddy".to_string(),
            discriminator: Some("0420".to_string()),
        };
        assert_eq!(legacy.to_string(), "buddy#0420");

        let modern = BotIdentity {
            discriminator: Some("0".to_string()),
            ..legacy
        };
        assert_eq!(modern.to_string(), "buddy");
    }
}
