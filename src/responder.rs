/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/responder.rs
 * Responsibility: Candidate screening and the poll-and-reply cycle with de-duplication.
 */

use crate::config::{Config, ReplyPolicy};
use crate::cursor::{ChannelCursor, CursorStore};
use crate::discord::{BotIdentity, ChatPlatform, MessageCandidate, truncate_chars};
use crate::llm::{ReplyWriter, TextModel};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

/// Why a candidate was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OwnMessage,
    FromBot,
    AlreadyHandled,
    Blank,
}

/// Decide whether `candidate` may be answered by the account `self_id`.
pub fn screen(
    candidate: &MessageCandidate,
    self_id: &str,
    cursor: Option<&ChannelCursor>,
) -> Result<(), Skip> {
    if candidate.author.id == self_id {
        return Err(Skip::OwnMessage);
    }
    if candidate.author.bot {
        return Err(Skip::FromBot);
    }
    if cursor.is_some_and(|c| c.contains(&candidate.id)) {
        return Err(Skip::AlreadyHandled);
    }
    if candidate.content.trim().is_empty() {
        return Err(Skip::Blank);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct ReplyOptions {
    pub limit: u8,
    pub delay: Duration,
    pub policy: ReplyPolicy,
}

impl ReplyOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.reply.limit,
            delay: config.timing.message_delay(),
            policy: config.reply.policy,
        }
    }
}

/// Outcome of one `auto_reply` call for a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyCycle {
    /// Ids of candidates answered in this cycle, oldest first.
    pub replied: Vec<String>,
    /// The channel's cursor after the cycle.
    pub cursor: Option<String>,
}

/// Fetch the latest messages of `channel_id`, answer eligible ones oldest
/// first, and advance the channel cursor past every answered message.
///
/// Under [`ReplyPolicy::Once`] at most one reply is sent. A failed send
/// abandons the rest of the cycle; the candidate stays eligible.
pub async fn auto_reply<P, M>(
    platform: &P,
    writer: &ReplyWriter<M>,
    identity: &BotIdentity,
    cursors: &mut CursorStore,
    channel_id: u64,
    options: &ReplyOptions,
) -> ReplyCycle
where
    P: ChatPlatform + ?Sized,
    M: TextModel,
{
    let mut messages = platform.recent_messages(channel_id, options.limit).await;
    messages.reverse();

    let mut replied = Vec::new();
    for candidate in &messages {
        if let Err(reason) = screen(candidate, &identity.id, cursors.get(channel_id)) {
            trace!("Skipping message {} in #{}: {:?}", candidate.id, channel_id, reason);
            continue;
        }

        if !replied.is_empty() {
            sleep(options.delay).await;
        }

        let answer = writer.generate(&candidate.content).await;
        if answer.is_empty() {
            debug!("[{}] No reply produced for message {}", identity, candidate.id);
            sleep(options.delay).await;
            continue;
        }

        if let Err(e) = platform.reply_to(candidate, &answer).await {
            warn!(
                "⚠️ [{}] Reply to message {} in #{} failed: {:#}",
                identity, candidate.id, channel_id, e
            );
            break;
        }

        info!(
            "↪️ [{}] -> {}: {}",
            identity,
            candidate.author.username,
            truncate_chars(&answer, 60)
        );
        cursors.record(channel_id, &candidate.id);
        replied.push(candidate.id.clone());

        if options.policy == ReplyPolicy::Once {
            break;
        }
    }

    ReplyCycle {
        replied,
        cursor: cursors.last(channel_id).map(str::to_string),
    }
}
