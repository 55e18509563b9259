/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/gateway.rs
 * Responsibility: Push-based auto reply. One supervised Serenity session per token.
 */

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::prelude::*;

use crate::config::Config;
use crate::cursor::CursorStore;
use crate::discord::{Author, MAX_MESSAGE_CHARS, MessageCandidate, mask_token, truncate_chars};
use crate::llm::{ReplyWriter, TextModel};
use crate::responder::screen;
use crate::session::{RestartPolicy, supervise};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, trace};

struct Responder<M> {
    label: String,
    channels: Arc<HashSet<u64>>,
    writer: Arc<ReplyWriter<M>>,
    // Lives outside the client so handled ids survive reconnects.
    cursors: Arc<Mutex<CursorStore>>,
    message_delay: Duration,
    mention_author: bool,
}

impl<M> Clone for Responder<M> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            channels: self.channels.clone(),
            writer: self.writer.clone(),
            cursors: self.cursors.clone(),
            message_delay: self.message_delay,
            mention_author: self.mention_author,
        }
    }
}

impl<M: TextModel> Responder<M> {
    /// Decide whether `candidate` gets an answer and produce its text. The id
    /// is not recorded here; call [`Responder::mark_replied`] once the reply
    /// is actually delivered.
    async fn answer(&self, candidate: &MessageCandidate, channel_id: u64, self_id: &str) -> Option<String> {
        if !self.channels.contains(&channel_id) {
            return None;
        }
        {
            let cursors = self.cursors.lock().await;
            if let Err(reason) = screen(candidate, self_id, cursors.get(channel_id)) {
                trace!("[{}] Ignoring message {}: {:?}", self.label, candidate.id, reason);
                return None;
            }
        }

        let answer = self.writer.generate(&candidate.content).await;
        if answer.is_empty() {
            return None;
        }
        Some(truncate_chars(&answer, MAX_MESSAGE_CHARS).to_string())
    }

    async fn mark_replied(&self, channel_id: u64, candidate: &MessageCandidate) {
        self.cursors.lock().await.record(channel_id, &candidate.id);
    }
}

#[async_trait]
impl<M: TextModel + 'static> EventHandler for Responder<M> {
    async fn message(&self, ctx: Context, msg: Message) {
        let channel_id = msg.channel_id.get();
        let candidate = to_candidate(&msg);
        let self_id = ctx.cache.current_user().id.to_string();

        let Some(content) = self.answer(&candidate, channel_id, &self_id).await else {
            return;
        };

        sleep(random_pause(self.message_delay)).await;

        let sent = if self.mention_author {
            msg.reply_ping(&ctx, content).await
        } else {
            msg.reply(&ctx, content).await
        };

        match sent {
            Ok(_) => {
                self.mark_replied(channel_id, &candidate).await;
                info!("↪️ [{}] Replied in #{}", self.label, channel_id);
            }
            Err(e) => error!("❌ [{}] Gemini/Discord error in #{}: {:?}", self.label, channel_id, e),
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!("✅ [{}] Connected as {}", self.label, ready.user.name);
    }
}

fn to_candidate(msg: &Message) -> MessageCandidate {
    MessageCandidate {
        id: msg.id.to_string(),
        channel_id: msg.channel_id.to_string(),
        guild_id: msg.guild_id.map(|id| id.to_string()),
        author: Author {
            id: msg.author.id.to_string(),
            username: msg.author.name.clone(),
            bot: msg.author.bot,
        },
        content: msg.content.clone(),
    }
}

/// Uniform in `[0, max]`, so replies don't land with machine timing.
fn random_pause(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

async fn connect<M: TextModel + 'static>(token: &str, handler: Responder<M>) -> anyhow::Result<()> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    client.start().await?;
    Ok(())
}

/// Run the push session for one token until it shuts down cleanly or its
/// restart budget is spent.
pub async fn run_gateway<M: TextModel + 'static>(
    token: String,
    config: &Config,
    writer: Arc<ReplyWriter<M>>,
) -> anyhow::Result<()> {
    let label = mask_token(&token);
    let responder = Responder {
        label: label.clone(),
        channels: Arc::new(config.discord.channel_ids.iter().copied().collect()),
        writer,
        cursors: Arc::new(Mutex::new(CursorStore::new())),
        message_delay: config.timing.message_delay(),
        mention_author: config.reply.mention_author,
    };
    let policy = RestartPolicy {
        delay: config.timing.restart_delay(),
        max_restarts: config.timing.max_restarts,
    };

    let token = token.as_str();
    let responder = &responder;
    supervise(&label, policy, move || connect(token, responder.clone())).await
}
