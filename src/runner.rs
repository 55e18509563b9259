/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/runner.rs
 * Responsibility: Mode dispatch plus the sequential poll and announce loops.
 */

use crate::config::{Config, Mode};
use crate::corpus::MessageCorpus;
use crate::cursor::CursorStore;
use crate::discord::{BotIdentity, ChatPlatform, RestClient, mask_token, truncate_chars};
use crate::gateway;
use crate::llm::{GeminiClient, ReplyWriter, TextModel};
use crate::persona::Persona;
use crate::responder::{ReplyOptions, auto_reply};
use crate::retry::RetryPolicy;
use anyhow::Context;
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// One credential with the state that must survive between cycles.
pub struct Account<P> {
    pub label: String,
    pub platform: P,
    pub identity: Option<BotIdentity>,
    pub cursors: CursorStore,
}

impl<P: ChatPlatform> Account<P> {
    pub fn new(label: impl Into<String>, platform: P) -> Self {
        Self {
            label: label.into(),
            platform,
            identity: None,
            cursors: CursorStore::new(),
        }
    }

    /// Resolve the account identity once; a failure is retried next cycle.
    pub async fn ensure_identity(&mut self) -> Option<BotIdentity> {
        if self.identity.is_none() {
            match self.platform.current_user().await {
                Ok(identity) => {
                    info!("🔑 [{}] Logged in as {}", self.label, identity);
                    self.identity = Some(identity);
                }
                Err(e) => {
                    error!("❌ [{}] Could not resolve account: {:#}", self.label, e);
                }
            }
        }
        self.identity.clone()
    }
}

/// Knobs for one pass over every account and channel.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub channel_ids: Vec<u64>,
    pub random_chat: bool,
    pub reply: Option<ReplyOptions>,
    pub message_delay: Duration,
    pub token_delay: Duration,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel_ids: config.discord.channel_ids.clone(),
            random_chat: config.chat.random_chat,
            reply: config.reply.enabled.then(|| ReplyOptions::from_config(config)),
            message_delay: config.timing.message_delay(),
            token_delay: config.timing.token_delay(),
        }
    }
}

/// Post one random corpus line to `channel_id`. Failures are logged only.
async fn post_random_line<P, R>(
    account: &Account<P>,
    who: &str,
    channel_id: u64,
    corpus: &MessageCorpus,
    rng: &mut R,
) -> bool
where
    P: ChatPlatform,
    R: Rng + ?Sized,
{
    let Some(line) = corpus.pick(rng).map(str::to_string) else {
        return false;
    };
    match account.platform.send_message(channel_id, &line).await {
        Ok(()) => {
            info!("💬 [{}] → #{}: {}", who, channel_id, truncate_chars(&line, 50));
            true
        }
        Err(e) => {
            warn!("⚠️ [{}] Send to #{} failed: {:#}", who, channel_id, e);
            false
        }
    }
}

/// One polling pass: for each account and channel, optionally post a random
/// line, then run the auto-reply cycle.
pub async fn poll_cycle<P, M, R>(
    accounts: &mut [Account<P>],
    writer: Option<&ReplyWriter<M>>,
    corpus: &MessageCorpus,
    settings: &CycleSettings,
    rng: &mut R,
) where
    P: ChatPlatform,
    M: TextModel,
    R: Rng + Send + ?Sized,
{
    for account in accounts.iter_mut() {
        let Some(identity) = account.ensure_identity().await else {
            sleep(settings.token_delay).await;
            continue;
        };
        let who = identity.to_string();

        for &channel_id in &settings.channel_ids {
            if settings.random_chat
                && post_random_line(account, &who, channel_id, corpus, rng).await
            {
                sleep(settings.message_delay).await;
            }

            if let (Some(writer), Some(options)) = (writer, settings.reply.as_ref()) {
                auto_reply(
                    &account.platform,
                    writer,
                    &identity,
                    &mut account.cursors,
                    channel_id,
                    options,
                )
                .await;
            }
        }
        sleep(settings.token_delay).await;
    }
}

/// One announce pass: every account posts one random line to every channel.
pub async fn announce_cycle<P, R>(
    accounts: &[Account<P>],
    corpus: &MessageCorpus,
    channel_ids: &[u64],
    message_delay: Duration,
    rng: &mut R,
) where
    P: ChatPlatform,
    R: Rng + Send + ?Sized,
{
    for account in accounts {
        for &channel_id in channel_ids {
            post_random_line(account, &account.label, channel_id, corpus, rng).await;
            sleep(message_delay).await;
        }
    }
}

/// Everything resolved from configuration before the first network call.
pub struct Runtime {
    config: Config,
    corpus: MessageCorpus,
    writer: Option<Arc<ReplyWriter<GeminiClient>>>,
}

impl Runtime {
    /// Load the corpus and persona and build the generation client. Fails on
    /// any fatal configuration problem; performs no network I/O.
    pub fn prepare(config: Config) -> anyhow::Result<Self> {
        let corpus = MessageCorpus::load(&config.chat.messages_file, config.needs_corpus())?;

        let writer = if config.needs_generation() {
            let gemini = config
                .gemini
                .as_ref()
                .context("gemini section is required for replies")?;
            let client = GeminiClient::new(gemini, config.timing.http_timeout())?;
            let persona = Persona::load(&config.reply.prompt_file);
            let retry = RetryPolicy::linear(
                gemini.max_attempts,
                Duration::from_secs(gemini.retry_base_secs),
            );
            Some(Arc::new(ReplyWriter::new(client, persona, retry)))
        } else {
            None
        };

        Ok(Self {
            config,
            corpus,
            writer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus(&self) -> &MessageCorpus {
        &self.corpus
    }

    pub fn writer(&self) -> Option<&ReplyWriter<GeminiClient>> {
        self.writer.as_deref()
    }

    fn rest_accounts(&self) -> anyhow::Result<Vec<Account<RestClient>>> {
        self.config
            .discord
            .tokens
            .iter()
            .map(|token| {
                let client = RestClient::new(token, &self.config)?;
                Ok(Account::new(client.label().to_string(), client))
            })
            .collect()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        match self.config.mode {
            Mode::Poll => self.run_poll().await,
            Mode::Announce => self.run_announce().await,
            Mode::Gateway => self.run_gateway().await,
        }
    }

    async fn run_poll(self) -> anyhow::Result<()> {
        let mut accounts = self.rest_accounts()?;
        let settings = CycleSettings::from_config(&self.config);
        let cycle_delay = self.config.timing.restart_delay();
        let mut rng = StdRng::from_entropy();

        info!(
            "🔁 Polling {} channel(s) with {} account(s)",
            settings.channel_ids.len(),
            accounts.len()
        );
        loop {
            poll_cycle(
                &mut accounts,
                self.writer.as_deref(),
                &self.corpus,
                &settings,
                &mut rng,
            )
            .await;
            sleep(cycle_delay).await;
        }
    }

    async fn run_announce(self) -> anyhow::Result<()> {
        let accounts = self.rest_accounts()?;
        let interval = self.config.timing.interval();
        let mut rng = StdRng::from_entropy();

        info!("📣 Auto-chat loop started every {}s", interval.as_secs());
        loop {
            announce_cycle(
                &accounts,
                &self.corpus,
                &self.config.discord.channel_ids,
                self.config.timing.message_delay(),
                &mut rng,
            )
            .await;
            sleep(interval).await;
        }
    }

    async fn run_gateway(self) -> anyhow::Result<()> {
        let writer = self
            .writer
            .clone()
            .context("gateway mode needs a configured generator")?;

        let sessions = self
            .config
            .discord
            .tokens
            .iter()
            .map(|token| gateway::run_gateway(token.clone(), &self.config, writer.clone()));

        for (token, result) in self.config.discord.tokens.iter().zip(join_all(sessions).await) {
            if let Err(e) = result {
                error!("⚠️ [{}] Session ended: {:#}", mask_token(token), e);
            }
        }
        Ok(())
    }
}
