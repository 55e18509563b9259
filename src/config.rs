/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, loading and validation
 */
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-pro";

/// Discord caps `GET /channels/{id}/messages` at 100 per page.
const MAX_FETCH_LIMIT: u8 = 100;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Environment variable not set: ${0}")]
    MissingEnvVar(String),
    #[error("Required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("Channel id `{0}` is not a valid numeric Discord id")]
    InvalidChannelId(String),
    #[error("Field `{0}` still holds a placeholder value")]
    Placeholder(&'static str),
    #[error("Message file not found: {0}")]
    MissingMessages(PathBuf),
    #[error("Message file has no usable lines: {0}")]
    EmptyMessages(PathBuf),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Sequential REST polling with optional random chat and auto reply.
    #[default]
    Poll,
    /// One push session per token, replying as messages arrive.
    Gateway,
    /// Post a random corpus line to every channel on an interval.
    Announce,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPolicy {
    /// At most one reply per channel per poll cycle.
    #[default]
    Once,
    /// Reply to every eligible candidate in the cycle.
    All,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub discord: DiscordConfig,
    pub gemini: Option<GeminiConfig>,
    pub reply: ReplyConfig,
    pub chat: ChatConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub tokens: Vec<String>,
    pub channel_ids: Vec<u64>,
    pub bot_account: bool,
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Applied to every harm category, e.g. `BLOCK_NONE`.
    #[serde(default)]
    pub safety_threshold: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub policy: ReplyPolicy,
    #[serde(default = "default_reply_limit", deserialize_with = "clamped_fetch_limit")]
    pub limit: u8,
    #[serde(default = "default_true")]
    pub mention_author: bool,
    #[serde(default = "default_prompt_file")]
    pub prompt_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub random_chat: bool,
    #[serde(default = "default_messages_file")]
    pub messages_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_token_delay")]
    pub token_delay: u64,
    #[serde(default = "default_message_delay")]
    pub message_delay: u64,
    #[serde(default = "default_restart_delay")]
    pub restart_delay: u64,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// `None` keeps reconnecting forever.
    #[serde(default)]
    pub max_restarts: Option<u32>,
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,
}

impl TimingConfig {
    pub fn token_delay(&self) -> Duration {
        Duration::from_secs(self.token_delay)
    }

    pub fn message_delay(&self) -> Duration {
        Duration::from_secs(self.message_delay)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// Raw document shape before validation. Ids and tokens are accepted either as
// a scalar or a list, and channel ids either as integers or numeric strings.

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    discord: Option<RawDiscord>,
    #[serde(default)]
    gemini: Option<GeminiConfig>,
    #[serde(default)]
    reply: Option<ReplyConfig>,
    #[serde(default)]
    chat: Option<ChatConfig>,
    #[serde(default)]
    timing: Option<TimingConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDiscord {
    #[serde(default, alias = "tokens")]
    token: Option<OneOrMany<String>>,
    #[serde(default, alias = "channel_ids")]
    channel_id: Option<OneOrMany<RawId>>,
    #[serde(default)]
    bot_account: bool,
    #[serde(default)]
    api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn parse(self) -> Result<u64, ConfigError> {
        let id = match self {
            RawId::Number(n) => n,
            RawId::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidChannelId(s.clone()))?,
        };
        if id == 0 {
            return Err(ConfigError::InvalidChannelId(id.to_string()));
        }
        Ok(id)
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: ReplyPolicy::Once,
            limit: default_reply_limit(),
            mention_author: true,
            prompt_file: default_prompt_file(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            random_chat: false,
            messages_file: default_messages_file(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            token_delay: default_token_delay(),
            message_delay: default_message_delay(),
            restart_delay: default_restart_delay(),
            interval_seconds: default_interval(),
            http_timeout_secs: default_http_timeout(),
            max_restarts: None,
            send_attempts: default_send_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    5
}

fn default_reply_limit() -> u8 {
    3
}

/// Any integer is accepted and pulled into Discord's `1..=100` page size.
fn clamped_fetch_limit<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let limit = i64::deserialize(deserializer)?;
    Ok(limit.clamp(1, i64::from(MAX_FETCH_LIMIT)) as u8)
}

fn default_prompt_file() -> PathBuf {
    PathBuf::from("prompt.txt")
}

fn default_messages_file() -> PathBuf {
    PathBuf::from("chat.txt")
}

fn default_token_delay() -> u64 {
    5
}

fn default_message_delay() -> u64 {
    2
}

fn default_restart_delay() -> u64 {
    10
}

fn default_interval() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    30
}

fn default_send_attempts() -> u32 {
    1
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
    }

    /// Parse a YAML document. Relative file paths resolve against `base_dir`.
    pub fn parse(raw: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        Self::parse_with(raw, base_dir, |name| std::env::var(name).ok())
    }

    /// `${VAR}` is expanded inside string values only, so comments and keys
    /// are never touched.
    fn parse_with<F>(raw: &str, base_dir: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(raw)?;
        expand_strings(&mut doc, &lookup)?;
        let raw: RawConfig = serde_yaml::from_value(doc)?;
        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        let discord = raw.discord.unwrap_or_default();

        let tokens: Vec<String> = discord
            .token
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(ConfigError::MissingField("discord.token"));
        }
        if tokens.iter().any(|t| is_placeholder(t)) {
            return Err(ConfigError::Placeholder("discord.token"));
        }

        let channel_ids = discord
            .channel_id
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(RawId::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if channel_ids.is_empty() {
            return Err(ConfigError::MissingField("discord.channel_id"));
        }

        let mut reply = raw.reply.unwrap_or_default();
        reply.prompt_file = resolve_path(base_dir, &reply.prompt_file);

        let mut chat = raw.chat.unwrap_or_default();
        chat.messages_file = resolve_path(base_dir, &chat.messages_file);

        let config = Config {
            mode: raw.mode,
            discord: DiscordConfig {
                tokens,
                channel_ids,
                bot_account: discord.bot_account,
                api_base: discord
                    .api_base
                    .map(|b| b.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            },
            gemini: raw.gemini,
            reply,
            chat,
            timing: raw.timing.unwrap_or_default(),
        };

        if config.needs_generation() {
            let key = config
                .gemini
                .as_ref()
                .map(|g| g.api_key.trim())
                .unwrap_or_default();
            if key.is_empty() {
                return Err(ConfigError::MissingField("gemini.api_key"));
            }
            if is_placeholder(key) {
                return Err(ConfigError::Placeholder("gemini.api_key"));
            }
        }

        Ok(config)
    }

    /// Whether the configured mode calls the generation API.
    pub fn needs_generation(&self) -> bool {
        match self.mode {
            Mode::Gateway => true,
            Mode::Poll => self.reply.enabled,
            Mode::Announce => false,
        }
    }

    /// Whether the message corpus must be present and non-empty.
    pub fn needs_corpus(&self) -> bool {
        self.mode == Mode::Announce || (self.mode == Mode::Poll && self.chat.random_chat)
    }
}

fn is_placeholder(value: &str) -> bool {
    value.contains("YOUR_")
}

/// Expand `${VAR_NAME}` patterns using `lookup`.
fn expand_env_vars<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = None;
    let expanded = ENV_VAR.replace_all(input, |caps: &regex::Captures| {
        match lookup(&caps[1]) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnvVar(name)),
        None => Ok(expanded.into_owned()),
    }
}

fn expand_strings<F>(value: &mut serde_yaml::Value, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        serde_yaml::Value::String(text) => {
            if ENV_VAR.is_match(text) {
                *text = expand_env_vars(text, lookup)?;
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                expand_strings(item, lookup)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_strings(item, lookup)?;
            }
        }
        serde_yaml::Value::Tagged(tagged) => expand_strings(&mut tagged.value, lookup)?,
        _ => {}
    }
    Ok(())
}

/// Expand `~/` and anchor relative paths at `base_dir`.
pub fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(yaml: &str) -> Result<Config, ConfigError> {
        Config::parse(yaml, Path::new("/srv/chatter"))
    }

    #[test]
    fn test_parse_minimal_poll_config_applies_defaults() {
        let config = parse(
            r#"
discord:
  token: ["tok-1", "tok-2"]
  channel_id: ["1300291026673729548", 1300291026673729549]
gemini:
  api_key: "real-key"
"#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Poll);
        assert_eq!(config.discord.tokens, vec!["tok-1", "tok-2"]);
        assert_eq!(
            config.discord.channel_ids,
            vec![1300291026673729548, 1300291026673729549]
        );
        assert_eq!(config.discord.api_base, DEFAULT_API_BASE);
        let gemini = config.gemini.as_ref().unwrap();
        assert_eq!(gemini.model, DEFAULT_MODEL);
        assert_eq!(gemini.max_attempts, 3);
        assert_eq!(gemini.retry_base_secs, 5);
        assert_eq!(config.reply.policy, ReplyPolicy::Once);
        assert_eq!(config.reply.limit, 3);
        assert_eq!(config.timing.token_delay, 5);
        assert_eq!(config.timing.message_delay, 2);
        assert_eq!(config.timing.restart_delay, 10);
        assert_eq!(config.timing.max_restarts, None);
        assert_eq!(config.timing.send_attempts, 1);
        assert!(!config.chat.random_chat);
        assert_eq!(config.chat.messages_file, PathBuf::from("/srv/chatter/chat.txt"));
        assert_eq!(config.reply.prompt_file, PathBuf::from("/srv/chatter/prompt.txt"));
    }

    #[test]
    fn test_single_token_and_channel_scalars_are_accepted() {
        let config = parse(
            r#"
mode: announce
discord:
  token: "only-token"
  channel_id: 42
"#,
        )
        .unwrap();

        assert_eq!(config.discord.tokens, vec!["only-token"]);
        assert_eq!(config.discord.channel_ids, vec![42]);
        assert!(config.gemini.is_none());
        assert!(config.needs_corpus());
        assert!(!config.needs_generation());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let err = parse(
            r#"
discord:
  channel_id: [1]
gemini:
  api_key: "k"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("discord.token")));
    }

    #[test]
    fn test_non_numeric_channel_is_rejected() {
        let err = parse(
            r#"
mode: announce
discord:
  token: "t"
  channel_id: ["general"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannelId(ref id) if id == "general"));
    }

    #[test]
    fn test_api_key_required_only_when_generating() {
        let err = parse(
            r#"
mode: gateway
discord:
  token: "t"
  channel_id: [1]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("gemini.api_key")));

        let config = parse(
            r#"
discord:
  token: "t"
  channel_id: [1]
reply:
  enabled: false
"#,
        )
        .unwrap();
        assert!(!config.needs_generation());
    }

    #[test]
    fn test_placeholder_key_is_rejected() {
        let err = parse(
            r#"
discord:
  token: "t"
  channel_id: [1]
gemini:
  api_key: "YOUR_GEMINI_KEY"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Placeholder("gemini.api_key")));
    }

    #[test]
    fn test_reply_limit_is_clamped() {
        let config = parse(
            r#"
discord:
  token: "t"
  channel_id: [1]
gemini:
  api_key: "k"
reply:
  limit: 0
  policy: all
"#,
        )
        .unwrap();
        assert_eq!(config.reply.limit, 1);
        assert_eq!(config.reply.policy, ReplyPolicy::All);

        let config = parse(
            r#"
discord:
  token: "t"
  channel_id: [1]
reply:
  enabled: false
  limit: 500
"#,
        )
        .unwrap();
        assert_eq!(config.reply.limit, 100);
    }

    #[test]
    fn test_env_vars_expand_in_values_but_not_comments() {
        let yaml = r#"
# `${UNSET_IN_COMMENT}` stays untouched here
discord:
  token: ["${CHATTER_TOKEN}"]
  channel_id: "${CHATTER_CHANNEL}"
reply:
  enabled: false
"#;
        let lookup = |name: &str| match name {
            "CHATTER_TOKEN" => Some("from-env".to_string()),
            "CHATTER_CHANNEL" => Some("99".to_string()),
            _ => None,
        };
        let config = Config::parse_with(yaml, Path::new("."), lookup).unwrap();
        assert_eq!(config.discord.tokens, vec!["from-env"]);
        assert_eq!(config.discord.channel_ids, vec![99]);

        let err = Config::parse_with(yaml, Path::new("."), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "CHATTER_TOKEN"));
    }

    #[test]
    fn test_shipped_example_config_loads() {
        let example = include_str!("../config.example.yaml");
        let lookup = |name: &str| match name {
            "DISCORD_TOKEN" => Some("example-discord-token".to_string()),
            "GEMINI_API_KEY" => Some("example-gemini-key".to_string()),
            _ => None,
        };

        let config = Config::parse_with(example, Path::new("/srv/chatter"), lookup).unwrap();
        assert_eq!(config.mode, Mode::Poll);
        assert_eq!(config.discord.tokens, vec!["example-discord-token"]);
        assert_eq!(config.discord.channel_ids, vec![1300291026673729548]);
        assert_eq!(config.gemini.as_ref().unwrap().api_key, "example-gemini-key");
        assert_eq!(config.reply.limit, 3);
    }

    #[test]
    fn test_env_var_expansion() {
        let expanded = expand_env_vars("api_key: \"${CHATTER_KEY}\"", |name| {
            (name == "CHATTER_KEY").then(|| "expanded-value".to_string())
        })
        .unwrap();
        assert_eq!(expanded, "api_key: \"expanded-value\"");

        let err = expand_env_vars("${CHATTER_NOPE}", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "CHATTER_NOPE"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = Config::load(dir.path().join("config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_resolves_paths_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "mode: announce\ndiscord:\n  token: t\n  channel_id: [7]\nchat:\n  messages_file: lines.txt\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.chat.messages_file, dir.path().join("lines.txt"));
    }
}
