use chatter::config::{Config, DEFAULT_CONFIG_FILE, Mode};
use chatter::discord::mask_token;
use chatter::llm::GeminiClient;
use chatter::runner::Runtime;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chatter - Discord auto-chat and Gemini auto-reply", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (default: ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the configured mode (default)
    Run,
    /// Validate the settings and message files without touching the network
    Check,
    /// List Gemini models that support text generation
    Models,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_banner() {
    if !atty::is(atty::Stream::Stdout) {
        return;
    }
    println!(r#"
     ________          __  __
    / ____/ /_  ____ _/ /_/ /____  _____
   / /   / __ \/ __ `/ __/ __/ _ \/ ___/
  / /___/ / / / /_/ / /_/ /_/  __/ /
  \____/_/ /_/\__,_/\__/\__/\___/_/
    "#);
}

fn summarize(runtime: &Runtime) {
    let config = runtime.config();
    let tokens: Vec<String> = config.discord.tokens.iter().map(|t| mask_token(t)).collect();
    info!("📖 Configuration loaded successfully!");
    info!("  Mode: {:?}", config.mode);
    info!("  Tokens: {}", tokens.join(", "));
    info!("  Channels: {:?}", config.discord.channel_ids);
    info!("  Corpus: {} line(s) from {:?}", runtime.corpus().len(), config.chat.messages_file);
    if let Some(writer) = runtime.writer() {
        let persona = writer.persona().instruction();
        info!("  Persona: {}", chatter::discord::truncate_chars(persona, 60));
    }
    if config.mode == Mode::Poll {
        info!("  Reply policy: {:?} (limit {})", config.reply.policy, config.reply.limit);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Cli::parse();
    let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    info!("Loading configuration from: {}", config_path.display());

    let command = args.command.unwrap_or(Commands::Run);
    if matches!(command, Commands::Run) {
        print_banner();
    }

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match command {
        Commands::Models => {
            let gemini = config
                .gemini
                .as_ref()
                .context("`gemini.api_key` is required to list models")?;
            let client = GeminiClient::new(gemini, config.timing.http_timeout())?;
            println!("Available models:");
            for model in client.list_models().await? {
                println!("  → {}", model);
            }
            Ok(())
        }
        Commands::Check => {
            let runtime = Runtime::prepare(config)?;
            summarize(&runtime);
            Ok(())
        }
        Commands::Run => {
            let runtime = Runtime::prepare(config)?;
            summarize(&runtime);
            info!("🚀 Chatter is starting...");

            tokio::select! {
                result = runtime.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Stopped by user");
                    Ok(())
                }
            }
        }
    }
}
