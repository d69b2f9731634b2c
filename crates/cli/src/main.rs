use clap::{Parser, Subcommand, ValueEnum};
use raybridge::backend::{Backend, BackendClient};
use raybridge::router::classify::{self, Classification};
use raybridge::transport::MessageKind;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "raybridge")]
#[command(about = "Command router between a messaging bridge and the inference backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config.json and the artifacts directory.
    Init {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway: receive bridge events, route commands, deliver replies.
    Serve {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Show how a message body would be classified.
    Classify {
        /// Message body, e.g. "/raymundo cuéntame un chiste en audio"
        body: String,

        /// Message kind
        #[arg(long, value_enum, default_value_t = KindArg::Text)]
        kind: KindArg,
    },

    /// Probe the backend health endpoint once.
    Health {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Clear a user's conversation history on the backend.
    ClearHistory {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// User id (the chat id the router sends, e.g. 5215550001@c.us)
        user_id: String,
    },

    /// Print backend statistics.
    Stats {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Reset the backend's usage counters.
    ResetMetrics {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show which speech engines the backend has available.
    AudioStatus {
        /// Config file path (default: RAYBRIDGE_CONFIG_PATH or ~/.raybridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Text,
    Voice,
    Status,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Text => MessageKind::Text,
            KindArg::Voice => MessageKind::Voice,
            KindArg::Status => MessageKind::Status,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("raybridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Classify { body, kind }) => {
            print_classification(&body, kind.into());
        }
        Some(Commands::Health { config }) => {
            if let Err(e) = run_health(config).await {
                log::error!("health check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::ClearHistory { config, user_id }) => {
            if let Err(e) = run_clear_history(config, &user_id).await {
                log::error!("clear-history failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Stats { config }) => {
            if let Err(e) = run_stats(config).await {
                log::error!("stats failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::ResetMetrics { config }) => {
            if let Err(e) = run_reset_metrics(config).await {
                log::error!("reset-metrics failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::AudioStatus { config }) => {
            if let Err(e) = run_audio_status(config).await {
                log::error!("audio-status failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(raybridge::config::default_config_path);
    let dir = raybridge::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = raybridge::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    raybridge::gateway::run_gateway(config, path).await
}

fn print_classification(body: &str, kind: MessageKind) {
    match classify::classify(body, kind) {
        Classification::Ignored { reason } => println!("ignored ({:?})", reason),
        Classification::Trivial { command } => println!("trivial: {:?}", command),
        Classification::Content {
            cleaned_text,
            wants_audio,
        } => {
            let flow = if wants_audio { "audio" } else { "text" };
            println!("content ({} reply): {}", flow, cleaned_text);
        }
    }
}

fn backend_client(config_path: Option<PathBuf>) -> anyhow::Result<BackendClient> {
    let (config, _) = raybridge::config::load_config(config_path)?;
    Ok(BackendClient::new(Some(
        raybridge::config::resolve_backend_url(&config),
    )))
}

async fn run_health(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = backend_client(config_path)?;
    let status = client.health(Duration::from_secs(5)).await?;
    println!(
        "{} is up | personality: {}",
        client.base_url(),
        status.personality()
    );
    Ok(())
}

async fn run_clear_history(config_path: Option<PathBuf>, user_id: &str) -> anyhow::Result<()> {
    let client = backend_client(config_path)?;
    let message = client.clear_history(user_id).await?;
    println!("{}", message);
    Ok(())
}

async fn run_stats(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = backend_client(config_path)?;
    let stats = client.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_reset_metrics(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = backend_client(config_path)?;
    let message = client.reset_metrics().await?;
    println!("{}", message);
    Ok(())
}

async fn run_audio_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = backend_client(config_path)?;
    let status = client.audio_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
