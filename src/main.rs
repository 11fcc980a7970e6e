//! Shaker - Agent Coordination Gateway
//!
//! Entry point for the gateway server and the A2A client commands.

use clap::{Parser, Subcommand, ValueEnum};
use shaker_core::{
    A2aClient, ApiServer, ContentFormat, GatewayConfig, HttpA2aClient, Message,
    SendMessageRequest,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shaker")]
#[command(about = "Agent coordination gateway: A2A tasks, SSE streaming and realtime push", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Configuration file (defaults to ./shaker.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server
    Serve {
        /// Listen port
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Public URL advertised in the agent card
        #[arg(long, env = "BASE_URL")]
        base_url: Option<String>,

        /// Directory for durable task files
        #[arg(long, env = "TASKS_DIR")]
        tasks_dir: Option<PathBuf>,
    },

    /// Fetch and validate a remote agent card
    Discover {
        /// Agent base URL
        url: String,
    },

    /// Send a message to a remote agent
    Send {
        /// Agent base URL
        url: String,

        /// Message content
        content: String,

        /// Content format
        #[arg(long, value_enum, default_value = "text")]
        format: FormatArg,

        /// Stream updates over SSE
        #[arg(long)]
        stream: bool,

        /// Poll until the task finishes, giving up after this many seconds
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Show a remote task
    Task {
        /// Agent base URL
        url: String,

        /// Task ID
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Markdown,
}

impl From<FormatArg> for ContentFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => ContentFormat::Text,
            FormatArg::Markdown => ContentFormat::Markdown,
        }
    }
}

/// Cancelled on Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "shaker={level},shaker_core={level},tower_http=warn",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Shaker v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve {
            port,
            host,
            base_url,
            tasks_dir,
        } => {
            let mut config = GatewayConfig::load(cli.config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if base_url.is_some() {
                config.server.base_url = base_url;
            }
            if tasks_dir.is_some() {
                config.tasks.dir = tasks_dir;
            }

            match &config.tasks.dir {
                Some(dir) => info!("Task files stored in {}", dir.display()),
                None => warn!("No tasks dir configured, tasks are kept in memory only"),
            }

            let server = ApiServer::new(config).await?;
            let shutdown = server.shutdown_token();
            let interrupt = ctrl_c_token();
            tokio::spawn(async move {
                interrupt.cancelled().await;
                shutdown.cancel();
            });

            server.serve().await
        }
        Commands::Discover { url } => {
            let client = HttpA2aClient::new()?;
            let card = client.discover(&url).await?;

            println!("{}", serde_json::to_string_pretty(&card)?);
            let missing = card.validate();
            if !missing.is_empty() {
                eprintln!();
                for field in missing {
                    eprintln!("warning: {}", field);
                }
            }
            Ok(())
        }
        Commands::Send {
            url,
            content,
            format,
            stream,
            wait,
        } => {
            let client = HttpA2aClient::new()?;
            let request = SendMessageRequest::new(Message {
                format: format.into(),
                ..Message::text(content)
            });
            request.validate()?;

            let cancel = ctrl_c_token();

            if stream {
                let mut updates = client.stream_message(&url, &request, cancel).await?;
                while let Some(update) = updates.recv().await {
                    println!("{}: {}", update.event, update.data);
                }
                return Ok(());
            }

            let accepted = client.send_message(&url, &request).await?;
            println!("{}", serde_json::to_string_pretty(&accepted)?);

            if let Some(secs) = wait {
                let task = client
                    .poll_task(
                        &url,
                        &accepted.task_id,
                        Duration::from_millis(500),
                        Duration::from_secs(secs),
                        &cancel,
                    )
                    .await?;
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            Ok(())
        }
        Commands::Task { url, id } => {
            let client = HttpA2aClient::new()?;
            let task = client.get_task(&url, &id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
    }
}
