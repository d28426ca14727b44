//! # Baixiao — RAG chat assistant backend
//!
//! Usage:
//!   baixiao                                  # Serve HTTP :5000 and WebSocket :5001
//!   baixiao serve --http-port 8000           # Custom ports
//!   baixiao ingest ./library/notes.md https://example.com/faq
//!
//! Configuration is read from `$BAIXIAO_CONFIG` or `~/.baixiao/config.toml`;
//! `DASHSCOPE_API_KEY` / `DASHSCOPE_API_BASE` override the provider settings.

use anyhow::Result;
use baixiao_core::config::BaixiaoConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "baixiao",
    version,
    about = "🐱 Baixiao — retrieval-augmented chat assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: $BAIXIAO_CONFIG or ~/.baixiao/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP (SSE) and WebSocket servers
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(long)]
        http_port: Option<u16>,

        /// WebSocket port
        #[arg(long)]
        ws_port: Option<u16>,
    },
    /// Add files or URLs to the knowledge base and exit
    Ingest {
        /// File paths (.txt, .md) or http(s) URLs
        #[arg(required = true)]
        sources: Vec<String>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<BaixiaoConfig> {
    let Some(path) = path else {
        return Ok(BaixiaoConfig::load()?);
    };
    tracing::info!("📄 Loading config from {}", path.display());
    let mut config = BaixiaoConfig::load_from(&path)?;
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "baixiao=debug,baixiao_gateway=debug,baixiao_agent=debug,baixiao_knowledge=debug,baixiao_providers=debug,tower_http=debug"
    } else {
        "baixiao=info,baixiao_gateway=info,baixiao_agent=info,baixiao_knowledge=info,baixiao_providers=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config)?;

    match cli.command {
        None => serve(config).await,
        Some(Command::Serve {
            host,
            http_port,
            ws_port,
        }) => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = http_port {
                config.gateway.http_port = port;
            }
            if let Some(port) = ws_port {
                config.gateway.ws_port = port;
            }
            serve(config).await
        }
        Some(Command::Ingest { sources }) => ingest(config, sources).await,
    }
}

async fn serve(config: BaixiaoConfig) -> Result<()> {
    println!("🐱 {} v{}", config.identity.name, env!("CARGO_PKG_VERSION"));
    println!("   🌐 HTTP:      http://{}:{}", config.gateway.host, config.gateway.http_port);
    println!("   🔌 WebSocket: ws://{}:{}", config.gateway.host, config.gateway.ws_port);
    println!("   🧠 Model:     {}", config.llm.chat_model);
    println!();

    baixiao_gateway::start(&config).await
}

async fn ingest(config: BaixiaoConfig, sources: Vec<String>) -> Result<()> {
    let services = baixiao_gateway::build_services(&config)?;
    let ingestor = services.ingestor.clone();
    let report = tokio::task::spawn_blocking(move || ingestor.ingest(&sources)).await?;

    println!("📚 Knowledge base updated");
    println!("   ✅ Sources ingested: {}", report.sources_ok);
    println!("   🧩 Chunks stored:    {}", report.chunks_stored);
    for failed in &report.sources_failed {
        println!("   ❌ {}: {}", failed.source, failed.error);
    }
    let (sources, chunks) = services.store.stats();
    println!("   Total: {sources} sources, {chunks} chunks");

    if report.sources_ok == 0 && !report.sources_failed.is_empty() {
        anyhow::bail!("no source could be ingested");
    }
    Ok(())
}
