//! BoltCache Server Binary
//!
//! Loads the YAML configuration, wires up the engine and front-ends, and
//! runs until interrupted.

use boltcache::{Config, Server, ServerMode};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// BoltCache - in-memory key-value cache server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the YAML config file (missing file uses the defaults)
    #[arg(short, long, default_value = "boltcache.yaml")]
    config: String,

    /// Override the configured server mode (tcp, rest, both)
    #[arg(long)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(mode) = &args.mode {
        config.server.mode = match mode.as_str() {
            "tcp" => ServerMode::Tcp,
            "rest" => ServerMode::Rest,
            "both" => ServerMode::Both,
            other => anyhow::bail!("invalid server mode: {other}"),
        };
    }
    config.validate()?;

    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("boltcache={}", config.logging.level).parse()?),
        )
        .init();

    info!(config = %args.config, "configuration loaded");
    Server::new(config).run().await?;
    Ok(())
}
