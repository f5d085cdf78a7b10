//! Command-line interface: `mirage serve` and `mirage init`.

use crate::config::Config;
use crate::engine::Engine;
use crate::server;
use crate::stats::StatsCollector;
use crate::store::{FileStore, MemoryStore, Store};
use crate::trace::TraceBus;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mirage",
    about = "API virtualization gateway for OpenAPI 3 specs",
    long_about = "Mirage answers live HTTP traffic for uploaded OpenAPI 3 descriptions \
                  from priority-ordered response rules, with templated bodies, artificial \
                  latency, and live request tracing."
)]
pub struct Cli {
    /// Config file (default: ./config.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway
    Serve {
        /// Development mode (verbose logging)
        #[arg(long)]
        dev: bool,
        /// Override the server port
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable TLS regardless of the config file
        #[arg(long)]
        tls: bool,
    },
    /// Create config.yaml and the data directory layout
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
        /// Directory to initialize
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { dev, port, tls } => serve(cli.config, dev, port, tls).await,
        Command::Init { force, path } => init(&path, force),
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    dev: bool,
    port: Option<u16>,
    tls: bool,
) -> Result<(), anyhow::Error> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port {
        config.server.port = port;
    }
    if tls {
        config.server.tls.enabled = true;
    }

    init_logging(&config, dev);

    info!("using data directory: {}", config.storage.path.display());

    let store: Arc<dyn Store> = match config.storage.kind.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        _ => Arc::new(
            FileStore::new(&config.storage.path)
                .map_err(|e| anyhow::anyhow!("failed to initialize file storage: {e}"))?,
        ),
    };

    let stats = Arc::new(StatsCollector::new());
    let trace_bus = Arc::new(TraceBus::new(config.tracing.max_traces));
    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::clone(&stats),
        Arc::clone(&trace_bus),
    ));

    let ctx = server::build_context(store, engine, stats, trace_bus);
    server::run(config, ctx).await
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config, anyhow::Error> {
    match config_path {
        Some(path) => Config::load(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display())),
        None => {
            let default_path = Path::new("config.yaml");
            if default_path.exists() {
                Config::load(default_path)
                    .map_err(|e| anyhow::anyhow!("failed to load config.yaml: {e}"))
            } else {
                let mut config = Config::default();
                config.resolve_storage_path();
                Ok(config)
            }
        }
    }
}

fn init_logging(config: &Config, dev: bool) {
    let level = if dev {
        Level::DEBUG
    } else {
        match config.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let builder = FmtSubscriber::builder().with_max_level(level);
    let set = if config.logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    if set.is_err() {
        warn!("logging already initialized");
    }
}

const CONFIG_TEMPLATE: &str = r#"# Mirage gateway configuration

server:
  port: 8080
  host: 0.0.0.0
  tls:
    enabled: false
    certFile: ""
    keyFile: ""
    autoGenerate: true
    storePath: ""

storage:
  type: file
  path: ./data

tracing:
  maxTraces: 1000
  retention: 24h

logging:
  level: info
  format: text
"#;

/// Create config.yaml plus the data directory layout, refusing to clobber
/// an existing config unless forced.
fn init(path: &Path, force: bool) -> Result<(), anyhow::Error> {
    let root = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let config_file = root.join("config.yaml");

    if config_file.exists() && !force {
        anyhow::bail!("config.yaml already exists. Use --force to overwrite");
    }

    for dir in ["data", "data/specs", "data/responses"] {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("failed to create directory {}: {e}", dir.display()))?;
        println!("Created directory: {}", dir.display());
    }

    std::fs::write(&config_file, CONFIG_TEMPLATE)
        .map_err(|e| anyhow::anyhow!("failed to write config file: {e}"))?;
    println!("Created config file: {}", config_file.display());
    println!();
    println!("Initialization complete. Start the gateway with:");
    println!();
    println!("  cd {}", root.display());
    println!("  mirage serve");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_layout_and_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        assert!(dir.path().join("config.yaml").exists());
        assert!(dir.path().join("data/specs").is_dir());
        assert!(dir.path().join("data/responses").is_dir());

        // Refuses to overwrite without --force
        assert!(init(dir.path(), false).is_err());
        init(dir.path(), true).unwrap();
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = serde_yaml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.kind, "file");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_parses_serve_flags() {
        let cli = Cli::parse_from(["mirage", "serve", "--port", "9999", "--tls", "--dev"]);
        match cli.command {
            Command::Serve { dev, port, tls } => {
                assert!(dev);
                assert!(tls);
                assert_eq!(port, Some(9999));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_cli_parses_init_flags() {
        let cli = Cli::parse_from(["mirage", "init", "--force", "--path", "/tmp/x"]);
        match cli.command {
            Command::Init { force, path } => {
                assert!(force);
                assert_eq!(path, PathBuf::from("/tmp/x"));
            }
            _ => panic!("expected init"),
        }
    }
}
