//! Gateway configuration loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tracing: TracingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_file: String,
    pub key_file: String,
    pub auto_generate: bool,
    /// Directory for auto-generated certificates. Empty means
    /// `<storage.path>/certs`.
    pub store_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// "memory" or "file".
    #[serde(rename = "type")]
    pub kind: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TracingConfig {
    pub max_traces: i64,
    /// Retention window as a human-readable duration, e.g. "24h".
    pub retention: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            tracing: TracingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            tls: TlsConfig {
                auto_generate: true,
                ..TlsConfig::default()
            },
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "file".to_string(),
            path: PathBuf::from("data"),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            max_traces: 1000,
            retention: "24h".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, filling omitted fields with
    /// defaults and resolving a relative storage path against the current
    /// working directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.resolve_storage_path();
        config.validate()?;
        Ok(config)
    }

    /// Resolve a relative `storage.path` against the working directory so
    /// later chdir-like surprises cannot move the data directory.
    pub fn resolve_storage_path(&mut self) {
        if self.storage.path.as_os_str().is_empty() || self.storage.path.is_absolute() {
            return;
        }
        if let Ok(cwd) = std::env::current_dir() {
            self.storage.path = cwd.join(&self.storage.path);
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.kind.as_str() {
            "memory" | "file" => {}
            other => anyhow::bail!("unsupported storage type '{other}' (expected memory or file)"),
        }
        if !self.tracing.retention.is_empty() {
            humantime::parse_duration(&self.tracing.retention)
                .map_err(|e| anyhow::anyhow!("invalid tracing.retention: {e}"))?;
        }
        Ok(())
    }

    /// Effective directory for auto-generated TLS material.
    pub fn tls_store_path(&self) -> PathBuf {
        if self.server.tls.store_path.is_empty() {
            self.storage.path.join("certs")
        } else {
            PathBuf::from(&self.server.tls.store_path)
        }
    }
}
