use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4221";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "lantern", about = "Minimal single-threaded HTTP/1.1 server")]
pub struct Cli {
    /// Directory served and written by the /files/ routes
    #[arg(long, env = "LANTERN_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Address to listen on, as host:port
    #[arg(long)]
    pub listen: Option<String>,

    /// YAML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub directory: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            directory: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Defaults, overridden by the `LISTEN` environment variable.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Merges every source: file (if given), then `LISTEN`, then CLI flags.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();

        if let Some(listen) = &cli.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(directory) = &cli.directory {
            config.directory = Some(directory.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(listen) = std::env::var("LISTEN") {
            self.listen_addr = listen;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(dir) = &self.directory {
            if !dir.is_dir() {
                bail!("Directory {} does not exist", dir.display());
            }
        }
        self.socket_addr()?;
        self.log_level()?;
        Ok(())
    }

    /// Resolves `listen_addr` to the first matching socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .to_socket_addrs()
            .with_context(|| format!("Invalid listen address {}", self.listen_addr))?
            .next()
            .with_context(|| format!("Listen address {} resolved to nothing", self.listen_addr))
    }

    pub fn log_level(&self) -> anyhow::Result<tracing::Level> {
        self.log_level
            .parse()
            .with_context(|| format!("Invalid log level {}", self.log_level))
    }
}
