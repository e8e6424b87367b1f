use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(
    name = "itemdeck",
    version,
    about = "Command-line client for the Itemdeck items API"
)]
pub struct Cli {
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new account and log in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Log in with existing credentials
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Discard the stored session token
    Logout,
    /// Show the currently authenticated user
    Whoami,
    /// Manage items
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },
    /// Check API availability
    Health,
}

#[derive(Debug, Subcommand)]
pub enum ItemsAction {
    /// List all items
    List,
    /// Show a single item
    Get { id: String },
    /// Create a new item
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Replace an item's title and description
    Update {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete an item
    Delete { id: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub token_file: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid timeout {value:?}: {source}")]
    InvalidTimeout {
        value: String,
        source: humantime::DurationError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_url: Option<String>,
    token_file: Option<PathBuf>,
    timeout: Option<String>,
}

impl AppConfig {
    /// Resolution order per setting: CLI flag, env var, config file, default.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;

        let api_url = cli
            .api_url
            .clone()
            .or_else(|| read_env("ITEMDECK_API_URL"))
            .or(from_file.api_url)
            .unwrap_or_else(|| String::from("http://localhost:8000"));
        let token_file = cli
            .token_file
            .clone()
            .or_else(|| read_env("ITEMDECK_TOKEN_FILE").map(PathBuf::from))
            .or(from_file.token_file)
            .unwrap_or_else(|| PathBuf::from(".itemdeck-token"));
        let timeout = cli
            .timeout
            .clone()
            .or_else(|| read_env("ITEMDECK_TIMEOUT"))
            .or(from_file.timeout)
            .map_or(Ok(Duration::from_secs(30)), |raw| parse_timeout(&raw))?;

        Ok(Self {
            api_url: normalize_api_url(&api_url),
            token_file,
            timeout,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::InvalidTimeout {
        value: String::from(raw),
        source,
    })
}

/// Trailing slashes would double up when joined with request paths.
fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{normalize_api_url, parse_timeout, read_file_config};

    #[test]
    fn parse_timeout_accepts_humantime_values() {
        assert_eq!(parse_timeout("30s").ok(), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout("2m").ok(), Some(Duration::from_secs(120)));
        assert_eq!(parse_timeout(" 1s ").ok(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn parse_timeout_rejects_invalid_values() {
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("").is_err());
    }

    #[test]
    fn normalize_api_url_strips_trailing_slashes() {
        assert_eq!(
            normalize_api_url("http://localhost:8000/"),
            "http://localhost:8000"
        );
        assert_eq!(
            normalize_api_url(" http://api.example.com//"),
            "http://api.example.com"
        );
        assert_eq!(
            normalize_api_url("http://localhost:8000"),
            "http://localhost:8000"
        );
    }

    #[test]
    fn file_config_parses_all_fields() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "api_url = \"http://api.example.com\"\ntoken_file = \"/tmp/token\"\ntimeout = \"5s\"\n",
        )?;

        let config = read_file_config(Some(&path))?;
        assert_eq!(config.api_url.as_deref(), Some("http://api.example.com"));
        assert_eq!(
            config.token_file.as_deref(),
            Some(std::path::Path::new("/tmp/token"))
        );
        assert_eq!(config.timeout.as_deref(), Some("5s"));
        Ok(())
    }

    #[test]
    fn file_config_rejects_invalid_toml() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_url = [nonsense")?;

        assert!(read_file_config(Some(&path)).is_err());
        Ok(())
    }

    #[test]
    fn missing_config_file_defaults_to_empty() -> Result<()> {
        let config = read_file_config(None)?;
        assert!(config.api_url.is_none());
        assert!(config.token_file.is_none());
        assert!(config.timeout.is_none());
        Ok(())
    }
}
