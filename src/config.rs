use anyhow::{Context, Result};
use clap::Parser;
use std::env;

use crate::state::UploadLimits;

const DEFAULT_MAX_ASSET_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 15 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_asset_bytes: usize,
    pub max_body_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Club-portal batch store API")]
pub struct Args {
    /// Host to bind to (overrides PORTAL_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORTAL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides PORTAL_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum size of one uploaded asset in bytes (overrides PORTAL_MAX_ASSET_BYTES)
    #[arg(long)]
    pub max_asset_bytes: Option<usize>,

    /// Maximum size of a whole upload body in bytes (overrides PORTAL_MAX_BODY_BYTES)
    #[arg(long)]
    pub max_body_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("PORTAL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("PORTAL_PORT", 3000u16)?;
        let env_db = env::var("PORTAL_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/portal_store.db".into());
        let env_asset = parse_env("PORTAL_MAX_ASSET_BYTES", DEFAULT_MAX_ASSET_BYTES)?;
        let env_body = parse_env("PORTAL_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_asset_bytes: args.max_asset_bytes.unwrap_or(env_asset),
            max_body_bytes: args.max_body_bytes.unwrap_or(env_body),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_asset_bytes: self.max_asset_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
