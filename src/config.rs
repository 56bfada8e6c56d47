use anyhow::{Context, Result};
use clap::Parser;
use std::{env, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base of the download URLs handed out for stored files.
    pub public_url: String,
    /// Request body limit for multipart uploads.
    pub max_upload_mb: usize,
    /// Idle upload statuses are forgotten after this many seconds.
    pub upload_status_ttl_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "How-to publishing service")]
pub struct Args {
    /// Host to bind to (overrides HOWTO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides HOWTO_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded files are stored (overrides HOWTO_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides HOWTO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL used in download links (overrides HOWTO_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Maximum upload request size in MiB (overrides HOWTO_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Seconds an idle upload status is kept (overrides HOWTO_UPLOAD_STATUS_TTL_SECS)
    #[arg(long)]
    pub upload_status_ttl_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let env_host = env::var("HOWTO_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("HOWTO_PORT", 3000u16)?;
        let env_storage =
            env::var("HOWTO_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("HOWTO_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/howto.db".into());
        let env_max_upload = parse_env("HOWTO_MAX_UPLOAD_MB", 50usize)?;
        let env_status_ttl = parse_env("HOWTO_UPLOAD_STATUS_TTL_SECS", 3600u64)?;

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_url = match args.public_url.or_else(|| env::var("HOWTO_PUBLIC_URL").ok()) {
            Some(url) => url,
            None => format!("http://{}:{}", public_host(&host), port),
        };

        Ok(Self {
            host,
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url,
            max_upload_mb: args.max_upload_mb.unwrap_or(env_max_upload),
            upload_status_ttl_secs: args.upload_status_ttl_secs.unwrap_or(env_status_ttl),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn upload_status_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_status_ttl_secs)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

/// Wildcard bind addresses are not reachable from a browser.
fn public_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "::" => "localhost",
        other => other,
    }
}
