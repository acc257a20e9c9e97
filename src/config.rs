use chrono::Duration;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

pub const SECRET_ENV: &str = "SCRIBE_SECRET";
pub const DB_PATH_ENV: &str = "SCRIBE_DB_PATH";

#[derive(Parser, Debug)]
#[command(name = "scribe", about = "A multi-user publishing service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub pool_size: u32,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for session tokens, at least 32 bytes.
    pub secret: Option<String>,
    pub session_days: i64,
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            session_days: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("session_days", &self.session_days)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl AuthConfig {
    pub const MAX_SESSION_DAYS: i64 = 3650;

    /// Token lifetime, clamped to between one day and ten years.
    pub fn session_lifetime(&self) -> Duration {
        Duration::days(self.session_days.clamp(1, Self::MAX_SESSION_DAYS))
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::load_with_env(cli, |key| std::env::var(key).ok())
    }

    /// `load` with the environment supplied by the caller.
    pub fn load_with_env<F>(cli: &Cli, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // Environment overrides
        if let Some(secret) = env(SECRET_ENV).filter(|s| !s.is_empty()) {
            config.auth.secret = Some(secret);
        }
        if let Some(path) = env(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            config.database.path = Some(PathBuf::from(path));
        }

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("scribe.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".scribe")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("scribe.db"))
    }
}
