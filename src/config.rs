// 🔐 Configuration - secrets.toml + env overrides
//
// Lookup order:
//   1. explicit path (--config)
//   2. CAJAS_CONFIG env var
//   3. .cajas/secrets.toml in the working directory
// A missing file is not an error: defaults apply.

use crate::error::CajaError;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = ".cajas/secrets.toml";
pub const DEFAULT_TIMEZONE: &str = "America/Argentina/Buenos_Aires";

/// Sessions older than this force a new login
pub const SESSION_TIMEOUT_HOURS: i64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding every table
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Address the web server binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// IANA name of the business timezone ("today" is computed here)
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_hours: i64,
}

fn default_database() -> PathBuf {
    PathBuf::from("cajas.db")
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_session_timeout() -> i64 {
    SESSION_TIMEOUT_HOURS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: default_database(),
            bind: default_bind(),
            timezone: default_timezone(),
            session_timeout_hours: default_session_timeout(),
        }
    }
}

impl Config {
    /// Resolve the config file, parse it, then apply env overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, Path::new("."), |key| std::env::var(key).ok())
    }

    /// `load` with the working directory and environment supplied by the caller
    pub fn load_with<F>(explicit: Option<&Path>, workdir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|s| !s.is_empty());

        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => var("CAJAS_CONFIG").map(PathBuf::from),
        };

        let mut config = match path {
            // An explicitly named file has to exist
            Some(p) => Self::from_file(&p)?,
            None => {
                let default_path = workdir.join(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Config::default()
                }
            }
        };

        if let Some(db) = var("CAJAS_DATABASE") {
            config.database = PathBuf::from(db);
        }
        if let Some(bind) = var("CAJAS_BIND") {
            config.bind = bind;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.session_timeout_hours <= 0 {
            return Err(CajaError::Config("session_timeout_hours must be positive".to_string()).into());
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, CajaError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CajaError::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Current calendar date in the business timezone
    pub fn today(&self) -> NaiveDate {
        let tz = self.tz().unwrap_or(chrono_tz::America::Argentina::Buenos_Aires);
        Utc::now().with_timezone(&tz).date_naive()
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_timeout_hours)
    }
}
