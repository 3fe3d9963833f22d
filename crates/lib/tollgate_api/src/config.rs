//! Application configuration loaded from YAML.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! pg:
//!   hosts: [db-a, db-b]
//!   port: 5432
//!   user: tollgate
//!   password: secret
//!   db_name: tokens
//!   ssl_mode: prefer      # optional
//!   max_conn: 10          # optional
//! mailer:                 # optional; without it mismatches are only logged
//!   smtp_address: smtp.example.com
//!   smtp_port: 587
//!   author_name: alerts@example.com
//!   author_pwd: app-password
//!   notify_address: security@example.com  # optional, defaults to author_name
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tollgate_core::cluster::pg::PgClusterConfig;
use tollgate_core::config::FieldError;
use tollgate_core::notify::smtp::MailerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("validate {section} config: {source}")]
    Invalid {
        section: &'static str,
        #[source]
        source: FieldError,
    },
}

/// HTTP listener settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.host.is_empty() {
            return Err(FieldError::Missing("host"));
        }
        if self.port == 0 {
            return Err(FieldError::Missing("port"));
        }
        Ok(())
    }

    /// Address to bind the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: Option<ServerConfig>,
    pub pg: Option<PgClusterConfig>,
    pub mailer: Option<MailerConfig>,
}

impl AppConfig {
    /// Validate every section, returning the required ones.
    pub fn validate(&self) -> Result<(&ServerConfig, &PgClusterConfig), ConfigError> {
        let invalid = |section: &'static str| {
            move |source: FieldError| ConfigError::Invalid { section, source }
        };

        let server = self
            .server
            .as_ref()
            .ok_or_else(|| invalid("root")(FieldError::Missing("server")))?;
        let pg = self
            .pg
            .as_ref()
            .ok_or_else(|| invalid("root")(FieldError::Missing("pg")))?;

        server.validate().map_err(invalid("server"))?;
        pg.validate().map_err(invalid("pg"))?;
        if let Some(mailer) = &self.mailer {
            mailer.validate().map_err(invalid("mailer"))?;
        }
        Ok((server, pg))
    }
}

/// Parse and validate a config document.
pub fn parse_config_str(yaml: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate the config file at `path`.
pub fn parse_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&data)
}
