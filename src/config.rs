use std::env;

use thiserror::Error;

const DEFAULT_DB_PATH: &str = "scorekeeper.sqlite";
const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 3001;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub http_host: String,
    pub http_port: u16,
    pub jwt_secret: Option<String>,
    pub bcrypt_cost: u32,
    pub log_file_path: Option<String>,
    pub log_archive_pattern: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Unset and blank variables are treated the same.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let http_port = match var("KCD_HTTP_PORT") {
            Some(value) => parse(value, "KCD_HTTP_PORT", "port number")?,
            None => DEFAULT_HTTP_PORT,
        };
        let bcrypt_cost = match var("KCD_BCRYPT_COST") {
            Some(value) => {
                let cost: u32 = parse(value.clone(), "KCD_BCRYPT_COST", "bcrypt cost")?;
                if !(4..=31).contains(&cost) {
                    return Err(ConfigError::Invalid {
                        name: "KCD_BCRYPT_COST",
                        expected: "bcrypt cost",
                        value,
                    });
                }
                cost
            }
            None => bcrypt::DEFAULT_COST,
        };

        Ok(Self {
            db_path: var("KCD_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            http_host: var("KCD_HTTP_HOST").unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            http_port,
            jwt_secret: var("KCD_JWT_SECRET"),
            bcrypt_cost,
            log_file_path: var("LOG_FILE_PATH"),
            log_archive_pattern: var("LOG_ARCHIVE_PATTERN"),
        })
    }
}

fn parse<T: std::str::FromStr>(
    value: String,
    name: &'static str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}
