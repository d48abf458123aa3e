// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`Settings`] loaded from
//! them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `auth.redb` | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ACCESS_TOKEN_TTL_MINUTES` | Access token lifetime (1..=525600) | `60` |
//! | `REFRESH_TOKEN_TTL_DAYS` | Refresh token lifetime (1..=3650) | `7` |
//! | `BCRYPT_COST` | bcrypt work factor (10..=31) | `12` |
//! | `STORAGE_TIMEOUT_MS` | Deadline for one storage call | `5000` |
//! | `TOKEN_PRUNE_INTERVAL_SECS` | Expired-token sweep interval, `0` disables | `3600` |
//! | `SEED_ADMIN_EMAIL` | Admin account created at startup | unset |
//! | `SEED_ADMIN_PASSWORD` | Password for the seeded admin | unset |
//! | `SEED_ADMIN_NAME` | Display name for the seeded admin | `Administrator` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::password::{MAX_PASSWORD_BYTES, MIN_COST};
use crate::auth::TokenPolicy;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_MINUTES";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_DAYS";
pub const BCRYPT_COST_ENV: &str = "BCRYPT_COST";
pub const STORAGE_TIMEOUT_ENV: &str = "STORAGE_TIMEOUT_MS";
pub const TOKEN_PRUNE_INTERVAL_ENV: &str = "TOKEN_PRUNE_INTERVAL_SECS";
pub const SEED_ADMIN_EMAIL_ENV: &str = "SEED_ADMIN_EMAIL";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const SEED_ADMIN_NAME_ENV: &str = "SEED_ADMIN_NAME";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TOKEN_PRUNE_INTERVAL_SECS: u64 = 3_600;
pub const DEFAULT_SEED_ADMIN_NAME: &str = "Administrator";

/// Default `RUST_LOG` filter when the variable is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Database file created inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "auth.redb";

/// bcrypt rejects work factors above this.
const MAX_BCRYPT_COST: u32 = 31;

/// One year.
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 525_600;
/// Ten years.
pub const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 3_650;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{set} is set but {missing} is not")]
    Incomplete {
        set: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected 'json' or 'pretty', got '{other}'")),
        }
    }
}

/// Admin account to create at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_policy: TokenPolicy,
    pub bcrypt_cost: u32,
    pub storage_timeout: Duration,
    /// `None` disables the background pruner
    pub prune_interval: Option<Duration>,
    pub seed_admin: Option<SeedAdmin>,
    pub log_format: LogFormat,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_minutes: i64 = parse_or(
            &lookup,
            ACCESS_TOKEN_TTL_ENV,
            DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
        )?;
        let refresh_days: i64 =
            parse_or(&lookup, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TOKEN_TTL_DAYS)?;
        let access_ttl = ttl(
            ACCESS_TOKEN_TTL_ENV,
            access_minutes,
            MAX_ACCESS_TOKEN_TTL_MINUTES,
            chrono::Duration::try_minutes,
        )?;
        let refresh_ttl = ttl(
            REFRESH_TOKEN_TTL_ENV,
            refresh_days,
            MAX_REFRESH_TOKEN_TTL_DAYS,
            chrono::Duration::try_days,
        )?;

        let bcrypt_cost: u32 =
            parse_or(&lookup, BCRYPT_COST_ENV, crate::auth::password::DEFAULT_COST)?;
        if !(MIN_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: BCRYPT_COST_ENV,
                value: bcrypt_cost.to_string(),
                reason: format!("must be between {MIN_COST} and {MAX_BCRYPT_COST}"),
            });
        }

        let storage_timeout_ms: u64 =
            parse_or(&lookup, STORAGE_TIMEOUT_ENV, DEFAULT_STORAGE_TIMEOUT_MS)?;
        require_positive(STORAGE_TIMEOUT_ENV, storage_timeout_ms as i64)?;

        let prune_secs: u64 = parse_or(
            &lookup,
            TOKEN_PRUNE_INTERVAL_ENV,
            DEFAULT_TOKEN_PRUNE_INTERVAL_SECS,
        )?;

        Ok(Self {
            data_dir: PathBuf::from(
                non_empty(&lookup, DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            host: non_empty(&lookup, HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, PORT_ENV, DEFAULT_PORT)?,
            token_policy: TokenPolicy {
                access_ttl,
                refresh_ttl,
            },
            bcrypt_cost,
            storage_timeout: Duration::from_millis(storage_timeout_ms),
            prune_interval: (prune_secs > 0).then(|| Duration::from_secs(prune_secs)),
            seed_admin: seed_admin(&lookup)?,
            log_format: parse_or(&lookup, LOG_FORMAT_ENV, LogFormat::default())?,
        })
    }

    /// Full path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: HOST_ENV,
                value: self.host.clone(),
                reason: e.to_string(),
            })
    }
}

fn non_empty<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn require_positive(var: &'static str, value: i64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}

/// Build a token lifetime from a count of `unit`s in `1..=max`.
fn ttl(
    var: &'static str,
    value: i64,
    max: i64,
    unit: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    require_positive(var, value)?;
    let invalid = || ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: format!("must not exceed {max}"),
    };
    if value > max {
        return Err(invalid());
    }
    unit(value).ok_or_else(invalid)
}

fn seed_admin<F>(lookup: &F) -> Result<Option<SeedAdmin>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let email = non_empty(lookup, SEED_ADMIN_EMAIL_ENV);
    let password = lookup(SEED_ADMIN_PASSWORD_ENV).filter(|p| !p.is_empty());

    match (email, password) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Incomplete {
            set: SEED_ADMIN_EMAIL_ENV,
            missing: SEED_ADMIN_PASSWORD_ENV,
        }),
        (None, Some(_)) => Err(ConfigError::Incomplete {
            set: SEED_ADMIN_PASSWORD_ENV,
            missing: SEED_ADMIN_EMAIL_ENV,
        }),
        (Some(_), Some(password)) if password.len() > MAX_PASSWORD_BYTES => {
            Err(ConfigError::Invalid {
                var: SEED_ADMIN_PASSWORD_ENV,
                value: "<redacted>".to_string(),
                reason: format!("must not exceed {MAX_PASSWORD_BYTES} bytes"),
            })
        }
        (Some(email), Some(password)) => Ok(Some(SeedAdmin {
            name: non_empty(lookup, SEED_ADMIN_NAME_ENV)
                .unwrap_or_else(|| DEFAULT_SEED_ADMIN_NAME.to_string()),
            email,
            password,
        })),
    }
}
