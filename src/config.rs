use std::env;
use std::time::Duration;

use log::LevelFilter;
use thiserror::Error;

use crate::catalog::AlbumGroup;
use crate::policy::{AttributionClause, InclusionPolicy, PolicyError, DEFAULT_COMPILATION_DENYLIST};
use crate::resolver::DEFAULT_ALBUM_GROUPS;

const DEFAULT_DATABASE_URL: &str = "sqlite://popularity.db?mode=rwc";
const DEFAULT_WRITE_DELAY_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Airtable {
        access_token: String,
        base_id: String,
        table_name: String,
    },
    Database {
        url: String,
    },
}

impl StoreConfig {
    /// Airtable when an access token is configured, otherwise a sea-orm
    /// database.
    pub fn from_env() -> Result<Self, ConfigError> {
        match optional("AIRTABLE_ACCESS_TOKEN") {
            Some(access_token) => Ok(StoreConfig::Airtable {
                access_token,
                base_id: required("AIRTABLE_BASE_ID")?,
                table_name: required("AIRTABLE_TABLE_NAME")?,
            }),
            None => Ok(StoreConfig::Database {
                url: optional("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub clauses: Vec<AttributionClause>,
    pub denylist: Vec<String>,
    pub deny_appears_on_compilations: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            clauses: AttributionClause::ALL.to_vec(),
            denylist: DEFAULT_COMPILATION_DENYLIST
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            deny_appears_on_compilations: true,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let clauses = match optional("ATTRIBUTION_CLAUSES") {
            Some(value) => parse_clauses(&value)?,
            None => defaults.clauses,
        };
        let denylist = match optional("COMPILATION_DENYLIST") {
            Some(value) => split_patterns(&value),
            None => defaults.denylist,
        };
        let deny_appears_on_compilations = match optional("DENY_APPEARS_ON_COMPILATIONS") {
            Some(value) => parse_bool("DENY_APPEARS_ON_COMPILATIONS", &value)?,
            None => defaults.deny_appears_on_compilations,
        };

        Ok(Self {
            clauses,
            denylist,
            deny_appears_on_compilations,
        })
    }

    pub fn build(&self) -> Result<InclusionPolicy, PolicyError> {
        InclusionPolicy::new(
            &self.clauses,
            self.denylist.as_slice(),
            self.deny_appears_on_compilations,
        )
    }
}

/// Settings for one tracking pass.
#[derive(Debug, Clone)]
pub struct Config {
    pub artist_id: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub album_groups: Vec<AlbumGroup>,
    pub policy: PolicyConfig,
    pub store: StoreConfig,
    pub write_delay: Duration,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let album_groups = match optional("ALBUM_GROUPS") {
            Some(value) => parse_album_groups(&value)?,
            None => DEFAULT_ALBUM_GROUPS.to_vec(),
        };
        let write_delay_ms = match optional("WRITE_DELAY_MS") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "WRITE_DELAY_MS",
                value,
            })?,
            None => DEFAULT_WRITE_DELAY_MS,
        };
        let dry_run = match optional("DRY_RUN") {
            Some(value) => parse_bool("DRY_RUN", &value)?,
            None => false,
        };

        Ok(Self {
            artist_id: required("SPOTIFY_ARTIST_ID")?,
            spotify_client_id: required("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            album_groups,
            policy: PolicyConfig::from_env()?,
            store: StoreConfig::from_env()?,
            write_delay: Duration::from_millis(write_delay_ms),
            dry_run,
        })
    }
}

pub fn log_level() -> LevelFilter {
    optional("LOG_LEVEL")
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_clauses(value: &str) -> Result<Vec<AttributionClause>, ConfigError> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| AttributionClause::parse(part).map_err(ConfigError::from))
        .collect()
}

fn parse_album_groups(value: &str) -> Result<Vec<AlbumGroup>, ConfigError> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            AlbumGroup::parse(part).ok_or_else(|| ConfigError::Invalid {
                var: "ALBUM_GROUPS",
                value: part.trim().to_string(),
            })
        })
        .collect()
}

// Patterns are separated by ';' since ',' is common inside regexes.
fn split_patterns(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(str::to_string)
        .collect()
}
