//! Durable, append-only observation storage.

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::model::Observation;

pub mod airtable;
pub mod database;

pub use airtable::AirtableStore;
pub use database::DatabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned status {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ObservationFilter {
    #[default]
    All,
    UriEquals(String),
}

impl ObservationFilter {
    pub fn matches(&self, observation: &Observation) -> bool {
        match self {
            ObservationFilter::All => true,
            ObservationFilter::UriEquals(uri) => &observation.uri == uri,
        }
    }
}

/// Result ordering. Date orderings break ties by stored order, newest
/// stored first when descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Stored,
    DateAscending,
    DateDescending,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservationQuery {
    pub filter: ObservationFilter,
    pub sort: SortOrder,
    pub limit: Option<u64>,
}

impl ObservationQuery {
    /// Full history in stored order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Most recent observation for `uri`.
    pub fn latest_for_uri(uri: &str) -> Self {
        Self {
            filter: ObservationFilter::UriEquals(uri.to_string()),
            sort: SortOrder::DateDescending,
            limit: Some(1),
        }
    }
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn create(&self, observation: &Observation) -> Result<(), StoreError>;

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError>;

    /// Deletes every observation. Returns how many were removed.
    async fn reset(&self) -> Result<u64, StoreError>;

    async fn latest_for_uri(&self, uri: &str) -> Result<Option<Observation>, StoreError> {
        Ok(self
            .query(&ObservationQuery::latest_for_uri(uri))
            .await?
            .into_iter()
            .next())
    }
}

/// Reads from the wrapped store but only logs writes.
pub struct DryRunStore<S> {
    inner: S,
}

impl<S> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ObservationStore> ObservationStore for DryRunStore<S> {
    async fn create(&self, observation: &Observation) -> Result<(), StoreError> {
        info!(
            "[dry run] would record {} on {} - SPI: {}",
            observation.track, observation.date, observation.spi
        );
        Ok(())
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        self.inner.query(query).await
    }

    async fn reset(&self) -> Result<u64, StoreError> {
        info!("[dry run] would reset the observation table");
        Ok(0)
    }
}

/// Opens the store selected by configuration.
pub async fn connect(
    config: &StoreConfig,
    dry_run: bool,
) -> Result<Box<dyn ObservationStore>, StoreError> {
    let store: Box<dyn ObservationStore> = match config {
        StoreConfig::Airtable {
            access_token,
            base_id,
            table_name,
        } => {
            info!("Using Airtable table {} in base {}", table_name, base_id);
            let store = AirtableStore::new(access_token, base_id, table_name)?;
            if dry_run {
                Box::new(DryRunStore::new(store))
            } else {
                Box::new(store)
            }
        }
        StoreConfig::Database { url } => {
            info!("Using database store");
            let store = DatabaseStore::connect(url).await?;
            if dry_run {
                Box::new(DryRunStore::new(store))
            } else {
                Box::new(store)
            }
        }
    };
    Ok(store)
}
