use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use entity::observation;
use entity::prelude::Observation as ObservationEntity;
use migration::{Migrator, MigratorTrait};

use super::{ObservationFilter, ObservationQuery, ObservationStore, SortOrder, StoreError};
use crate::model::Observation;

/// Observation table kept in a SQL database through sea-orm.
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(url.to_string());
        opt.connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);
        // Each in-memory sqlite connection is its own database.
        if url.contains(":memory:") {
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(5);
        }

        let db = Database::connect(opt).await?;
        Self::with_connection(db).await
    }

    pub async fn with_connection(db: DatabaseConnection) -> Result<Self, StoreError> {
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }
}

fn active_model(record: &Observation) -> observation::ActiveModel {
    observation::ActiveModel {
        id: NotSet,
        date: Set(record.date),
        track: Set(record.track.clone()),
        album: Set(Some(record.album.clone())),
        spi: Set(record.spi),
        uri: Set(Some(record.uri.clone())),
        release_date: Set(record.release_date),
        duration: Set(Some(record.duration.clone())),
    }
}

impl From<observation::Model> for Observation {
    fn from(model: observation::Model) -> Self {
        Self {
            date: model.date,
            track: model.track,
            album: model.album.unwrap_or_default(),
            spi: model.spi,
            uri: model.uri.unwrap_or_default(),
            release_date: model.release_date,
            duration: model.duration.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ObservationStore for DatabaseStore {
    async fn create(&self, record: &Observation) -> Result<(), StoreError> {
        active_model(record).insert(&self.db).await?;
        Ok(())
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        let mut select = ObservationEntity::find();

        if let ObservationFilter::UriEquals(uri) = &query.filter {
            select = select.filter(observation::Column::Uri.eq(uri.as_str()));
        }

        select = match query.sort {
            SortOrder::Stored => select.order_by_asc(observation::Column::Id),
            SortOrder::DateAscending => select
                .order_by_asc(observation::Column::Date)
                .order_by_asc(observation::Column::Id),
            SortOrder::DateDescending => select
                .order_by_desc(observation::Column::Date)
                .order_by_desc(observation::Column::Id),
        };

        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let models = select.all(&self.db).await?;
        Ok(models.into_iter().map(Observation::from).collect())
    }

    async fn reset(&self) -> Result<u64, StoreError> {
        let result = ObservationEntity::delete_many().exec(&self.db).await?;
        warn!("Deleted {} observations", result.rows_affected);
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    async fn store() -> DatabaseStore {
        DatabaseStore::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_active_model_leaves_id_to_the_database() {
        let model = active_model(&record("2024-01-02", "B", 20, "u:b"));

        assert_eq!(model.id, NotSet);
        assert_eq!(model.spi, Set(20));
        assert_eq!(model.uri, Set(Some("u:b".to_string())));
        assert_eq!(model.duration, Set(Some("3:20".to_string())));
    }

    #[tokio::test]
    async fn test_create_and_query_in_stored_order() {
        let store = store().await;
        store.create(&record("2024-01-02", "B", 20, "u:b")).await.unwrap();
        store.create(&record("2024-01-01", "A", 10, "u:a")).await.unwrap();

        let all = store.query(&ObservationQuery::all()).await.unwrap();
        let tracks: Vec<_> = all.iter().map(|o| o.track.as_str()).collect();
        assert_eq!(tracks, vec!["B", "A"]);
        assert_eq!(all[0], record("2024-01-02", "B", 20, "u:b"));
    }

    #[tokio::test]
    async fn test_latest_for_uri() {
        let store = store().await;
        store.create(&record("2024-01-01", "A", 10, "u:a")).await.unwrap();
        store.create(&record("2024-01-03", "A", 30, "u:a")).await.unwrap();
        store.create(&record("2024-01-03", "A", 31, "u:a")).await.unwrap();
        store.create(&record("2024-01-02", "A", 20, "u:a")).await.unwrap();
        store.create(&record("2024-01-09", "B", 90, "u:b")).await.unwrap();

        let latest = store.latest_for_uri("u:a").await.unwrap().unwrap();
        assert_eq!(latest.spi, 31);
        assert!(store.latest_for_uri("u:none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_date_ascending_with_filter() {
        let store = store().await;
        store.create(&record("2024-01-03", "A", 30, "u:a")).await.unwrap();
        store.create(&record("2024-01-01", "A", 10, "u:a")).await.unwrap();
        store.create(&record("2024-01-02", "B", 20, "u:b")).await.unwrap();

        let query = ObservationQuery {
            filter: ObservationFilter::UriEquals("u:a".to_string()),
            sort: SortOrder::DateAscending,
            limit: None,
        };
        let spis: Vec<_> = store
            .query(&query)
            .await
            .unwrap()
            .iter()
            .map(|o| o.spi)
            .collect();
        assert_eq!(spis, vec![10, 30]);
    }

    #[tokio::test]
    async fn test_missing_optional_columns_read_as_empty() {
        let store = store().await;
        observation::ActiveModel {
            id: NotSet,
            date: Set(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            track: Set("Bare".to_string()),
            album: Set(None),
            spi: Set(5),
            uri: Set(None),
            release_date: Set(None),
            duration: Set(None),
        }
        .insert(&store.db)
        .await
        .unwrap();

        let all = store.query(&ObservationQuery::all()).await.unwrap();
        assert_eq!(all[0].album, "");
        assert_eq!(all[0].uri, "");
        assert_eq!(all[0].duration, "");
    }

    #[tokio::test]
    async fn test_reset_clears_table() {
        let store = store().await;
        store.create(&record("2024-01-01", "A", 10, "u:a")).await.unwrap();
        store.create(&record("2024-01-02", "A", 11, "u:a")).await.unwrap();

        assert_eq!(store.reset().await.unwrap(), 2);
        assert!(store.query(&ObservationQuery::all()).await.unwrap().is_empty());
    }
}
