//! Document storage for weather records.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};
use tokio::sync::RwLock;

use crate::{
    config::{Config, StoreBackend},
    error::PersistenceError,
    model::WeatherRecord,
};

mod embedded;

pub use embedded::FjallStore;

/// A persisted record with its storage-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: WeatherRecord,
}

#[async_trait]
pub trait WeatherStore: Send + Sync + Debug {
    /// Cheap existence check used by the availability probe.
    async fn ping(&self) -> Result<(), PersistenceError>;

    /// Stores one document and returns its id. No uniqueness is enforced.
    async fn insert(&self, record: &WeatherRecord) -> Result<String, PersistenceError>;

    /// Records for exactly `city` observed at or after `since`, newest first.
    async fn find_since(
        &self,
        city: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, PersistenceError>;

    /// Writes and deletes a throwaway document.
    async fn check(&self) -> Result<(), PersistenceError>;

    async fn latest(&self, city: &str) -> Result<Option<StoredRecord>, PersistenceError> {
        Ok(self
            .find_since(city, DateTime::<Utc>::MIN_UTC)
            .await?
            .into_iter()
            .next())
    }
}

/// Opens the backend selected in the config. The embedded store is opened
/// lazily on first use, so this never touches the disk.
pub fn open(config: &Config) -> Result<Arc<dyn WeatherStore>> {
    let store: Arc<dyn WeatherStore> = match config.store.backend {
        StoreBackend::Fjall => Arc::new(FjallStore::new(config.store_path()?, &config.store.name)),
        StoreBackend::Memory => Arc::new(MemoryStore::default()),
    };
    Ok(store)
}

/// Keeps documents in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<StoredRecord>>,
}

#[async_trait]
impl WeatherStore for MemoryStore {
    async fn ping(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert(&self, record: &WeatherRecord) -> Result<String, PersistenceError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.docs.write().await.push(StoredRecord {
            id: id.clone(),
            record: record.clone(),
        });
        Ok(id)
    }

    async fn find_since(
        &self,
        city: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, PersistenceError> {
        let docs = self.docs.read().await;
        let mut found: Vec<StoredRecord> = docs
            .iter()
            .filter(|d| d.record.city == city && d.record.observed_at >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.record.observed_at.cmp(&a.record.observed_at));
        Ok(found)
    }

    async fn check(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
