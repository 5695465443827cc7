use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt, path::PathBuf};
use tokio::{sync::OnceCell, task};
use uuid::Uuid;

use crate::{error::PersistenceError, model::WeatherRecord};

use super::{StoredRecord, WeatherStore};

const PING_KEY: &[u8] = b"__ping__";

/// Embedded LSM-tree document store.
///
/// Each document is JSON under `city:{city}\0{observedAt}:{id}`, where
/// `observedAt` is a fixed-width, order-preserving hex timestamp. A city's
/// documents are therefore one contiguous key range in time order, and
/// window queries and "latest" are range scans. The keyspace is opened on
/// first use so an unreachable path shows up as a failed connectivity check,
/// not a startup error.
pub struct FjallStore {
    path: PathBuf,
    name: String,
    keyspace: OnceCell<fjall::Keyspace>,
}

impl fmt::Debug for FjallStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FjallStore")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("opened", &self.keyspace.initialized())
            .finish()
    }
}

/// `city:{city}\0`. The NUL keeps "Delhi" from matching "Delhi Cantt".
fn city_prefix(city: &str) -> Vec<u8> {
    let mut key = format!("city:{city}").into_bytes();
    key.push(0);
    key
}

/// First key past every key under `city_prefix(city)`.
fn city_prefix_end(city: &str) -> Vec<u8> {
    let mut key = city_prefix(city);
    if let Some(last) = key.last_mut() {
        *last = 1;
    }
    key
}

/// Signed microseconds with the sign bit flipped, so byte order matches time
/// order across the whole `DateTime<Utc>` range.
fn time_component(at: DateTime<Utc>) -> String {
    let sortable = (at.timestamp_micros() as u64) ^ (1 << 63);
    format!("{sortable:016x}")
}

fn doc_key(city: &str, at: DateTime<Utc>, id: &str) -> Vec<u8> {
    let mut key = city_prefix(city);
    key.extend_from_slice(time_component(at).as_bytes());
    key.push(b':');
    key.extend_from_slice(id.as_bytes());
    key
}

fn decode(guard: fjall::Guard) -> Result<StoredRecord, PersistenceError> {
    let (_, value) = guard.into_inner()?;
    Ok(serde_json::from_slice(&value)?)
}

impl FjallStore {
    pub fn new(path: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            path: path.into(),
            name: name.to_string(),
            keyspace: OnceCell::new(),
        }
    }

    async fn keyspace(&self) -> Result<fjall::Keyspace, PersistenceError> {
        let keyspace = self
            .keyspace
            .get_or_try_init(|| open_keyspace(self.path.clone(), self.name.clone()))
            .await?;
        Ok(keyspace.clone())
    }
}

async fn open_keyspace(path: PathBuf, name: String) -> Result<fjall::Keyspace, PersistenceError> {
    tracing::debug!(path = %path.display(), keyspace = %name, "opening document store");

    task::spawn_blocking(move || -> Result<fjall::Keyspace, PersistenceError> {
        let db = fjall::Database::builder(&path).open()?;
        Ok(db.keyspace(name.as_str(), fjall::KeyspaceCreateOptions::default)?)
    })
    .await?
}

#[async_trait]
impl WeatherStore for FjallStore {
    async fn ping(&self) -> Result<(), PersistenceError> {
        let keyspace = self.keyspace().await?;
        task::spawn_blocking(move || keyspace.get(PING_KEY).map(|_| ())).await??;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, record), fields(city = %record.city))]
    async fn insert(&self, record: &WeatherRecord) -> Result<String, PersistenceError> {
        let keyspace = self.keyspace().await?;
        let id = Uuid::new_v4().to_string();
        let key = doc_key(&record.city, record.observed_at, &id);
        let bytes = serde_json::to_vec(&StoredRecord {
            id: id.clone(),
            record: record.clone(),
        })?;

        task::spawn_blocking(move || keyspace.insert(key, bytes)).await??;
        Ok(id)
    }

    async fn find_since(
        &self,
        city: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>, PersistenceError> {
        let keyspace = self.keyspace().await?;
        let mut start = city_prefix(city);
        start.extend_from_slice(time_component(since).as_bytes());
        let end = city_prefix_end(city);

        task::spawn_blocking(move || {
            keyspace
                .range(start..end)
                .rev()
                .map(decode)
                .collect::<Result<Vec<_>, _>>()
        })
        .await?
    }

    /// Reads only the last key in the city's range.
    async fn latest(&self, city: &str) -> Result<Option<StoredRecord>, PersistenceError> {
        let keyspace = self.keyspace().await?;
        let prefix = city_prefix(city);

        task::spawn_blocking(move || keyspace.prefix(prefix).next_back().map(decode).transpose())
            .await?
    }

    async fn check(&self) -> Result<(), PersistenceError> {
        let keyspace = self.keyspace().await?;
        let key = format!("probe:{}", Uuid::new_v4()).into_bytes();

        task::spawn_blocking(move || -> Result<(), PersistenceError> {
            keyspace.insert(key.clone(), b"connection test".to_vec())?;
            if keyspace.get(key.clone())?.is_none() {
                return Err(PersistenceError::Backend(
                    "probe document was not readable after write".into(),
                ));
            }
            keyspace.remove(key)?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(city: &str, hours_ago: i64, temperature: f64) -> WeatherRecord {
        WeatherRecord {
            city: city.into(),
            temperature,
            humidity: 60.0,
            wind_speed: 8.0,
            condition: "Mist".into(),
            air_quality: None,
            observed_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    #[tokio::test]
    async fn insert_then_query_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");

        store.ping().await.unwrap();
        store.insert(&record("Delhi", 48, 1.0)).await.unwrap();
        store.insert(&record("Delhi", 2, 2.0)).await.unwrap();
        store.insert(&record("Delhi", 24 * 10, 3.0)).await.unwrap();
        store.insert(&record("Chennai", 1, 4.0)).await.unwrap();

        let found = store
            .find_since("Delhi", Utc::now() - Duration::days(7))
            .await
            .unwrap();

        let temps: Vec<f64> = found.iter().map(|d| d.record.temperature).collect();
        assert_eq!(temps, vec![2.0, 1.0]);
    }

    #[tokio::test]
    async fn ids_are_unique_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");
        let same = record("Pune", 1, 25.0);

        let a = store.insert(&same).await.unwrap();
        let b = store.insert(&same).await.unwrap();

        assert_ne!(a, b);
        let found = store.find_since("Pune", DateTime::<Utc>::MIN_UTC).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn latest_reads_newest_regardless_of_insert_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");

        store.insert(&record("Delhi", 1, 30.0)).await.unwrap();
        store.insert(&record("Delhi", 72, 10.0)).await.unwrap();
        store.insert(&record("Delhi", 5, 20.0)).await.unwrap();

        let latest = store.latest("Delhi").await.unwrap().unwrap();
        assert_eq!(latest.record.temperature, 30.0);
    }

    #[tokio::test]
    async fn city_prefix_does_not_leak_into_longer_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");

        store.insert(&record("Delhi Cantt", 1, 5.0)).await.unwrap();

        assert!(store.latest("Delhi").await.unwrap().is_none());
        assert!(
            store
                .find_since("Delhi", DateTime::<Utc>::MIN_UTC)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn check_cleans_up_probe() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");

        store.check().await.unwrap();
        assert!(store.latest("Delhi").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_city_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::new(dir.path(), "weather_data");

        let found = store.find_since("Nowhere", Utc::now()).await.unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn time_keys_sort_like_timestamps() {
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let now = Utc::now();

        let keys = [
            time_component(DateTime::<Utc>::MIN_UTC),
            time_component(before_epoch),
            time_component(epoch),
            time_component(now),
        ];
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| k.len() == 16));
    }
}
