//! Fetch-and-persist façade used by the HTTP layer, the CLI and the daily job.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::{
    config::Config,
    error::WeatherError,
    gate::{AvailabilityGate, StoreGate},
    model::{WeatherRecord, title_case},
    scrape::Scraper,
    store::{self, WeatherStore},
};

/// Largest history window accepted by [`WeatherService::history`].
pub const MAX_HISTORY_DAYS: u32 = 30;
pub const DEFAULT_HISTORY_DAYS: u32 = 7;

/// Store access behind the availability gate. Persistence errors never leave
/// this type; they are logged and flip the gate.
#[derive(Debug, Clone)]
pub struct Archive {
    store: Arc<dyn WeatherStore>,
    gate: Arc<dyn AvailabilityGate>,
}

impl Archive {
    pub fn new(store: Arc<dyn WeatherStore>, gate: Arc<dyn AvailabilityGate>) -> Self {
        Self { store, gate }
    }

    /// Gate backed by a probe of `store` itself.
    pub fn with_store_gate(store: Arc<dyn WeatherStore>) -> Self {
        let gate = Arc::new(StoreGate::new(store.clone()));
        Self::new(store, gate)
    }

    pub fn gate(&self) -> &dyn AvailabilityGate {
        self.gate.as_ref()
    }

    /// Returns the new document id, or `None` when nothing was written.
    pub async fn save(&self, record: &WeatherRecord) -> Option<String> {
        if !self.gate.is_available().await {
            tracing::debug!(city = %record.city, "store unavailable, record not saved");
            return None;
        }

        match self.store.insert(record).await {
            Ok(id) => {
                tracing::debug!(city = %record.city, %id, "record saved");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(city = %record.city, error = %e, "failed to save record");
                self.gate.mark_unavailable();
                None
            }
        }
    }

    /// Records for `city` from the trailing `days`, newest first.
    pub async fn history(&self, city: &str, days: u32) -> Vec<WeatherRecord> {
        if !self.gate.is_available().await {
            return Vec::new();
        }

        let city = title_case(city);
        let since = Utc::now() - Duration::days(i64::from(days));

        match self.store.find_since(&city, since).await {
            Ok(docs) => docs.into_iter().map(|d| d.record).collect(),
            Err(e) => {
                tracing::warn!(%city, error = %e, "failed to read history");
                self.gate.mark_unavailable();
                Vec::new()
            }
        }
    }

    pub async fn latest(&self, city: &str) -> Option<WeatherRecord> {
        if !self.gate.is_available().await {
            return None;
        }

        let city = title_case(city);
        match self.store.latest(&city).await {
            Ok(doc) => doc.map(|d| d.record),
            Err(e) => {
                tracing::warn!(%city, error = %e, "failed to read latest record");
                self.gate.mark_unavailable();
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct WeatherService {
    scraper: Scraper,
    archive: Archive,
}

impl WeatherService {
    pub fn new(scraper: Scraper, archive: Archive) -> Self {
        Self { scraper, archive }
    }

    /// Wires the live sources and the configured store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let scraper = Scraper::from_config(&config.scraper)?;
        let archive = Archive::with_store_gate(store::open(config)?);
        Ok(Self::new(scraper, archive))
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Current weather for `city`.
    ///
    /// With `fresh` the sources are always queried and the result is saved.
    /// Without it the newest stored record is returned when there is one.
    #[tracing::instrument(skip(self))]
    pub async fn current_weather(
        &self,
        city: &str,
        fresh: bool,
    ) -> Result<WeatherRecord, WeatherError> {
        if city.trim().is_empty() {
            return Err(WeatherError::InvalidCity);
        }

        if !fresh {
            if let Some(record) = self.archive.latest(city).await {
                tracing::debug!(city = %record.city, "serving stored record");
                return Ok(record);
            }
        }

        let record = self.scraper.get_weather(city).await?;
        self.archive.save(&record).await;
        Ok(record)
    }

    /// `days` is clamped to `1..=MAX_HISTORY_DAYS`.
    pub async fn history(&self, city: &str, days: u32) -> Vec<WeatherRecord> {
        let days = days.clamp(1, MAX_HISTORY_DAYS);
        self.archive.history(city, days).await
    }

    /// Fetch and save one city. `false` only when the fetch itself failed.
    pub async fn scrape_and_save(&self, city: &str) -> bool {
        match self.current_weather(city, true).await {
            Ok(record) => {
                tracing::info!(city = %record.city, temperature = record.temperature, "scraped weather");
                true
            }
            Err(e) => {
                tracing::error!(city, error = %e, "failed to scrape weather");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{PersistenceError, ProviderError},
        gate::Availability,
        scrape::{Observation, WeatherAttempt},
        store::{MemoryStore, StoredRecord},
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingAttempt {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherAttempt for Arc<CountingAttempt> {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn attempt(&self, _location: &str) -> Result<Observation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Observation {
                temperature: 31.0,
                humidity: 40.0,
                wind_speed: 9.0,
                condition: "Haze".into(),
            })
        }
    }

    #[derive(Debug)]
    struct FailingAttempt;

    #[async_trait]
    impl WeatherAttempt for FailingAttempt {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn attempt(&self, location: &str) -> Result<Observation, ProviderError> {
            Err(ProviderError::NotFound {
                provider: "fake",
                message: format!("Weather data not found for city: {location}"),
            })
        }
    }

    /// Store whose writes and reads always fail after a healthy ping.
    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl WeatherStore for BrokenStore {
        async fn ping(&self) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn insert(&self, _record: &WeatherRecord) -> Result<String, PersistenceError> {
            Err(PersistenceError::Backend("disk full".into()))
        }

        async fn find_since(
            &self,
            _city: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<StoredRecord>, PersistenceError> {
            Err(PersistenceError::Backend("disk full".into()))
        }

        async fn check(&self) -> Result<(), PersistenceError> {
            Err(PersistenceError::Backend("disk full".into()))
        }
    }

    fn service_with(
        store: Arc<dyn WeatherStore>,
    ) -> (WeatherService, Arc<CountingAttempt>) {
        let attempt = Arc::new(CountingAttempt::default());
        let scraper = Scraper::new(vec![Box::new(attempt.clone())], Vec::new());
        let service = WeatherService::new(scraper, Archive::with_store_gate(store));
        (service, attempt)
    }

    fn stored(city: &str, days_ago: i64) -> WeatherRecord {
        WeatherRecord {
            city: city.into(),
            temperature: 10.0,
            humidity: 80.0,
            wind_speed: 3.0,
            condition: "Fog".into(),
            air_quality: None,
            observed_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn fresh_fetch_is_saved() {
        let store = Arc::new(MemoryStore::default());
        let (service, _) = service_with(store.clone());

        let record = service.current_weather("new delhi", true).await.unwrap();

        assert_eq!(record.city, "New Delhi");
        let saved = store.latest("New Delhi").await.unwrap().unwrap();
        assert_eq!(saved.record, record);
    }

    #[tokio::test]
    async fn cached_request_serves_latest_record() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&stored("Delhi", 1)).await.unwrap();
        let (service, attempt) = service_with(store);

        let record = service.current_weather("delhi", false).await.unwrap();

        assert_eq!(record.condition, "Fog");
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_request_without_history_fetches() {
        let (service, attempt) = service_with(Arc::new(MemoryStore::default()));

        let record = service.current_weather("Pune", false).await.unwrap();

        assert_eq!(record.condition, "Haze");
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn save_failure_is_swallowed_and_flips_gate() {
        let (service, _) = service_with(Arc::new(BrokenStore));

        let record = service.current_weather("Delhi", true).await;

        assert!(record.is_ok());
        assert_eq!(service.archive().gate().state(), Availability::Unavailable);
        assert!(service.history("Delhi", 7).await.is_empty());
    }

    #[tokio::test]
    async fn history_filters_window_and_title_cases() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&stored("Mumbai", 1)).await.unwrap();
        store.insert(&stored("Mumbai", 3)).await.unwrap();
        store.insert(&stored("Mumbai", 12)).await.unwrap();
        store.insert(&stored("Chennai", 1)).await.unwrap();
        let (service, _) = service_with(store);

        let history = service.history("mumbai", 7).await;

        assert_eq!(history.len(), 2);
        assert!(history[0].observed_at > history[1].observed_at);
        assert!(history.iter().all(|r| r.city == "Mumbai"));
    }

    #[tokio::test]
    async fn history_days_are_clamped() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&stored("Kolkata", 25)).await.unwrap();
        store.insert(&stored("Kolkata", 45)).await.unwrap();
        let (service, _) = service_with(store);

        assert_eq!(service.history("Kolkata", 365).await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_empty_once_gate_is_down_even_with_healthy_store() {
        let store = Arc::new(MemoryStore::default());
        store.insert(&stored("Delhi", 1)).await.unwrap();
        let (service, attempt) = service_with(store.clone());
        assert_eq!(service.history("Delhi", 7).await.len(), 1);

        service.archive().gate().mark_unavailable();

        assert!(service.history("Delhi", 7).await.is_empty());
        assert!(service.archive().latest("Delhi").await.is_none());

        // Cached lookups fall through to a live fetch, which is not saved.
        service.current_weather("Delhi", false).await.unwrap();
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store
                .find_since("Delhi", DateTime::<Utc>::MIN_UTC)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn history_read_failure_is_empty_and_flips_gate() {
        let (service, _) = service_with(Arc::new(BrokenStore));

        assert!(service.history("Delhi", 7).await.is_empty());
        assert_eq!(service.archive().gate().state(), Availability::Unavailable);
    }

    #[tokio::test]
    async fn scrape_and_save_reports_fetch_outcome() {
        let store: Arc<dyn WeatherStore> = Arc::new(MemoryStore::default());
        let (ok, _) = service_with(store.clone());
        let failing = WeatherService::new(
            Scraper::new(vec![Box::new(FailingAttempt)], Vec::new()),
            Archive::with_store_gate(store.clone()),
        );

        assert!(ok.scrape_and_save("Bangalore").await);
        assert!(!failing.scrape_and_save("Atlantis").await);
        assert!(store.latest("Atlantis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_city_is_invalid_without_fetching() {
        let (service, attempt) = service_with(Arc::new(MemoryStore::default()));

        let err = service.current_weather("  ", false).await.unwrap_err();

        assert!(matches!(err, WeatherError::InvalidCity));
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 0);
    }
}
