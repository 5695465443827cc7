//! Core library for the `weather` scraper.
//!
//! This crate defines:
//! - Configuration loading (file plus environment overrides)
//! - The weather and air-quality sources, and the fallback chain over them
//! - Document storage behind a one-way availability gate
//! - The fetch-and-persist service and the daily scrape job
//!
//! It is used by `weather-cli`, which adds the command line and HTTP API.

pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod schedule;
pub mod scrape;
pub mod service;
pub mod source;
pub mod store;

pub use config::Config;
pub use error::{ErrorKind, PersistenceError, ProviderError, WeatherError};
pub use gate::{Availability, AvailabilityGate, StoreGate};
pub use model::{AirQuality, AqiLevel, WeatherRecord};
pub use schedule::DailyScrape;
pub use scrape::Scraper;
pub use service::{Archive, WeatherService};
pub use store::{FjallStore, MemoryStore, WeatherStore};
