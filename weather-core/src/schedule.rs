//! Daily scrape of the configured city list.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::{str::FromStr, sync::Arc};
use tokio::sync::watch;

use crate::{config::ScheduleConfig, service::WeatherService};

/// The `cron` crate wants six fields (with seconds). A standard five-field
/// expression gets `0 ` prepended.
pub fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Result of scraping one city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityOutcome {
    pub city: String,
    pub saved: bool,
}

#[derive(Debug)]
pub struct DailyScrape {
    service: Arc<WeatherService>,
    cities: Vec<String>,
    schedule: cron::Schedule,
}

impl DailyScrape {
    pub fn new(service: Arc<WeatherService>, config: &ScheduleConfig) -> Result<Self> {
        let schedule = cron::Schedule::from_str(&normalize_cron_expr(&config.cron))
            .map_err(|e| anyhow!("Invalid cron expression '{}': {e}", config.cron))?;

        Ok(Self {
            service,
            cities: config.cities.clone(),
            schedule,
        })
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Next occurrence strictly after `after`, in UTC.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Scrapes every city once, one after another. A failing city is logged
    /// and the rest still run.
    pub async fn run_once(&self) -> Vec<CityOutcome> {
        self.run_for(&self.cities).await
    }

    pub async fn run_for(&self, cities: &[String]) -> Vec<CityOutcome> {
        tracing::info!(count = cities.len(), "starting scheduled weather scrape");

        let mut outcomes = Vec::with_capacity(cities.len());
        for city in cities {
            let saved = self.service.scrape_and_save(city).await;
            outcomes.push(CityOutcome {
                city: city.clone(),
                saved,
            });
        }

        let ok = outcomes.iter().filter(|o| o.saved).count();
        tracing::info!(ok, failed = outcomes.len() - ok, "scheduled weather scrape finished");
        outcomes
    }

    /// Sleeps until each occurrence and runs the scrape, until `shutdown`
    /// becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let Some(next) = self.next_run_after(now) else {
                tracing::warn!("schedule has no future occurrence, stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, "next scheduled scrape");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("daily scrape stopped");
    }
}
