//! Outbound lookups against the weather and air-quality providers.
//!
//! Nothing in here knows about storage or routing: each call performs one
//! request and returns a provider-shaped payload or a [`ProviderError`].

use anyhow::Context;
use reqwest::{Client, Response, StatusCode, Url, header};
use std::time::Duration;

use crate::{config::ScraperConfig, error::ProviderError};

pub mod air_quality;
pub mod wttr;

pub use air_quality::{AirQualitySource, OpenAqLocations, WaqiFeed, WaqiSearch};
pub use wttr::CurrentCondition;

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Base URLs and credentials for every provider the client talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub weather: String,
    pub openaq: String,
    pub waqi: String,
    pub waqi_token: String,
}

/// Shared HTTP plumbing for all providers.
#[derive(Debug, Clone)]
pub struct SourceClient {
    http: Client,
    endpoints: Endpoints,
    weather_timeout: Duration,
    aqi_timeout: Duration,
}

impl SourceClient {
    pub fn new(config: &ScraperConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoints: Endpoints {
                weather: config.weather_base_url.clone(),
                openaq: config.openaq_base_url.clone(),
                waqi: config.waqi_base_url.clone(),
                waqi_token: config.waqi_token.clone(),
            },
            weather_timeout: Duration::from_secs(config.weather_timeout_secs),
            aqi_timeout: Duration::from_secs(config.aqi_timeout_secs),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Issues a GET and turns transport failures and non-2xx statuses into
    /// [`ProviderError`]s. A 404 is reported as "not found".
    pub(crate) async fn get(
        &self,
        provider: &'static str,
        url: Url,
        accept: &str,
        timeout: Duration,
    ) -> Result<Response, ProviderError> {
        tracing::debug!(provider, %url, "sending provider request");

        let res = self
            .http
            .get(url)
            .header(header::ACCEPT, accept)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                provider,
                message: format!("status {status}: {}", truncate_body(&body)),
            });
        }

        Err(ProviderError::Status {
            provider,
            status,
            body: truncate_body(&body),
        })
    }
}

/// Appends `segments` to `base` as percent-encoded path segments.
pub(crate) fn build_url(
    provider: &'static str,
    base: &str,
    segments: &[&str],
) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base)
        .map_err(|e| ProviderError::payload(provider, format!("invalid base URL '{base}': {e}")))?;

    url.path_segments_mut()
        .map_err(|_| ProviderError::payload(provider, format!("base URL '{base}' cannot have a path")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
