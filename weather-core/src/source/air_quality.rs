//! Best-effort air-quality lookups.
//!
//! No single free AQI feed covers every city, so several are probed in a
//! fixed order and the first positive index wins. A failing source never
//! aborts the chain.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::ProviderError;

use super::{ACCEPT_JSON, SourceClient, build_url};

#[async_trait]
pub trait AirQualitySource: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the provider answered but had no usable value.
    async fn lookup(&self, location: &str) -> Result<Option<f64>, ProviderError>;
}

/// The default probing order: OpenAQ by city, WAQI feed, WAQI keyword search.
pub fn default_sources(client: &SourceClient) -> Vec<Box<dyn AirQualitySource>> {
    vec![
        Box::new(OpenAqLocations::new(client.clone())),
        Box::new(WaqiFeed::new(client.clone())),
        Box::new(WaqiSearch::new(client.clone())),
    ]
}

/// Runs `sources` in order and returns the first positive index, rounded.
pub async fn fetch_air_quality(
    sources: &[Box<dyn AirQualitySource>],
    location: &str,
) -> Option<u32> {
    for source in sources {
        match source.lookup(location).await {
            Ok(Some(value)) if value.is_finite() && value > 0.0 => {
                tracing::debug!(source = source.name(), value, "air quality found");
                return Some(value.round().max(1.0) as u32);
            }
            Ok(_) => tracing::debug!(source = source.name(), "no air quality value"),
            Err(e) => tracing::warn!(source = source.name(), error = %e, "air quality lookup failed"),
        }
    }
    None
}

/// A positive number, or a string holding one.
fn positive_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (n.is_finite() && n > 0.0).then_some(n)
}

/// OpenAQ location lookup by city. OpenAQ reports raw concentrations, so a
/// PM2.5 reading is converted to the US AQI scale.
#[derive(Debug, Clone)]
pub struct OpenAqLocations {
    client: SourceClient,
}

impl OpenAqLocations {
    pub const NAME: &'static str = "openaq";

    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAqResponse {
    #[serde(default)]
    results: Vec<OpenAqLocation>,
}

#[derive(Debug, Deserialize)]
struct OpenAqLocation {
    #[serde(default)]
    parameters: Vec<OpenAqParameter>,
}

#[derive(Debug, Deserialize)]
struct OpenAqParameter {
    parameter: String,
    #[serde(rename = "lastValue")]
    last_value: Option<f64>,
}

#[async_trait]
impl AirQualitySource for OpenAqLocations {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn lookup(&self, location: &str) -> Result<Option<f64>, ProviderError> {
        let mut url = build_url(Self::NAME, &self.client.endpoints.openaq, &["v2", "locations"])?;
        url.query_pairs_mut()
            .append_pair("limit", "1")
            .append_pair("city", location);

        let res = self
            .client
            .get(Self::NAME, url, ACCEPT_JSON, self.client.aqi_timeout)
            .await?;
        let body: OpenAqResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(Self::NAME, e))?;

        let pm25 = body
            .results
            .first()
            .and_then(|loc| loc.parameters.iter().find(|p| p.parameter == "pm25"))
            .and_then(|p| p.last_value)
            .filter(|v| v.is_finite() && *v >= 0.0);

        Ok(pm25.and_then(pm25_to_aqi).map(f64::from))
    }
}

/// US EPA PM2.5 breakpoints (µg/m³, 24h) and their index ranges.
const PM25_BREAKPOINTS: [(f64, f64, u32, u32); 6] = [
    (0.0, 9.0, 0, 50),
    (9.1, 35.4, 51, 100),
    (35.5, 55.4, 101, 150),
    (55.5, 125.4, 151, 200),
    (125.5, 225.4, 201, 300),
    (225.5, 325.4, 301, 500),
];

/// Converts a PM2.5 concentration to a US AQI value. Concentrations above
/// the table are capped at 500.
pub fn pm25_to_aqi(concentration: f64) -> Option<u32> {
    if !concentration.is_finite() || concentration < 0.0 {
        return None;
    }
    let c = (concentration * 10.0).trunc() / 10.0;

    for (c_lo, c_hi, i_lo, i_hi) in PM25_BREAKPOINTS {
        if c <= c_hi {
            let c = c.max(c_lo);
            let index = (f64::from(i_hi - i_lo) / (c_hi - c_lo)) * (c - c_lo) + f64::from(i_lo);
            return Some(index.round() as u32);
        }
    }
    Some(500)
}

/// WAQI city feed (`/feed/{city}/`).
#[derive(Debug, Clone)]
pub struct WaqiFeed {
    client: SourceClient,
}

impl WaqiFeed {
    pub const NAME: &'static str = "waqi-feed";

    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct WaqiFeedResponse {
    status: String,
    data: Option<Value>,
}

#[async_trait]
impl AirQualitySource for WaqiFeed {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn lookup(&self, location: &str) -> Result<Option<f64>, ProviderError> {
        let endpoints = &self.client.endpoints;
        let mut url = build_url(Self::NAME, &endpoints.waqi, &["feed", location, ""])?;
        url.query_pairs_mut().append_pair("token", &endpoints.waqi_token);

        let res = self
            .client
            .get(Self::NAME, url, ACCEPT_JSON, self.client.aqi_timeout)
            .await?;
        let body: WaqiFeedResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(Self::NAME, e))?;

        if body.status != "ok" {
            return Ok(None);
        }

        Ok(body
            .data
            .as_ref()
            .and_then(|d| d.get("aqi"))
            .and_then(positive_number))
    }
}

/// WAQI keyword search (`/search/?keyword=`); takes the first station.
#[derive(Debug, Clone)]
pub struct WaqiSearch {
    client: SourceClient,
}

impl WaqiSearch {
    pub const NAME: &'static str = "waqi-search";

    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct WaqiSearchResponse {
    status: String,
    #[serde(default)]
    data: Vec<Value>,
}

#[async_trait]
impl AirQualitySource for WaqiSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn lookup(&self, location: &str) -> Result<Option<f64>, ProviderError> {
        let endpoints = &self.client.endpoints;
        let mut url = build_url(Self::NAME, &endpoints.waqi, &["search", ""])?;
        url.query_pairs_mut()
            .append_pair("token", &endpoints.waqi_token)
            .append_pair("keyword", location);

        let res = self
            .client
            .get(Self::NAME, url, ACCEPT_JSON, self.client.aqi_timeout)
            .await?;
        let body: WaqiSearchResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(Self::NAME, e))?;

        if body.status != "ok" {
            return Ok(None);
        }

        Ok(body
            .data
            .first()
            .and_then(|station| station.get("aqi"))
            .and_then(positive_number))
    }
}
