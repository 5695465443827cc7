//! Fallback orchestration: structured source first, scraped text second,
//! then best-effort air-quality enrichment.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::{fmt::Debug, sync::LazyLock};

use crate::{
    config::ScraperConfig,
    error::{ProviderError, WeatherError},
    model::{AirQuality, WeatherRecord, title_case},
    source::{
        SourceClient,
        air_quality::{self, AirQualitySource},
        wttr,
    },
};

static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\+|-)?(\d+)\s*°C").expect("valid regex"));
static HUMIDITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Humidity[:\s]+(\d+)%").expect("valid regex"));
static WIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Wind[:\s]+(\d+)\s*km/h").expect("valid regex"));
static WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:\s+\w+)*").expect("valid regex"));

/// Weather fields produced by one source, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub condition: String,
}

/// One way of obtaining an [`Observation`]. Attempts are tried in order and
/// the first success wins.
#[async_trait]
pub trait WeatherAttempt: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn attempt(&self, location: &str) -> Result<Observation, ProviderError>;
}

/// wttr.in `format=j1`.
#[derive(Debug, Clone)]
pub struct StructuredAttempt {
    client: SourceClient,
}

impl StructuredAttempt {
    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WeatherAttempt for StructuredAttempt {
    fn name(&self) -> &'static str {
        "structured"
    }

    async fn attempt(&self, location: &str) -> Result<Observation, ProviderError> {
        let current = self.client.fetch_structured_weather(location).await?;

        Ok(Observation {
            temperature: current.temperature_c()?,
            humidity: current.humidity()?,
            wind_speed: current.wind_speed_kmh()?,
            condition: current.condition(),
        })
    }
}

/// wttr.in HTML page, parsed with text patterns.
#[derive(Debug, Clone)]
pub struct TextAttempt {
    client: SourceClient,
}

impl TextAttempt {
    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WeatherAttempt for TextAttempt {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn attempt(&self, location: &str) -> Result<Observation, ProviderError> {
        let text = self.client.fetch_unstructured_weather(location).await?;
        parse_text(&text)
    }
}

/// Extracts an observation from a plain-text weather report.
///
/// Unmatched numbers default to zero. A temperature and humidity that are
/// both exactly zero is treated as a parse failure. The condition is the
/// first run of words in the text and is only a best guess.
pub fn parse_text(text: &str) -> Result<Observation, ProviderError> {
    let temperature = TEMPERATURE
        .captures(text)
        .and_then(|caps| {
            let value: f64 = caps.get(2)?.as_str().parse().ok()?;
            let negative = caps.get(1).is_some_and(|sign| sign.as_str() == "-");
            Some(if negative { -value } else { value })
        })
        .unwrap_or(0.0);

    let humidity = first_number(&HUMIDITY, text);
    let wind_speed = first_number(&WIND, text);

    let condition = WORD_RUN
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    if temperature == 0.0 && humidity == 0.0 {
        return Err(ProviderError::payload(
            wttr::PROVIDER,
            "Could not parse weather data from HTML",
        ));
    }

    Ok(Observation {
        temperature,
        humidity,
        wind_speed,
        condition,
    })
}

fn first_number(pattern: &Regex, text: &str) -> f64 {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Produces [`WeatherRecord`]s by walking the weather attempts in order and
/// enriching the result with air quality.
#[derive(Debug)]
pub struct Scraper {
    attempts: Vec<Box<dyn WeatherAttempt>>,
    air_quality: Vec<Box<dyn AirQualitySource>>,
}

impl Scraper {
    pub fn new(
        attempts: Vec<Box<dyn WeatherAttempt>>,
        air_quality: Vec<Box<dyn AirQualitySource>>,
    ) -> Self {
        Self {
            attempts,
            air_quality,
        }
    }

    /// Structured then text for weather; OpenAQ, WAQI feed, WAQI search for
    /// air quality.
    pub fn from_client(client: SourceClient) -> Self {
        let air_quality = air_quality::default_sources(&client);
        let attempts: Vec<Box<dyn WeatherAttempt>> = vec![
            Box::new(StructuredAttempt::new(client.clone())),
            Box::new(TextAttempt::new(client)),
        ];
        Self::new(attempts, air_quality)
    }

    pub fn from_config(config: &ScraperConfig) -> anyhow::Result<Self> {
        Ok(Self::from_client(SourceClient::new(config)?))
    }

    /// Fetches current weather for `city`.
    ///
    /// Fails only when every weather attempt failed; the error then carries
    /// the first attempt's failure. Air-quality problems only leave the AQI
    /// fields empty.
    #[tracing::instrument(skip(self))]
    pub async fn get_weather(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(WeatherError::InvalidCity);
        }

        let mut first_error: Option<ProviderError> = None;
        let mut observation = None;

        for attempt in &self.attempts {
            match attempt.attempt(city).await {
                Ok(obs) => {
                    tracing::debug!(attempt = attempt.name(), "weather attempt succeeded");
                    observation = Some(obs);
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt.name(), error = %e, "weather attempt failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let Some(obs) = observation else {
            return Err(WeatherError::Scrape {
                city: city.to_string(),
                source: first_error.unwrap_or_else(|| {
                    ProviderError::payload(wttr::PROVIDER, "no weather sources configured")
                }),
            });
        };

        let air_quality = air_quality::fetch_air_quality(&self.air_quality, city)
            .await
            .map(AirQuality::from_index);

        Ok(WeatherRecord {
            city: title_case(city),
            temperature: obs.temperature,
            humidity: obs.humidity,
            wind_speed: obs.wind_speed,
            condition: obs.condition,
            air_quality,
            observed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AqiLevel;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug)]
    struct FakeAttempt {
        name: &'static str,
        result: Result<Observation, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WeatherAttempt for FakeAttempt {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, _location: &str) -> Result<Observation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .map_err(|msg| ProviderError::payload(self.name, msg))
        }
    }

    #[derive(Debug)]
    struct FakeAqi(Option<f64>);

    #[async_trait]
    impl AirQualitySource for FakeAqi {
        fn name(&self) -> &'static str {
            "fake-aqi"
        }

        async fn lookup(&self, _location: &str) -> Result<Option<f64>, ProviderError> {
            match self.0 {
                Some(v) => Ok(Some(v)),
                None => Err(ProviderError::payload("fake-aqi", "unreachable")),
            }
        }
    }

    fn obs(temperature: f64) -> Observation {
        Observation {
            temperature,
            humidity: 55.0,
            wind_speed: 10.0,
            condition: "Clear".into(),
        }
    }

    fn attempt(
        name: &'static str,
        result: Result<Observation, &'static str>,
    ) -> (Box<dyn WeatherAttempt>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let boxed = Box::new(FakeAttempt {
            name,
            result,
            calls: calls.clone(),
        });
        (boxed, calls)
    }

    #[tokio::test]
    async fn structured_success_skips_fallback_and_title_cases_city() {
        let (structured, _) = attempt("structured", Ok(obs(21.0)));
        let (text, text_calls) = attempt("text", Ok(obs(99.0)));
        let scraper = Scraper::new(vec![structured, text], vec![Box::new(FakeAqi(Some(72.0)))]);

        let record = scraper.get_weather("  sAN fRANCISCO ").await.unwrap();

        assert_eq!(record.city, "San Francisco");
        assert_eq!(record.temperature, 21.0);
        assert_eq!(record.air_quality_index(), Some(72));
        assert_eq!(record.air_quality_level(), Some(AqiLevel::Moderate));
        assert_eq!(text_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_text_source() {
        let (structured, _) = attempt("structured", Err("rate limited"));
        let (text, _) = attempt("text", Ok(obs(-3.0)));
        let scraper = Scraper::new(vec![structured, text], vec![]);

        let record = scraper.get_weather("oslo").await.unwrap();

        assert_eq!(record.city, "Oslo");
        assert_eq!(record.temperature, -3.0);
    }

    #[tokio::test]
    async fn total_failure_reports_structured_error() {
        let (structured, _) = attempt("structured", Err("rate limited"));
        let (text, _) = attempt("text", Err("no pre block"));
        let scraper = Scraper::new(vec![structured, text], vec![]);

        let err = scraper.get_weather("Oslo").await.unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("rate limited"), "{msg}");
        assert!(!msg.contains("no pre block"), "{msg}");
        match err {
            WeatherError::Scrape { source, .. } => assert_eq!(source.provider(), "structured"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn aqi_failure_does_not_fail_the_fetch() {
        let (structured, _) = attempt("structured", Ok(obs(18.0)));
        let scraper = Scraper::new(
            vec![structured],
            vec![
                Box::new(FakeAqi(None)),
                Box::new(FakeAqi(None)),
                Box::new(FakeAqi(None)),
            ],
        );

        let record = scraper.get_weather("Lima").await.unwrap();

        assert_eq!(record.air_quality_index(), None);
        assert_eq!(record.air_quality_level(), None);
        assert_eq!(record.humidity, 55.0);
        assert_eq!(record.condition, "Clear");
    }

    #[tokio::test]
    async fn blank_city_is_rejected() {
        let (structured, calls) = attempt("structured", Ok(obs(18.0)));
        let scraper = Scraper::new(vec![structured], vec![]);

        let err = scraper.get_weather("   ").await.unwrap_err();

        assert!(matches!(err, WeatherError::InvalidCity));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parses_text_report() {
        let text = "Partly cloudy\n  +25 °C\nHumidity: 65%\nWind: 15 km/h";
        let obs = parse_text(text).unwrap();

        assert_eq!(obs.temperature, 25.0);
        assert_eq!(obs.humidity, 65.0);
        assert_eq!(obs.wind_speed, 15.0);
        assert_eq!(obs.condition, "Partly cloudy");
    }

    #[test]
    fn parses_negative_temperature() {
        let obs = parse_text("Snow -7 °C").unwrap();
        assert_eq!(obs.temperature, -7.0);
        assert_eq!(obs.humidity, 0.0);
    }

    #[test]
    fn zero_temperature_with_humidity_is_accepted() {
        let obs = parse_text("Fog 0°C humidity: 97%").unwrap();
        assert_eq!(obs.temperature, 0.0);
        assert_eq!(obs.humidity, 97.0);
    }

    #[test]
    fn both_zero_is_a_parse_failure() {
        let err = parse_text("Weather report: nowhere").unwrap_err();
        assert!(err.to_string().contains("Could not parse weather data"));
    }

    #[test]
    fn condition_is_first_word_run() {
        // Digits count as word characters, so this picks up the number.
        let obs = parse_text("-- +12 °C --").unwrap();
        assert_eq!(obs.condition, "12");
    }
}
