use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::ProviderError;

use super::{ACCEPT_HTML, ACCEPT_JSON, SourceClient, build_url};

pub const PROVIDER: &str = "wttr.in";

static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]+));").expect("valid regex")
});

/// The `current_condition[0]` entry of wttr.in's `format=j1` payload.
///
/// wttr.in sends numbers as strings, so the numeric fields are kept as raw
/// JSON and coerced on access.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: Option<Value>,
    humidity: Option<Value>,
    #[serde(rename = "windspeedKmph")]
    windspeed_kmph: Option<Value>,
    #[serde(rename = "weatherDesc", default)]
    weather_desc: Vec<WeatherDesc>,
}

#[derive(Debug, Clone, Deserialize)]
struct WeatherDesc {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct J1Response {
    #[serde(default)]
    current_condition: Vec<Value>,
}

impl CurrentCondition {
    pub fn temperature_c(&self) -> Result<f64, ProviderError> {
        coerce_number("temp_C", self.temp_c.as_ref())
    }

    pub fn humidity(&self) -> Result<f64, ProviderError> {
        coerce_number("humidity", self.humidity.as_ref())
    }

    pub fn wind_speed_kmh(&self) -> Result<f64, ProviderError> {
        coerce_number("windspeedKmph", self.windspeed_kmph.as_ref())
    }

    pub fn condition(&self) -> String {
        self.weather_desc
            .first()
            .and_then(|d| d.value.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Missing fields coerce to zero; present but non-numeric fields are an error.
fn coerce_number(field: &str, value: Option<&Value>) -> Result<f64, ProviderError> {
    let parsed = match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| {
        ProviderError::payload(PROVIDER, format!("field '{field}' is not numeric: {value:?}"))
    })
}

impl SourceClient {
    /// Fetches the machine-readable current conditions for a city name or a
    /// `lat,lon` pair.
    pub async fn fetch_structured_weather(
        &self,
        location: &str,
    ) -> Result<CurrentCondition, ProviderError> {
        let location = location.trim();
        let mut url = build_url(PROVIDER, &self.endpoints.weather, &[location])?;
        url.query_pairs_mut().append_pair("format", "j1");

        let res = self.get(PROVIDER, url, ACCEPT_JSON, self.weather_timeout).await?;
        let parsed: J1Response = res
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let current = parsed
            .current_condition
            .into_iter()
            .next()
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
            .ok_or_else(|| ProviderError::NotFound {
                provider: PROVIDER,
                message: format!("Weather data not found for city: {location}"),
            })?;

        serde_json::from_value(current).map_err(|e| {
            ProviderError::payload(PROVIDER, format!("unexpected current_condition shape: {e}"))
        })
    }

    /// Fetches the human-readable page and returns the text of its `<pre>`
    /// block.
    pub async fn fetch_unstructured_weather(&self, location: &str) -> Result<String, ProviderError> {
        let url = build_url(PROVIDER, &self.endpoints.weather, &[location.trim()])?;

        let res = self.get(PROVIDER, url, ACCEPT_HTML, self.weather_timeout).await?;
        let html = res
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        extract_pre_text(&html)
            .ok_or_else(|| ProviderError::payload(PROVIDER, "Could not find weather data in HTML"))
    }
}

/// Text content of the first `<pre>` element, tags removed and character
/// references decoded.
pub fn extract_pre_text(html: &str) -> Option<String> {
    let inner = PRE_BLOCK.captures(html)?.get(1)?.as_str();
    let stripped = TAG.replace_all(inner, "");
    Some(decode_entities(&stripped))
}

/// Decodes numeric references and the named entities a weather report
/// uses. Anything unrecognised is left as written.
fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str()))
            };

            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "deg" => '°',
        "middot" => '·',
        "rarr" => '→',
        "larr" => '←',
        "uarr" => '↑',
        "darr" => '↓',
        "nearr" => '↗',
        "nwarr" => '↖',
        "searr" => '↘',
        "swarr" => '↙',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        _ => return None,
    };
    Some(c)
}
