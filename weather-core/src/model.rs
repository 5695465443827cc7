use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One weather observation for a city, as produced by the scraper.
///
/// Built fresh on every fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    pub city: String,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent, 0-100 by convention.
    pub humidity: f64,
    /// km/h.
    pub wind_speed: f64,
    pub condition: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub air_quality: Option<AirQuality>,
    /// Capture time, not provider time.
    pub observed_at: DateTime<Utc>,
}

impl WeatherRecord {
    pub fn air_quality_index(&self) -> Option<u32> {
        self.air_quality.map(|aq| aq.index)
    }

    pub fn air_quality_level(&self) -> Option<AqiLevel> {
        self.air_quality.map(|aq| aq.level)
    }
}

/// Index and its band, always travelling together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirQuality {
    #[serde(rename = "airQualityIndex")]
    pub index: u32,
    #[serde(rename = "airQualityLevel")]
    pub level: AqiLevel,
}

impl AirQuality {
    pub fn from_index(index: u32) -> Self {
        Self {
            index,
            level: AqiLevel::from_index(index),
        }
    }
}

/// US AQI severity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AqiLevel {
    Good,
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    Hazardous,
}

impl AqiLevel {
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => AqiLevel::Good,
            51..=100 => AqiLevel::Moderate,
            101..=150 => AqiLevel::UnhealthyForSensitiveGroups,
            151..=200 => AqiLevel::Unhealthy,
            201..=300 => AqiLevel::VeryUnhealthy,
            _ => AqiLevel::Hazardous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AqiLevel::Good => "Good",
            AqiLevel::Moderate => "Moderate",
            AqiLevel::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiLevel::Unhealthy => "Unhealthy",
            AqiLevel::VeryUnhealthy => "Very Unhealthy",
            AqiLevel::Hazardous => "Hazardous",
        }
    }
}

impl std::fmt::Display for AqiLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a user-supplied city name for display and storage.
///
/// Every alphabetic run starts upper-case and continues lower-case, so
/// `"new YORK"` becomes `"New York"` and `"o'neill"` becomes `"O'Neill"`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;

    for ch in input.trim().chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }

    out
}
