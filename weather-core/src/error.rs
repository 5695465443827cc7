use reqwest::StatusCode;
use thiserror::Error;

/// A single outbound lookup against one provider failed or returned
/// something unusable.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: network error: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: location not found: {message}")]
    NotFound {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{provider}: {message}")]
    Payload {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn payload(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Payload {
            provider,
            message: message.into(),
        }
    }

    /// Maps a reqwest failure onto the provider error kinds.
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::payload(provider, format!("invalid response body: {err}"));
        }
        Self::Network {
            provider,
            source: err,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Network { provider, .. }
            | ProviderError::NotFound { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Payload { provider, .. } => provider,
        }
    }
}

/// Coarse classification a transport layer can map onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unavailable,
    Internal,
}

/// Failure surfaced to callers of the scraper.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("City name is required")]
    InvalidCity,

    /// Every weather source was exhausted. `source` is the structured
    /// source's error, which is the more diagnostic one.
    #[error("Failed to scrape weather for {city}: {source}")]
    Scrape {
        city: String,
        #[source]
        source: ProviderError,
    },
}

impl WeatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WeatherError::InvalidCity => ErrorKind::InvalidInput,
            WeatherError::Scrape { source, .. } => match source {
                ProviderError::NotFound { .. } => ErrorKind::NotFound,
                ProviderError::Network { .. } => ErrorKind::Unavailable,
                ProviderError::Status { status, .. } if status.is_server_error() => {
                    ErrorKind::Unavailable
                }
                _ => ErrorKind::Internal,
            },
        }
    }
}

/// Storage read or write failed. Never surfaced by the fetch path; it only
/// flips the availability gate.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to encode or decode document: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<fjall::Error> for PersistenceError {
    fn from(err: fjall::Error) -> Self {
        PersistenceError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape(source: ProviderError) -> WeatherError {
        WeatherError::Scrape {
            city: "Atlantis".into(),
            source,
        }
    }

    #[test]
    fn not_found_is_classified() {
        let err = scrape(ProviderError::NotFound {
            provider: "wttr.in",
            message: "status 404 Not Found".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn upstream_server_error_is_unavailable() {
        let err = scrape(ProviderError::Status {
            provider: "wttr.in",
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        });
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn payload_errors_are_internal() {
        let err = scrape(ProviderError::payload("wttr.in", "no current_condition"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().starts_with("Failed to scrape weather for Atlantis"));
    }

    #[test]
    fn blank_city_is_invalid_input() {
        assert_eq!(WeatherError::InvalidCity.kind(), ErrorKind::InvalidInput);
    }
}
