//! HTTP API.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use weather_core::{
    ErrorKind, WeatherError, WeatherRecord, WeatherService,
    model::title_case,
    service::{DEFAULT_HISTORY_DAYS, MAX_HISTORY_DAYS},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn from_weather(city: &str, err: &WeatherError) -> Self {
        let (status, detail) = match err.kind() {
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, err.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, format!("City '{city}' not found")),
            ErrorKind::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Weather service unavailable. Please try again later.".to_string(),
            ),
            ErrorKind::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error fetching weather: {err}"),
            ),
        };
        Self { status, detail }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    city: Option<String>,
    fresh: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    city: Option<String>,
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    city: String,
    data: Vec<WeatherRecord>,
}

fn required_city(city: Option<&str>) -> Result<&str, ApiError> {
    match city.map(str::trim) {
        Some(city) if !city.is_empty() => Ok(city),
        _ => Err(ApiError::bad_request("City name is required")),
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Weather Data Scraper API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn current_weather(
    State(state): State<AppState>,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Result<Json<WeatherRecord>, ApiError> {
    let Query(query) = query?;
    let city = required_city(query.city.as_deref())?;
    let fresh = query.fresh.unwrap_or(true);

    state
        .service
        .current_weather(city, fresh)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_weather(city, &e))
}

async fn weather_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let city = required_city(query.city.as_deref())?;

    let days = query.days.unwrap_or(i64::from(DEFAULT_HISTORY_DAYS));
    let days = u32::try_from(days)
        .ok()
        .filter(|d| (1..=MAX_HISTORY_DAYS).contains(d))
        .ok_or_else(|| {
            ApiError::bad_request(format!("days must be between 1 and {MAX_HISTORY_DAYS}"))
        })?;

    let data = state.service.history(city, days).await;
    Ok(Json(HistoryResponse {
        city: title_case(city),
        data,
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(service: Arc<WeatherService>, allowed_origins: &[String]) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/weather", get(current_weather))
        .route("/api/weather/history", get(weather_history))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

pub async fn serve(router: Router, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
