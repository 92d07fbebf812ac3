use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use subway_transit::{TransitContext, TransitError};
use tower_http::cors::{Any, CorsLayer};

type AppState = Arc<TransitContext>;

pub fn create_router(context: AppState) -> Router {
    Router::new()
        .route("/stations/{station}/arrivals", get(station_arrivals))
        .route("/stations/{station}/nearby", get(station_nearby))
        .route("/lines/{line}", get(line_detail))
        .route("/nearby", get(point_nearby))
        .route("/health", get(health))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(context)
}

#[derive(Debug, Deserialize)]
struct RadiusParams {
    radius_km: Option<f64>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PointParams {
    lat: f64,
    lon: f64,
    radius_km: Option<f64>,
    limit: Option<usize>,
}

/// Lookup failures as JSON. Degraded feeds never reach here.
struct ApiError(TransitError);

impl From<TransitError> for ApiError {
    fn from(error: TransitError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            TransitError::StationNotFound(_) | TransitError::LineNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            TransitError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
        };
        let body = json!({ "error": code, "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn station_arrivals(
    State(context): State<AppState>,
    Path(station): Path<String>,
) -> Result<Response, ApiError> {
    let response = context.station_arrivals(&station).await?;
    if response.is_degraded() {
        tracing::info!(station = %response.station.id, "serving degraded arrivals");
    }
    Ok(Json(response).into_response())
}

async fn station_nearby(
    State(context): State<AppState>,
    Path(station): Path<String>,
    Query(params): Query<RadiusParams>,
) -> Result<Response, ApiError> {
    let response = context.nearby_stations(&station, params.radius_km, params.limit)?;
    Ok(Json(response).into_response())
}

async fn line_detail(State(context): State<AppState>, Path(line): Path<String>) -> Result<Response, ApiError> {
    let response = context.line_detail(&line).await?;
    Ok(Json(response).into_response())
}

async fn point_nearby(
    State(context): State<AppState>,
    Query(params): Query<PointParams>,
) -> Result<Response, ApiError> {
    let response = context.nearby_point(params.lat, params.lon, params.radius_km, params.limit)?;
    Ok(Json(response).into_response())
}

async fn health() -> &'static str {
    "OK"
}
