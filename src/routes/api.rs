// Handlers for the JSON API. Same cached catalog as the pages, but failures
// come back as `{"error": ...}` with a status instead of a degraded page.

use axum::{
    extract::{Path, Query, RawQuery, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::RequestState;
use crate::error::{ApiError, ApiResult};
use crate::listing::{load_listing, ListingQuery, ListingState};
use crate::models::Car;
use crate::AppState;

const DEFAULT_TESTIMONIALS: u64 = 10;
const MAX_TESTIMONIALS: u64 = 50;

// --- Response Wrappers ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CarsResponse<'a> {
    items: &'a [Car],
    total_count: u64,
    total_pages: u64,
    page: u64,
    page_size: u64,
}

// --- Request Structs ---

#[derive(Deserialize)]
pub struct TestimonialsQuery {
    limit: Option<u64>,
}

fn ensure_configured(app_state: &AppState) -> ApiResult<()> {
    if app_state.catalog.catalog().is_configured() {
        Ok(())
    } else {
        Err(ApiError::unavailable("catalog store is not configured"))
    }
}

fn resolved<V>(state: RequestState<V>) -> ApiResult<std::sync::Arc<V>> {
    state.into_result().map_err(ApiError::unavailable)
}

// --- API Handlers ---

pub async fn list_cars(State(app_state): State<AppState>, RawQuery(query): RawQuery) -> ApiResult<impl IntoResponse> {
    let query = ListingQuery::from_query(query.as_deref().unwrap_or_default());
    tracing::info!("[HANDLER] /api/cars - Request received: {:?}, page {}", query.filters.criteria(), query.page);
    ensure_configured(&app_state)?;

    let page_size = app_state.settings.page_size;
    let view = load_listing(&app_state.catalog, &query, page_size).await;
    if let ListingState::Error(e) = &view.state {
        tracing::error!("[HANDLER] /api/cars - Listing failed: {}", e);
        return Err(ApiError::unavailable(e.clone()));
    }

    let body = serde_json::to_value(CarsResponse {
        items: view.cars(),
        total_count: view.total_count,
        total_pages: view.pagination.total_pages(),
        page: view.pagination.current(),
        page_size,
    })
    .map_err(|e| ApiError::unavailable(e.to_string()))?;
    Ok(Json(body))
}

pub async fn get_car(State(app_state): State<AppState>, Path(key): Path<String>) -> ApiResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/cars/:key - Request received for '{}'", key);
    ensure_configured(&app_state)?;

    let car = resolved(app_state.catalog.car(&key).await)?;
    match car.as_ref() {
        Some(car) => Ok(Json(car.clone())),
        None => Err(ApiError::not_found(format!("no car with slug or id '{}'", key))),
    }
}

pub async fn filter_options(State(app_state): State<AppState>) -> ApiResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/filter-options - Request received.");
    ensure_configured(&app_state)?;

    let options = resolved(app_state.catalog.filter_options().await)?;
    Ok(Json(options.as_ref().clone()))
}

pub async fn list_testimonials(
    State(app_state): State<AppState>,
    Query(query): Query<TestimonialsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_TESTIMONIALS).clamp(1, MAX_TESTIMONIALS);
    tracing::info!("[HANDLER] /api/testimonials - Request received, limit {}", limit);
    ensure_configured(&app_state)?;

    let testimonials = resolved(app_state.catalog.testimonials(limit).await)?;
    Ok(Json(testimonials.as_ref().clone()))
}

pub async fn health(State(app_state): State<AppState>) -> impl IntoResponse {
    let store = if app_state.catalog.catalog().is_configured() {
        "configured"
    } else {
        "unconfigured"
    };
    Json(json!({ "status": "ok", "store": store }))
}
