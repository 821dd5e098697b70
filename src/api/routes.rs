use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analytics::StatsService;

use super::analytics::{
    compute_windows, get_month, get_quarter, get_year, list_months, list_years, refresh_month,
};
use super::handlers::{health_check, AppState};

pub fn create_api_router(service: Arc<StatsService>) -> Router {
    let state = Arc::new(AppState { service });

    let stats_routes = Router::new()
        .route("/windows", post(compute_windows))
        .route("/years", get(list_years))
        .route("/years/{year}", get(get_year))
        .route("/years/{year}/months", get(list_months))
        .route("/years/{year}/quarters/{quarter}", get(get_quarter))
        .route("/months/{key}", get(get_month))
        .route("/months/{key}/refresh", post(refresh_month))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/stats", stats_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
