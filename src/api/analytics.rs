//! Statistics API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{ApiError, AppState};
use crate::analytics::{MonthEntry, MonthlyAggregate, QuarterAggregate, WindowReport, YearAggregate};
use crate::models::{EventBatch, MonthKey};

#[derive(Debug, Deserialize)]
pub struct WindowsQueryParams {
    /// Reference month (`YYYY-MM`), defaults to the current month
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQueryParams {
    /// Recompute even when the stored month is still fresh
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct YearsResponse {
    pub years: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct MonthsResponse {
    pub months: Vec<MonthEntry>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    pub aggregate: MonthlyAggregate,
}

/// Month, quarter and rolling 4-month counts for the posted events
pub async fn compute_windows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowsQueryParams>,
    Json(batch): Json<EventBatch>,
) -> Result<Json<WindowReport>, ApiError> {
    let reference = params
        .reference
        .as_deref()
        .map(str::parse::<MonthKey>)
        .transpose()?;

    Ok(Json(state.service.windows(&batch.events, reference)))
}

/// Years that have stored statistics, newest first
pub async fn list_years(State(state): State<Arc<AppState>>) -> Result<Json<YearsResponse>, ApiError> {
    let years = state.service.store().list_available_years().await?;
    Ok(Json(YearsResponse { years }))
}

/// Year totals with the four quarters embedded
pub async fn get_year(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Result<Json<YearAggregate>, ApiError> {
    Ok(Json(state.service.store().get_year(year).await?))
}

/// Stored months of a year, newest first
pub async fn list_months(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Result<Json<MonthsResponse>, ApiError> {
    let months = state.service.store().list_available_months(year).await?;
    Ok(Json(MonthsResponse { months }))
}

pub async fn get_quarter(
    State(state): State<Arc<AppState>>,
    Path((year, quarter)): Path<(i32, u32)>,
) -> Result<Json<QuarterAggregate>, ApiError> {
    Ok(Json(state.service.store().get_quarter(quarter, year).await?))
}

pub async fn get_month(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<MonthlyAggregate>, ApiError> {
    let key: MonthKey = key.parse()?;

    state
        .service
        .store()
        .get_month(key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No statistics stored for {key}")))
}

/// Recompute a month from the posted events if its stored copy is stale
pub async fn refresh_month(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<RefreshQueryParams>,
    Json(batch): Json<EventBatch>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let key: MonthKey = key.parse()?;

    let outcome = state
        .service
        .refresh_month(key, &batch.events, params.force)
        .await?;

    Ok(Json(RefreshResponse {
        refreshed: outcome.was_refreshed(),
        aggregate: outcome.into_aggregate(),
    }))
}
