use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use leakscan_core::persistence::FindingFilter;
use leakscan_core::types::FindingRecord;

use crate::errors::AppResult;
use crate::infra::app_state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub bucket: Option<String>,
    /// Key prefix filter.
    pub prefix: Option<String>,
    /// Opaque cursor from a previous page's `next_cursor`.
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResultsPage {
    pub items: Vec<FindingRecord>,
    pub next_cursor: Option<i64>,
}

/// Findings in ascending id order. Chain `next_cursor` to walk the full set;
/// masked matches are the only form the raw values ever reach.
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> AppResult<Json<ResultsPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let page = state
        .findings
        .list_findings(&FindingFilter {
            bucket: query.bucket,
            key_prefix: query.prefix,
            cursor: query.cursor,
            limit,
        })
        .await?;

    Ok(Json(ResultsPage {
        items: page.items,
        next_cursor: page.next_cursor,
    }))
}
