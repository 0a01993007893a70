// ============================
// crates/backend-lib/src/handlers/experts.rs
// ============================
//! Expert directory handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use slotbook_common::Expert;

use crate::error::AppError;
use crate::storage::{ExpertPage, ExpertQuery, Storage};
use crate::AppState;

/// Largest page size a client may ask for
pub const MAX_PAGE_SIZE: u32 = 50;

/// Raw query string; numbers stay strings so bad values fall back to defaults
#[derive(Debug, Default, Deserialize)]
pub struct ExpertListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ExpertListParams {
    pub fn into_query(self) -> ExpertQuery {
        let defaults = ExpertQuery::default();
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"));
        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        ExpertQuery {
            page: safe_int(self.page.as_deref(), defaults.page),
            limit: safe_int(self.limit.as_deref(), defaults.limit).min(MAX_PAGE_SIZE),
            category,
            search,
        }
    }
}

/// Positive integer or `fallback`
fn safe_int(value: Option<&str>, fallback: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(fallback)
}

/// `GET /api/experts`
pub async fn list_experts<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ExpertListParams>,
) -> Result<Json<ExpertPage>, AppError> {
    let page = state.storage.list_experts(&params.into_query()).await?;
    Ok(Json(page))
}

/// `GET /api/experts/{id}`
pub async fn get_expert<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(expert_id): Path<String>,
) -> Result<Json<Expert>, AppError> {
    state
        .storage
        .find_expert(&expert_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("expert {expert_id}")))
}
