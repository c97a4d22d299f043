use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use market_shared::errors::{AppError, AppResult};
use market_shared::store::Store;
use market_shared::types::ApiResponse;
use serde::Serialize;

use super::AppState;
use crate::feed::{FeedSnapshot, LoadOutcome};

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub outcome: LoadOutcome,
    pub feed: FeedSnapshot,
}

// --- GET /feed ---

pub async fn get_feed<S: Store>(State(state): State<Arc<AppState<S>>>) -> Json<ApiResponse<FeedSnapshot>> {
    Json(ApiResponse::ok(state.feed.snapshot()))
}

// --- POST /feed/more ---

pub async fn load_more<S: Store>(State(state): State<Arc<AppState<S>>>) -> AppResult<Json<ApiResponse<FeedPage>>> {
    // detached so a dropped request cannot leave the page request half done
    let feed = state.feed.clone();
    let outcome = tokio::spawn(async move { feed.load_next_page().await })
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(ApiResponse::ok(FeedPage {
        outcome,
        feed: state.feed.snapshot(),
    })))
}

// --- POST /feed/sort ---

pub async fn toggle_sort<S: Store>(State(state): State<Arc<AppState<S>>>) -> AppResult<Json<ApiResponse<FeedPage>>> {
    let feed = state.feed.clone();
    let outcome = tokio::spawn(async move { feed.toggle_sort_order().await })
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(ApiResponse::ok(FeedPage {
        outcome,
        feed: state.feed.snapshot(),
    })))
}
