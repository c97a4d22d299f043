use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use market_shared::store::{Relation, Select, Store};
use market_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};
use market_shared::types::pagination::PageRange;

use super::AppState;

pub async fn health_check<S: Store>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    let sample = Select::from(Relation::Posts).range(PageRange::new(0, 1));
    let store_check = match state.store.select(sample).await {
        Ok(_) => HealthCheck::new("store", HealthStatus::Healthy),
        Err(e) => HealthCheck::new("store", HealthStatus::Unhealthy).with_message(e.to_string()),
    };

    let snapshot = state.feed.snapshot();
    let feed_check = if snapshot.page == 0 && !snapshot.loading {
        HealthCheck::new("feed", HealthStatus::Degraded).with_message("no page loaded")
    } else {
        HealthCheck::new("feed", HealthStatus::Healthy)
    };

    Json(HealthResponse::healthy("market-feed", env!("CARGO_PKG_VERSION")).with_checks(vec![store_check, feed_check]))
}

pub async fn render_metrics<S: Store>(State(state): State<Arc<AppState<S>>>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedController;
    use market_shared::clients::memory::{MemoryStore, StoreOp};
    use serde_json::json;
    use uuid::Uuid;

    fn state() -> Arc<AppState<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": "#wtb lamp"}));
        Arc::new(AppState {
            feed: Arc::new(FeedController::new(store.clone())),
            store,
            metrics: None,
        })
    }

    #[tokio::test]
    async fn healthy_once_a_page_is_loaded() {
        let state = state();
        let Json(before) = health_check(State(state.clone())).await;
        assert_eq!(before.status, HealthStatus::Degraded);

        state.feed.load_next_page().await;
        let Json(after) = health_check(State(state)).await;
        assert_eq!(after.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn store_failure_is_unhealthy() {
        let state = state();
        state.store.fail_next(StoreOp::Select, Relation::Posts);
        let Json(report) = health_check(State(state)).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        assert_eq!(render_metrics(State(state())).await.unwrap_err(), StatusCode::NOT_FOUND);
    }
}
