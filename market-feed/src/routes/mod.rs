pub mod feed;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use market_shared::middleware::metrics_middleware;
use market_shared::store::Store;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::feed::FeedController;

pub struct AppState<S> {
    pub feed: Arc<FeedController<S>>,
    pub store: Arc<S>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router<S: Store>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(health::health_check::<S>))
        .route("/metrics", get(health::render_metrics::<S>))
        .route("/feed", get(feed::get_feed::<S>))
        .route("/feed/more", post(feed::load_more::<S>))
        .route("/feed/sort", post(feed::toggle_sort::<S>))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
