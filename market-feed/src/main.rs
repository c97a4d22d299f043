use std::sync::Arc;

use market_feed::config::FeedConfig;
use market_feed::feed::FeedController;
use market_feed::routes::{self, AppState};
use market_shared::clients::{RealtimeClient, RestStore};
use market_shared::middleware::init_metrics;
use market_shared::store::Relation;
use market_shared::types::auth::Session;
use market_shared::types::event::ChangeBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    market_shared::telemetry::init_tracing("market-feed");

    let config = FeedConfig::load()?;
    let metrics = init_metrics()?;

    let store = Arc::new(RestStore::new(&config.project_url, &config.api_key, config.request_timeout())?);
    if let Some(token) = &config.access_token {
        let session = Session::from_access_token(token)?;
        tracing::info!(user = %session.user_id, expires_at = %session.expires_at, "reading feed as signed-in user");
        store.set_access_token(Some(session.access_token().to_string()));
    }

    let feed = Arc::new(FeedController::new(store.clone()));
    let changes = ChangeBus::new();

    // Reset the feed on every change to `posts`
    let watcher = feed.clone();
    let rx = changes.subscribe();
    tokio::spawn(async move { watcher.watch(rx).await });

    if config.realtime {
        RealtimeClient::new(&config.project_url, &config.api_key, changes.clone())
            .watch(Relation::Posts)
            .spawn();
    }

    let outcome = feed.load_next_page().await;
    tracing::info!(?outcome, "initial feed page");

    let state = Arc::new(AppState {
        feed,
        store,
        metrics: Some(metrics),
    });
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(addr = %addr, "market-feed starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
