// Feed controller.
//
// Owns the paginated, sorted list of top-level listings and keeps it fresh
// under three triggers: initial load, load-more, and change notifications
// on the `posts` relation. Changing sort order or receiving a change
// notification resets the session: the list is cleared, the cursor goes
// back to zero, and the first page is fetched again.
//
// Pagination is single-flight. Every reset bumps a session generation; a
// page that arrives for an older generation is dropped, so a slow
// response can never land in a feed that has since been reset.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use market_shared::store::{IsValue, Relation, Select, Store};
use market_shared::types::event::ChangeEvent;
use market_shared::types::models::Listing;
use market_shared::types::pagination::{PageRange, SortDirection, FEED_PAGE_SIZE};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::context::ViewerContext;
use crate::guard::MutationGuard;
use crate::tracker::{PostTracker, TrackerView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// A page arrived and was appended; carries the row count.
    Loaded(usize),
    /// The feed was already exhausted; nothing was requested.
    Exhausted,
    /// Another page request is outstanding.
    Busy,
    /// The feed was reset while the request was outstanding.
    Stale,
    Failed,
}

/// Read-only view of the feed for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub listings: Vec<Listing>,
    pub page: u64,
    pub direction: SortDirection,
    pub exhausted: bool,
    pub loading: bool,
}

#[derive(Debug, Default)]
struct FeedState {
    listings: Vec<Listing>,
    cursor: u64,
    direction: SortDirection,
    exhausted: bool,
    in_flight: bool,
    generation: u64,
}

impl FeedState {
    fn reset(&mut self) {
        self.listings.clear();
        self.cursor = 0;
        self.exhausted = false;
        self.in_flight = false;
        self.generation += 1;
    }
}

pub struct FeedController<S> {
    store: Arc<S>,
    page_size: u64,
    guard: MutationGuard,
    state: Mutex<FeedState>,
}

impl<S: Store> FeedController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_page_size(store, FEED_PAGE_SIZE)
    }

    /// A zero page size is raised to one.
    pub fn with_page_size(store: Arc<S>, page_size: u64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            guard: MutationGuard::new(),
            state: Mutex::new(FeedState::default()),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock().unwrap();
        FeedSnapshot {
            listings: state.listings.clone(),
            page: state.cursor,
            direction: state.direction,
            exhausted: state.exhausted,
            loading: state.in_flight,
        }
    }

    pub fn direction(&self) -> SortDirection {
        self.state.lock().unwrap().direction
    }

    fn page_query(&self, cursor: u64, direction: SortDirection) -> Select {
        Select::from(Relation::Posts)
            .with_author()
            .is("sold", IsValue::False)
            .is("parent", IsValue::Null)
            .order("created_at", direction)
            .range(PageRange::page(cursor, self.page_size))
    }

    pub async fn load_next_page(&self) -> LoadOutcome {
        let (query, generation) = {
            let mut state = self.state.lock().unwrap();
            if state.exhausted {
                return LoadOutcome::Exhausted;
            }
            if state.in_flight {
                debug!(page = state.cursor, "page request already outstanding");
                return LoadOutcome::Busy;
            }
            state.in_flight = true;
            (self.page_query(state.cursor, state.direction), state.generation)
        };

        let started = Instant::now();
        let result = self.store.fetch::<Listing>(query).await;
        histogram!("feed_page_fetch_seconds").record(started.elapsed().as_secs_f64());

        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            debug!(generation, current = state.generation, "dropping page for a reset feed");
            return LoadOutcome::Stale;
        }
        state.in_flight = false;

        match result {
            Ok(rows) => {
                let n = rows.len();
                if (n as u64) < self.page_size {
                    state.exhausted = true;
                }
                state.listings.extend(rows);
                state.cursor += 1;
                counter!("feed_pages_loaded_total").increment(1);
                debug!(page = state.cursor, rows = n, exhausted = state.exhausted, "page loaded");
                LoadOutcome::Loaded(n)
            }
            Err(e) => {
                counter!("feed_page_failures_total").increment(1);
                warn!(page = state.cursor, error = %e, "feed page fetch failed");
                LoadOutcome::Failed
            }
        }
    }

    /// Flip the sort direction and reload from the first page.
    ///
    /// The list is cleared before this returns; the returned future only
    /// fetches the first page of the new order.
    pub fn toggle_sort_order(&self) -> impl Future<Output = LoadOutcome> + Send + '_ {
        {
            let mut state = self.state.lock().unwrap();
            state.direction = state.direction.flipped();
            state.reset();
            info!(direction = %state.direction, "feed sort order toggled");
        }
        self.load_next_page()
    }

    /// Reset and reload in the current direction. Clears synchronously,
    /// like [`FeedController::toggle_sort_order`].
    pub fn on_external_change(&self) -> impl Future<Output = LoadOutcome> + Send + '_ {
        {
            let mut state = self.state.lock().unwrap();
            state.reset();
            debug!(generation = state.generation, "feed reset after external change");
        }
        counter!("feed_resets_total").increment(1);
        self.load_next_page()
    }

    /// Reset the feed on every `posts` change until the channel closes.
    pub async fn watch(&self, mut changes: broadcast::Receiver<ChangeEvent>) {
        loop {
            match changes.recv().await {
                Ok(event) if event.relation == Relation::Posts => {
                    self.on_external_change().await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change watcher lagged");
                    self.on_external_change().await;
                }
                Err(RecvError::Closed) => {
                    info!("change channel closed, feed watcher stopping");
                    return;
                }
            }
        }
    }

    /// One tracker per listing, sharing this feed's store and mutation guard.
    pub fn tracker_for(&self, listing: Listing, viewer: ViewerContext) -> PostTracker<S> {
        PostTracker::new(self.store.clone(), listing, viewer, self.guard.clone(), TrackerView::Feed)
    }

    pub fn trackers(&self, viewer: &ViewerContext) -> Vec<PostTracker<S>> {
        self.snapshot()
            .listings
            .into_iter()
            .map(|listing| self.tracker_for(listing, viewer.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_shared::clients::memory::{MemoryStore, StoreOp};
    use market_shared::types::event::{ChangeBus, ChangeKind};
    use serde_json::json;
    use uuid::Uuid;

    fn seed_listings(store: &MemoryStore, n: usize) {
        for i in 0..n {
            store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": format!("#wtb item {i}")}));
        }
    }

    fn feed_with(n: usize) -> (Arc<MemoryStore>, FeedController<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        seed_listings(&store, n);
        let feed = FeedController::new(store.clone());
        (store, feed)
    }

    fn selects(store: &MemoryStore) -> usize {
        store.calls().iter().filter(|c| c.is(StoreOp::Select, Relation::Posts)).count()
    }

    #[tokio::test]
    async fn five_then_three_rows_exhausts_at_eight() {
        let (_, feed) = feed_with(8);

        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(5));
        assert!(!feed.snapshot().exhausted);

        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(3));
        let snap = feed.snapshot();
        assert!(snap.exhausted);
        assert_eq!(snap.listings.len(), 8);
        assert_eq!(snap.page, 2);
    }

    #[tokio::test]
    async fn exhausted_feed_makes_no_call() {
        let (store, feed) = feed_with(2);
        feed.load_next_page().await;
        assert!(feed.snapshot().exhausted);

        store.clear_calls();
        assert_eq!(feed.load_next_page().await, LoadOutcome::Exhausted);
        assert!(store.calls().is_empty());
        assert_eq!(feed.snapshot().listings.len(), 2);
    }

    #[tokio::test]
    async fn feed_excludes_comments_and_sold_listings() {
        let (store, feed) = feed_with(2);
        store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": "nice", "parent": 1}));
        store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": "#wts lamp", "sold": true}));

        feed.load_next_page().await;
        let snap = feed.snapshot();
        assert_eq!(snap.listings.len(), 2);
        assert!(snap.listings.iter().all(|l| !l.is_comment() && !l.sold));
    }

    #[tokio::test]
    async fn default_order_is_newest_first() {
        let (_, feed) = feed_with(3);
        feed.load_next_page().await;
        let snap = feed.snapshot();
        assert_eq!(snap.direction, SortDirection::Desc);
        assert_eq!(snap.listings[0].content, "#wtb item 2");
    }

    #[tokio::test]
    async fn toggle_sort_order_clears_before_the_page_arrives() {
        let (store, feed) = feed_with(7);
        feed.load_next_page().await;
        assert_eq!(feed.snapshot().listings.len(), 5);

        store.pause_selects();
        let reload = feed.toggle_sort_order();
        let snap = feed.snapshot();
        assert!(snap.listings.is_empty());
        assert_eq!(snap.page, 0);
        assert!(!snap.exhausted);
        assert_eq!(snap.direction, SortDirection::Asc);

        store.resume_selects();
        assert_eq!(reload.await, LoadOutcome::Loaded(5));
        assert_eq!(feed.snapshot().listings[0].content, "#wtb item 0");
    }

    #[tokio::test]
    async fn concurrent_triggers_are_single_flight() {
        let (store, feed) = feed_with(12);
        store.pause_selects();

        let first = feed.load_next_page();
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        assert_eq!(feed.load_next_page().await, LoadOutcome::Busy);
        assert_eq!(feed.load_next_page().await, LoadOutcome::Busy);
        assert!(feed.snapshot().loading);

        store.resume_selects();
        assert_eq!(first.await, LoadOutcome::Loaded(5));
        assert_eq!(selects(&store), 1);
        assert_eq!(feed.snapshot().page, 1);
    }

    #[tokio::test]
    async fn page_from_before_a_reset_is_dropped() {
        let (store, feed) = feed_with(6);
        store.pause_selects();

        let stale = feed.load_next_page();
        tokio::pin!(stale);
        assert!(futures::poll!(stale.as_mut()).is_pending());

        let fresh = feed.on_external_change();
        tokio::pin!(fresh);
        assert!(futures::poll!(fresh.as_mut()).is_pending());

        store.resume_selects();
        assert_eq!(stale.await, LoadOutcome::Stale);
        assert_eq!(fresh.await, LoadOutcome::Loaded(5));
        let snap = feed.snapshot();
        assert_eq!(snap.listings.len(), 5);
        assert_eq!(snap.page, 1);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_state_and_allows_retry() {
        let (store, feed) = feed_with(8);
        feed.load_next_page().await;

        store.fail_next(StoreOp::Select, Relation::Posts);
        assert_eq!(feed.load_next_page().await, LoadOutcome::Failed);
        let snap = feed.snapshot();
        assert_eq!(snap.listings.len(), 5);
        assert_eq!(snap.page, 1);
        assert!(!snap.exhausted);

        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(3));
    }

    #[tokio::test]
    async fn external_change_keeps_direction() {
        let (store, feed) = feed_with(3);
        feed.toggle_sort_order().await;
        store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": "#wts desk"}));

        feed.on_external_change().await;
        let snap = feed.snapshot();
        assert_eq!(snap.direction, SortDirection::Asc);
        assert_eq!(snap.listings.len(), 4);
    }

    #[tokio::test]
    async fn watcher_resets_on_post_changes() {
        let bus = ChangeBus::new();
        let store = Arc::new(MemoryStore::new().with_changes(bus.clone()));
        seed_listings(&store, 2);
        let feed = Arc::new(FeedController::new(store.clone()));
        feed.load_next_page().await;

        let rx = bus.subscribe();
        let watcher = {
            let feed = feed.clone();
            tokio::spawn(async move { feed.watch(rx).await })
        };

        store
            .insert(Relation::Posts, json!({"author": Uuid::nil(), "content": "#wtb bike"}))
            .await
            .unwrap();
        // likes do not reset the feed
        bus.emit(ChangeEvent::new(Relation::Likes, ChangeKind::Insert));

        for _ in 0..50 {
            if feed.snapshot().listings.len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(feed.snapshot().listings.len(), 3);
        assert_eq!(feed.snapshot().listings[0].content, "#wtb bike");

        watcher.abort();
    }

    #[tokio::test]
    async fn watcher_stops_when_channel_closes() {
        let (_, feed) = feed_with(1);
        let bus = ChangeBus::new();
        let rx = bus.subscribe();
        drop(bus);
        feed.watch(rx).await;
        assert!(feed.snapshot().listings.is_empty());
    }

    #[tokio::test]
    async fn zero_page_size_still_reaches_the_end() {
        let store = Arc::new(MemoryStore::new());
        seed_listings(&store, 2);
        let feed = FeedController::with_page_size(store.clone(), 0);

        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(1));
        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(1));
        assert_eq!(feed.load_next_page().await, LoadOutcome::Loaded(0));
        assert!(feed.snapshot().exhausted);
        assert_eq!(feed.load_next_page().await, LoadOutcome::Exhausted);
        assert_eq!(selects(&store), 3);
    }
}
