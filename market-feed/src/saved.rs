use std::sync::{Arc, Mutex};

use market_shared::errors::AppResult;
use market_shared::store::{Relation, Select, Store};
use market_shared::types::models::{Listing, SavedMark};
use market_shared::types::pagination::SortDirection;
use tracing::debug;

use crate::context::ViewerContext;
use crate::guard::MutationGuard;
use crate::tracker::{PostTracker, TrackerView};

/// The viewer's saved listings, oldest first.
pub struct SavedView<S> {
    store: Arc<S>,
    viewer: ViewerContext,
    guard: MutationGuard,
    listings: Mutex<Vec<Listing>>,
}

impl<S: Store> SavedView<S> {
    pub fn new(store: Arc<S>, viewer: ViewerContext) -> Self {
        Self {
            store,
            viewer,
            guard: MutationGuard::new(),
            listings: Mutex::new(Vec::new()),
        }
    }

    pub fn listings(&self) -> Vec<Listing> {
        self.listings.lock().unwrap().clone()
    }

    pub async fn reload(&self) -> AppResult<usize> {
        let marks: Vec<SavedMark> = self
            .store
            .fetch(Select::from(Relation::SavedPosts).eq("user_id", self.viewer.user_id.to_string()))
            .await?;

        let listings = if marks.is_empty() {
            Vec::new()
        } else {
            let query = Select::from(Relation::Posts)
                .with_author()
                .one_of("id", marks.iter().map(|m| m.post_id))
                .order("created_at", SortDirection::Asc);
            self.store.fetch::<Listing>(query).await?
        };

        let n = listings.len();
        *self.listings.lock().unwrap() = listings;
        debug!(user = %self.viewer.user_id, saved = n, "saved view reloaded");
        Ok(n)
    }

    /// Trackers report `reload_view` on every save toggle made from here.
    pub fn trackers(&self) -> Vec<PostTracker<S>> {
        self.listings()
            .into_iter()
            .map(|listing| {
                PostTracker::new(self.store.clone(), listing, self.viewer.clone(), self.guard.clone(), TrackerView::Saved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_shared::clients::memory::{MemoryStore, StoreOp};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn shows_only_the_viewers_saved_listings() {
        let store = Arc::new(MemoryStore::new());
        let me = ViewerContext::new(Uuid::new_v4());
        let other = Uuid::new_v4();
        let ids: Vec<i64> = (0..3)
            .map(|i| store.seed(Relation::Posts, json!({"author": other, "content": format!("#wts thing {i}")}))["id"].as_i64().unwrap())
            .collect();
        store.seed(Relation::SavedPosts, json!({"post_id": ids[2], "user_id": me.user_id}));
        store.seed(Relation::SavedPosts, json!({"post_id": ids[0], "user_id": me.user_id}));
        store.seed(Relation::SavedPosts, json!({"post_id": ids[1], "user_id": other}));

        let view = SavedView::new(store.clone(), me);
        assert_eq!(view.reload().await.unwrap(), 2);
        let listings = view.listings();
        assert_eq!(listings[0].id, ids[0]);
        assert_eq!(listings[1].id, ids[2]);
    }

    #[tokio::test]
    async fn nothing_saved_skips_the_listing_query() {
        let store = Arc::new(MemoryStore::new());
        let view = SavedView::new(store.clone(), ViewerContext::new(Uuid::new_v4()));

        assert_eq!(view.reload().await.unwrap(), 0);
        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is(StoreOp::Select, Relation::SavedPosts));
    }

    #[tokio::test]
    async fn unsave_from_here_requests_reload() {
        let store = Arc::new(MemoryStore::new());
        let me = ViewerContext::new(Uuid::new_v4());
        let row = store.seed(Relation::Posts, json!({"author": Uuid::nil(), "content": "#wtb lamp"}));
        store.seed(Relation::SavedPosts, json!({"post_id": row["id"], "user_id": me.user_id}));

        let view = SavedView::new(store.clone(), me);
        view.reload().await.unwrap();
        let trackers = view.trackers();
        trackers[0].fetch_saved_state().await.unwrap();

        let outcome = trackers[0].toggle_saved().await.unwrap();
        assert!(!outcome.saved);
        assert!(outcome.reload_view);
        assert_eq!(view.reload().await.unwrap(), 0);
    }
}
