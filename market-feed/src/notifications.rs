// Comment activity on the viewer's own listings.
//
// There is no notification relation: activity is derived from the
// denormalized `comments_number` of each listing the viewer authored, one
// entry per comment. Entries are revealed in batches of five.

use std::sync::{Arc, Mutex};

use market_shared::errors::AppResult;
use market_shared::store::{IsValue, Relation, Select, Store};
use market_shared::types::models::{Listing, ListingId};
use market_shared::types::pagination::SortDirection;
use serde::Serialize;
use tracing::debug;

use crate::context::ViewerContext;

pub const NOTIFICATION_BATCH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub listing: ListingId,
    pub message: String,
}

#[derive(Default)]
struct Inbox {
    entries: Vec<Notification>,
    shown: usize,
}

pub struct CommentActivity<S> {
    store: Arc<S>,
    viewer: ViewerContext,
    inbox: Mutex<Inbox>,
}

impl<S: Store> CommentActivity<S> {
    pub fn new(store: Arc<S>, viewer: ViewerContext) -> Self {
        Self {
            store,
            viewer,
            inbox: Mutex::new(Inbox::default()),
        }
    }

    /// Re-read the viewer's listings and rebuild the entries. Shows the
    /// first batch again; returns the total.
    pub async fn refresh(&self) -> AppResult<usize> {
        let query = Select::from(Relation::Posts)
            .eq("author", self.viewer.user_id.to_string())
            .is("parent", IsValue::Null)
            .order("created_at", SortDirection::Desc);
        let listings: Vec<Listing> = self.store.fetch(query).await?;

        let entries: Vec<Notification> = listings
            .iter()
            .flat_map(|l| {
                let count = usize::try_from(l.comments_number).unwrap_or(0);
                std::iter::repeat_with(|| Notification {
                    listing: l.id,
                    message: "Someone commented on your post.".to_string(),
                })
                .take(count)
            })
            .collect();

        let total = entries.len();
        let mut inbox = self.inbox.lock().unwrap();
        inbox.shown = total.min(NOTIFICATION_BATCH);
        inbox.entries = entries;
        debug!(user = %self.viewer.user_id, total, "comment activity refreshed");
        Ok(total)
    }

    pub fn visible(&self) -> Vec<Notification> {
        let inbox = self.inbox.lock().unwrap();
        inbox.entries[..inbox.shown].to_vec()
    }

    /// Reveal the next batch; returns how many are now visible.
    pub fn load_more(&self) -> usize {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.shown = (inbox.shown + NOTIFICATION_BATCH).min(inbox.entries.len());
        inbox.shown
    }

    pub fn has_more(&self) -> bool {
        let inbox = self.inbox.lock().unwrap();
        inbox.shown < inbox.entries.len()
    }

    pub fn total(&self) -> usize {
        self.inbox.lock().unwrap().entries.len()
    }
}
