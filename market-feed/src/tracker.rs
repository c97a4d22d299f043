//! Per-listing interaction state: likes, comments and the viewer's saved
//! mark.
//!
//! Every mutation follows the same shape. It waits its turn on the
//! [`MutationGuard`] for its (listing, kind), snapshots local state,
//! applies the change optimistically, writes to the store, and then
//! refetches the authoritative rows. A failed write restores the snapshot.

use std::sync::{Arc, Mutex};

use market_shared::errors::{AppError, AppResult, ErrorCode};
use market_shared::store::{decode_rows, Filter, Relation, Select, Store};
use market_shared::types::models::{Like, Listing, ListingId, NewLike, NewListing, SavedMark};
use market_shared::types::pagination::SortDirection;
use market_shared::validation::{self, MAX_COMMENT_PHOTOS};
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::context::ViewerContext;
use crate::guard::{MutationGuard, MutationKind};
use crate::notice::Notice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPhase {
    Idle,
    Loading,
    Ready,
}

/// Where the tracker is rendered. Unsaving from the saved-items view
/// removes the listing from that view, so the view has to reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerView {
    Feed,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub saved: bool,
    pub reload_view: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub phase: TrackerPhase,
    pub listing: Listing,
    pub like_count: usize,
    pub liked: bool,
    pub saved: bool,
    pub comments: Vec<Listing>,
}

struct TrackerState {
    phase: TrackerPhase,
    listing: Listing,
    likes: Vec<Like>,
    comments: Vec<Listing>,
    saved: bool,
    draft: String,
    notice: Option<Notice>,
}

pub struct PostTracker<S> {
    store: Arc<S>,
    id: ListingId,
    viewer: ViewerContext,
    guard: MutationGuard,
    view: TrackerView,
    state: Mutex<TrackerState>,
}

impl<S: Store> PostTracker<S> {
    pub fn new(store: Arc<S>, listing: Listing, viewer: ViewerContext, guard: MutationGuard, view: TrackerView) -> Self {
        Self {
            store,
            id: listing.id,
            viewer,
            guard,
            view,
            state: Mutex::new(TrackerState {
                phase: TrackerPhase::Idle,
                listing,
                likes: Vec::new(),
                comments: Vec::new(),
                saved: false,
                draft: String::new(),
                notice: None,
            }),
        }
    }

    pub fn id(&self) -> ListingId {
        self.id
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.lock().unwrap().phase
    }

    pub fn listing(&self) -> Listing {
        self.state.lock().unwrap().listing.clone()
    }

    pub fn likes(&self) -> Vec<Like> {
        self.state.lock().unwrap().likes.clone()
    }

    pub fn liked_by_viewer(&self) -> bool {
        let me = self.viewer.user_id;
        self.state.lock().unwrap().likes.iter().any(|l| l.user_id == me)
    }

    pub fn comments(&self) -> Vec<Listing> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn is_saved(&self) -> bool {
        self.state.lock().unwrap().saved
    }

    pub fn draft(&self) -> String {
        self.state.lock().unwrap().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state.lock().unwrap().draft = text.into();
    }

    /// The save confirmation, while it is still on screen.
    pub fn notice(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        match &state.notice {
            Some(n) if n.is_visible() => Some(n.message.clone()),
            Some(_) => {
                state.notice = None;
                None
            }
            None => None,
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let me = self.viewer.user_id;
        let state = self.state.lock().unwrap();
        TrackerSnapshot {
            phase: state.phase,
            listing: state.listing.clone(),
            like_count: state.likes.len(),
            liked: state.likes.iter().any(|l| l.user_id == me),
            saved: state.saved,
            comments: state.comments.clone(),
        }
    }

    fn set_phase(&self, phase: TrackerPhase) {
        self.state.lock().unwrap().phase = phase;
    }

    fn logged<T>(&self, op: &'static str, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            warn!(listing = self.id, op, error = %e, "listing interaction failed");
        }
        result
    }

    /// Initial fetch of likes, comments and saved state.
    pub async fn load(&self) -> AppResult<()> {
        self.set_phase(TrackerPhase::Loading);
        let result = tokio::try_join!(self.fetch_likes(), self.fetch_comments(), self.fetch_saved_state());
        self.set_phase(TrackerPhase::Ready);
        result.map(|_| ())
    }

    pub async fn fetch_likes(&self) -> AppResult<usize> {
        let query = Select::from(Relation::Likes).eq("post_id", self.id);
        let likes: Vec<Like> = self.logged("fetch_likes", self.store.fetch(query).await)?;

        let n = likes.len();
        self.state.lock().unwrap().likes = likes;
        Ok(n)
    }

    pub async fn fetch_comments(&self) -> AppResult<usize> {
        let query = Select::from(Relation::Posts)
            .with_author()
            .eq("parent", self.id)
            .order("created_at", SortDirection::Asc);
        let comments: Vec<Listing> = self.logged("fetch_comments", self.store.fetch(query).await)?;

        let n = comments.len();
        self.state.lock().unwrap().comments = comments;
        Ok(n)
    }

    pub async fn fetch_saved_state(&self) -> AppResult<bool> {
        let query = Select::from(Relation::SavedPosts)
            .eq("post_id", self.id)
            .eq("user_id", self.viewer.user_id.to_string());
        let marks: Vec<SavedMark> = self.logged("fetch_saved_state", self.store.fetch(query).await)?;

        let saved = !marks.is_empty();
        self.state.lock().unwrap().saved = saved;
        Ok(saved)
    }

    fn own_row(&self) -> Vec<Filter> {
        vec![
            Filter::eq("post_id", self.id),
            Filter::eq("user_id", self.viewer.user_id.to_string()),
        ]
    }

    /// Like or unlike as the viewer. Returns whether the viewer now likes
    /// the listing.
    pub async fn toggle_like(&self) -> AppResult<bool> {
        let _turn = self.guard.acquire(self.id, MutationKind::Like).await;
        let me = self.viewer.user_id;

        let (snapshot, was_liked) = {
            let mut state = self.state.lock().unwrap();
            let snapshot = state.likes.clone();
            let was_liked = state.likes.iter().any(|l| l.user_id == me);
            if was_liked {
                state.likes.retain(|l| l.user_id != me);
            } else {
                state.likes.push(Like::placeholder(self.id, me));
            }
            (snapshot, was_liked)
        };

        let write = if was_liked {
            self.store
                .delete(Relation::Likes, self.own_row())
                .await
                .map(drop)
                .map_err(AppError::from)
        } else {
            let like = NewLike { post_id: self.id, user_id: me };
            self.store.insert_row(Relation::Likes, &like).await.map(drop)
        };

        if let Err(e) = write {
            self.state.lock().unwrap().likes = snapshot;
            return self.logged("toggle_like", Err(e));
        }

        counter!("listing_like_toggles_total").increment(1);
        self.fetch_likes().await?;
        debug!(listing = self.id, liked = !was_liked, "like toggled");
        Ok(!was_liked)
    }

    /// Save or unsave for the viewer and raise the confirmation notice.
    pub async fn toggle_saved(&self) -> AppResult<SaveOutcome> {
        let _turn = self.guard.acquire(self.id, MutationKind::Save).await;

        let was_saved = {
            let mut state = self.state.lock().unwrap();
            let was_saved = state.saved;
            state.saved = !was_saved;
            was_saved
        };

        let write = if was_saved {
            self.store
                .delete(Relation::SavedPosts, self.own_row())
                .await
                .map(drop)
                .map_err(AppError::from)
        } else {
            let mark = SavedMark {
                post_id: self.id,
                user_id: self.viewer.user_id,
            };
            self.store.insert_row(Relation::SavedPosts, &mark).await.map(drop)
        };

        if let Err(e) = write {
            self.state.lock().unwrap().saved = was_saved;
            return self.logged("toggle_saved", Err(e));
        }

        let message = if was_saved { "Post removed from saved" } else { "Post saved" };
        self.state.lock().unwrap().notice = Some(Notice::new(message));

        let saved = self.fetch_saved_state().await?;
        Ok(SaveOutcome {
            saved,
            reload_view: self.view == TrackerView::Saved,
        })
    }

    /// Comment as the viewer. `photos` are URLs of already uploaded files.
    pub async fn post_comment(&self, text: &str, photos: Vec<String>) -> AppResult<Listing> {
        if self.state.lock().unwrap().listing.sold {
            return Err(AppError::new(ErrorCode::ListingSold, "exchange completed, comments are closed"));
        }
        let text = validation::check_comment_text(text)?;
        self.viewer.require_display_name()?;
        validation::check_photo_count(photos.len(), MAX_COMMENT_PHOTOS)?;

        let _turn = self.guard.acquire(self.id, MutationKind::Comment).await;

        let comment = NewListing {
            author: self.viewer.user_id,
            content: text.to_string(),
            photos,
            parent: Some(self.id),
        };
        let rows = self.logged("post_comment", self.store.insert_row(Relation::Posts, &comment).await)?;
        let stored = decode_rows::<Listing>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("store returned no row for the new comment"))?;

        self.fetch_comments().await?;
        self.state.lock().unwrap().draft.clear();
        self.sync_comment_count().await?;

        info!(listing = self.id, comment = stored.id, "comment posted");
        Ok(stored)
    }

    pub async fn delete_comment(&self, comment_id: ListingId) -> AppResult<()> {
        let _turn = self.guard.acquire(self.id, MutationKind::Comment).await;

        let author = {
            let state = self.state.lock().unwrap();
            state.comments.iter().find(|c| c.id == comment_id).map(|c| c.author)
        };
        let author = author.ok_or_else(|| AppError::new(ErrorCode::CommentNotFound, "comment not found"))?;
        self.viewer.require_author(author)?;

        let filters = vec![Filter::eq("id", comment_id), Filter::eq("parent", self.id)];
        self.logged("delete_comment", self.store.delete(Relation::Posts, filters).await.map_err(AppError::from))?;

        self.fetch_comments().await?;
        self.sync_comment_count().await?;
        info!(listing = self.id, comment = comment_id, "comment deleted");
        Ok(())
    }

    /// Write the refetched comment count to the listing's counter.
    async fn sync_comment_count(&self) -> AppResult<()> {
        let count = self.state.lock().unwrap().comments.len() as i64;
        let patch = json!({ "comments_number": count });
        let result = self
            .store
            .update(Relation::Posts, vec![Filter::eq("id", self.id)], patch)
            .await
            .map_err(AppError::from);
        self.logged("sync_comment_count", result)?;

        self.state.lock().unwrap().listing.comments_number = count;
        Ok(())
    }

    /// Remove the listing with everything that references it: saved marks,
    /// likes, comments, then the listing row.
    ///
    /// Stops at the first failing step. Each step deletes by filter, so
    /// calling again after a failure finishes the cleanup.
    pub async fn delete_listing(&self) -> AppResult<()> {
        let author = self.state.lock().unwrap().listing.author;
        self.viewer.require_author(author)?;

        let _turn = self.guard.acquire(self.id, MutationKind::Listing).await;

        let steps = [
            ("saved marks", Relation::SavedPosts, Filter::eq("post_id", self.id)),
            ("likes", Relation::Likes, Filter::eq("post_id", self.id)),
            ("comments", Relation::Posts, Filter::eq("parent", self.id)),
            ("listing", Relation::Posts, Filter::eq("id", self.id)),
        ];
        for (step, relation, filter) in steps {
            match self.store.delete(relation, vec![filter]).await {
                Ok(rows) => debug!(listing = self.id, step, removed = rows.len(), "cleanup step done"),
                Err(e) => {
                    error!(listing = self.id, step, error = %e, "listing delete stopped");
                    return Err(e.into());
                }
            }
        }

        self.guard.forget(self.id);
        counter!("listings_deleted_total").increment(1);
        info!(listing = self.id, "listing deleted");
        Ok(())
    }

    /// Flip the sold flag. Returns the new value.
    pub async fn toggle_sold(&self) -> AppResult<bool> {
        let author = self.state.lock().unwrap().listing.author;
        self.viewer.require_author(author)?;

        let _turn = self.guard.acquire(self.id, MutationKind::Listing).await;
        let sold = !self.state.lock().unwrap().listing.sold;

        let result = self
            .store
            .update(Relation::Posts, vec![Filter::eq("id", self.id)], json!({ "sold": sold }))
            .await
            .map_err(AppError::from);
        self.logged("toggle_sold", result)?;

        self.state.lock().unwrap().listing.sold = sold;
        info!(listing = self.id, sold, "sold flag changed");
        Ok(sold)
    }

    pub async fn edit_listing(&self, content: &str) -> AppResult<()> {
        let (author, photo_count) = {
            let state = self.state.lock().unwrap();
            (state.listing.author, state.listing.photos.len())
        };
        self.viewer.require_author(author)?;
        validation::check_listing_content(content, photo_count)?;

        let _turn = self.guard.acquire(self.id, MutationKind::Listing).await;
        let result = self
            .store
            .update(Relation::Posts, vec![Filter::eq("id", self.id)], json!({ "content": content }))
            .await
            .map_err(AppError::from);
        self.logged("edit_listing", result)?;

        self.state.lock().unwrap().listing.content = content.to_string();
        Ok(())
    }
}
