use std::sync::{Arc, Mutex};

use market_shared::errors::{AppError, AppResult};
use market_shared::store::{decode_rows, PhotoStore, Relation, Store};
use market_shared::types::models::{Listing, NewListing};
use market_shared::uploads::{self, PhotoUpload, UploadBatch};
use market_shared::validation::{self, TradeKind, MAX_LISTING_PHOTOS};
use tracing::info;

use crate::context::ViewerContext;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Posted(Listing),
    /// Selling listings wait for [`ListingComposer::confirm`].
    NeedsConfirmation,
}

#[derive(Default)]
struct Draft {
    content: String,
    photos: Vec<String>,
    pending: Option<NewListing>,
}

/// Draft of a new top-level listing.
pub struct ListingComposer<S> {
    store: Arc<S>,
    viewer: ViewerContext,
    draft: Mutex<Draft>,
}

impl<S: Store> ListingComposer<S> {
    pub fn new(store: Arc<S>, viewer: ViewerContext) -> Self {
        Self {
            store,
            viewer,
            draft: Mutex::new(Draft::default()),
        }
    }

    pub fn set_content(&self, content: impl Into<String>) {
        self.draft.lock().unwrap().content = content.into();
    }

    pub fn content(&self) -> String {
        self.draft.lock().unwrap().content.clone()
    }

    pub fn photos(&self) -> Vec<String> {
        self.draft.lock().unwrap().photos.clone()
    }

    pub fn remove_photo(&self, index: usize) {
        let mut draft = self.draft.lock().unwrap();
        if index < draft.photos.len() {
            draft.photos.remove(index);
        }
    }

    /// Upload photos into the draft, up to the per-listing limit.
    pub async fn attach_photos<P: PhotoStore>(&self, photos: &P, files: Vec<PhotoUpload>) -> AppResult<UploadBatch> {
        let room = MAX_LISTING_PHOTOS.saturating_sub(self.draft.lock().unwrap().photos.len());
        let batch = uploads::upload_photos(photos, files, room).await?;

        let mut draft = self.draft.lock().unwrap();
        let room = MAX_LISTING_PHOTOS.saturating_sub(draft.photos.len());
        draft.photos.extend(batch.urls.iter().take(room).cloned());
        Ok(batch)
    }

    /// Validate the draft and post it. Selling listings are held until
    /// confirmed.
    pub async fn submit(&self) -> AppResult<SubmitOutcome> {
        self.viewer.require_display_name()?;

        let listing = {
            let mut draft = self.draft.lock().unwrap();
            validation::check_photo_count(draft.photos.len(), MAX_LISTING_PHOTOS)?;
            let kind = validation::check_listing_content(&draft.content, draft.photos.len())?;

            let listing = NewListing {
                author: self.viewer.user_id,
                content: draft.content.trim().to_string(),
                photos: draft.photos.clone(),
                parent: None,
            };
            if kind == TradeKind::Selling {
                draft.pending = Some(listing);
                return Ok(SubmitOutcome::NeedsConfirmation);
            }
            listing
        };

        self.post(listing).await.map(SubmitOutcome::Posted)
    }

    pub async fn confirm(&self) -> AppResult<SubmitOutcome> {
        let pending = self.draft.lock().unwrap().pending.take();
        let listing = pending.ok_or_else(|| AppError::bad_request("nothing waiting for confirmation"))?;
        self.post(listing).await.map(SubmitOutcome::Posted)
    }

    pub fn cancel(&self) {
        self.draft.lock().unwrap().pending = None;
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.draft.lock().unwrap().pending.is_some()
    }

    async fn post(&self, listing: NewListing) -> AppResult<Listing> {
        let rows = self.store.insert_row(Relation::Posts, &listing).await?;
        let stored = decode_rows::<Listing>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("store returned no row for the new listing"))?;

        *self.draft.lock().unwrap() = Draft::default();
        info!(listing = stored.id, author = %stored.author, "listing posted");
        Ok(stored)
    }
}
