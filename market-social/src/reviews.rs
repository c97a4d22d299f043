use std::sync::{Arc, Mutex};

use market_shared::errors::{AppError, AppResult, ErrorCode};
use market_shared::store::{Relation, Select, Store};
use market_shared::types::models::{NewReview, Review, UserId};
use market_shared::types::pagination::SortDirection;

/// Reviews left on one user's profile, as seen by the viewer.
pub struct ReviewBoard<S> {
    store: Arc<S>,
    viewer: UserId,
    receiver: UserId,
    reviews: Mutex<Vec<Review>>,
}

impl<S: Store> ReviewBoard<S> {
    pub fn new(store: Arc<S>, viewer: UserId, receiver: UserId) -> Self {
        Self {
            store,
            viewer,
            receiver,
            reviews: Mutex::new(Vec::new()),
        }
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.reviews.lock().unwrap().clone()
    }

    pub async fn load(&self) -> AppResult<usize> {
        let query = Select::from(Relation::Reviews)
            .with_author()
            .eq("receiver", self.receiver.to_string())
            .order("created_at", SortDirection::Desc);
        let reviews: Vec<Review> = self.store.fetch(query).await?;

        let n = reviews.len();
        *self.reviews.lock().unwrap() = reviews;
        Ok(n)
    }

    pub async fn write(&self, text: &str) -> AppResult<()> {
        let content = text.trim();
        if content.is_empty() {
            return Err(AppError::new(ErrorCode::EmptyReview, "review is empty"));
        }
        if self.viewer == self.receiver {
            return Err(AppError::new(ErrorCode::CannotReviewSelf, "you cannot review yourself"));
        }

        let review = NewReview {
            author: self.viewer,
            receiver: self.receiver,
            content: content.to_string(),
        };
        self.store.insert_row(Relation::Reviews, &review).await?;
        tracing::info!(author = %self.viewer, receiver = %self.receiver, "review written");

        self.load().await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_shared::clients::memory::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn reviews_show_their_author() {
        let store = Arc::new(MemoryStore::new());
        let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        store.seed(Relation::Profiles, json!({"id": buyer, "name": "Bo"}));

        let board = ReviewBoard::new(store.clone(), buyer, seller);
        board.write("  Smooth pickup, as described ").await.unwrap();

        let reviews = board.reviews();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].content, "Smooth pickup, as described");
        assert_eq!(reviews[0].author_profile.as_ref().unwrap().name.as_deref(), Some("Bo"));
    }

    #[tokio::test]
    async fn empty_and_self_reviews_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let me = Uuid::new_v4();

        let other = ReviewBoard::new(store.clone(), me, Uuid::new_v4());
        assert_eq!(other.write("  ").await.unwrap_err().error_code(), Some(ErrorCode::EmptyReview));

        let own = ReviewBoard::new(store.clone(), me, me);
        assert_eq!(own.write("great seller").await.unwrap_err().error_code(), Some(ErrorCode::CannotReviewSelf));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn only_the_receivers_reviews_load() {
        let store = Arc::new(MemoryStore::new());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        ReviewBoard::new(store.clone(), a, b).write("for b").await.unwrap();
        ReviewBoard::new(store.clone(), a, c).write("for c").await.unwrap();
        ReviewBoard::new(store.clone(), c, b).write("also for b").await.unwrap();

        let board = ReviewBoard::new(store, a, b);
        assert_eq!(board.load().await.unwrap(), 2);
        assert_eq!(board.reviews()[0].content, "also for b");
    }
}
