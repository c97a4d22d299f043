use std::sync::Arc;

use market_shared::errors::{AppError, AppResult, ErrorCode};
use market_shared::store::{decode_rows, Filter, IsValue, PhotoStore, Relation, Select, Store};
use market_shared::types::models::{Listing, Profile, UserId};
use market_shared::types::pagination::SortDirection;
use market_shared::uploads::{photo_key, PhotoUpload};
use market_shared::validation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Fields a user may change on their own profile.
#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50, message = "display name must be between 1 and 50 characters"))]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200, message = "about must be at most 200 characters"))]
    pub about: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    fn check(&self) -> AppResult<()> {
        self.validate().map_err(|e| {
            let code = if e.field_errors().contains_key("about") {
                ErrorCode::AboutTooLong
            } else {
                ErrorCode::InvalidDisplayName
            };
            AppError::new(code, e.to_string())
        })
    }
}

/// Reads any profile; writes only the viewer's own.
pub struct ProfileService<S> {
    store: Arc<S>,
    viewer: UserId,
}

impl<S: Store> ProfileService<S> {
    pub fn new(store: Arc<S>, viewer: UserId) -> Self {
        Self { store, viewer }
    }

    pub async fn fetch(&self, user: UserId) -> AppResult<Option<Profile>> {
        let query = Select::from(Relation::Profiles).eq("id", user.to_string());
        let profiles: Vec<Profile> = self.store.fetch(query).await?;
        Ok(profiles.into_iter().next())
    }

    /// The user's top-level listings, newest first.
    pub async fn listings(&self, user: UserId) -> AppResult<Vec<Listing>> {
        let query = Select::from(Relation::Posts)
            .eq("author", user.to_string())
            .is("parent", IsValue::Null)
            .order("created_at", SortDirection::Desc);
        self.store.fetch(query).await
    }

    pub async fn set_display_name(&self, name: &str) -> AppResult<Profile> {
        let update = ProfileUpdate {
            name: Some(name.trim().to_string()),
            ..Default::default()
        };
        update.check()?;
        self.apply(update).await
    }

    /// A blank about text leaves the profile untouched and returns `None`.
    pub async fn update_about(&self, about: &str) -> AppResult<Option<Profile>> {
        let about = about.trim();
        if about.is_empty() {
            return Ok(None);
        }
        let update = ProfileUpdate {
            about: Some(about.to_string()),
            ..Default::default()
        };
        update.check()?;
        self.apply(update).await.map(Some)
    }

    pub async fn set_avatar(&self, url: &str) -> AppResult<Profile> {
        self.apply(ProfileUpdate {
            avatar: Some(url.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn upload_avatar<P: PhotoStore>(&self, photos: &P, file: PhotoUpload) -> AppResult<Profile> {
        let content_type = validation::check_photo(&file.file_name, file.bytes.len())?;
        let key = format!("avatars/{}", photo_key(&file.file_name));
        let url = photos
            .put(&key, file.bytes, content_type)
            .await
            .map_err(|e| AppError::new(ErrorCode::PhotoUploadFailed, e.to_string()))?;
        self.set_avatar(&url).await
    }

    async fn apply(&self, update: ProfileUpdate) -> AppResult<Profile> {
        let patch: Value = serde_json::to_value(&update)?;
        let rows = self
            .store
            .update(Relation::Profiles, vec![Filter::eq("id", self.viewer.to_string())], patch)
            .await?;

        let profile = decode_rows::<Profile>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("profile not found"))?;
        tracing::info!(user = %self.viewer, "profile updated");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_shared::clients::memory::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn service() -> (Arc<MemoryStore>, ProfileService<MemoryStore>, UserId) {
        let store = Arc::new(MemoryStore::new());
        let me = Uuid::new_v4();
        store.seed(Relation::Profiles, json!({"id": me, "name": null, "avatar": null, "about": null}));
        (store.clone(), ProfileService::new(store, me), me)
    }

    #[tokio::test]
    async fn display_name_is_trimmed_and_bounded() {
        let (_, profiles, me) = service();

        let profile = profiles.set_display_name("  Ana  ").await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(profiles.fetch(me).await.unwrap().unwrap().display_name(), Some("Ana"));

        let err = profiles.set_display_name("   ").await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidDisplayName));
        let err = profiles.set_display_name(&"x".repeat(51)).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidDisplayName));
    }

    #[tokio::test]
    async fn blank_about_is_a_no_op() {
        let (store, profiles, _) = service();
        assert!(profiles.update_about(" \n ").await.unwrap().is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn about_is_limited() {
        let (store, profiles, _) = service();
        let err = profiles.update_about(&"a".repeat(201)).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::AboutTooLong));
        assert!(store.calls().is_empty());

        let profile = profiles.update_about("Junior, selling dorm stuff").await.unwrap().unwrap();
        assert_eq!(profile.about.as_deref(), Some("Junior, selling dorm stuff"));
        assert!(profile.name.is_none());
    }

    #[tokio::test]
    async fn avatar_upload_stores_the_object() {
        let (store, profiles, _) = service();
        let profile = profiles
            .upload_avatar(store.as_ref(), PhotoUpload::new("me.png", vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(profile.avatar.unwrap().starts_with("memory://photos/avatars/"));
        assert_eq!(store.object_count(), 1);

        let err = profiles
            .upload_avatar(store.as_ref(), PhotoUpload::new("me.gif", vec![1]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::PhotoTypeInvalid));
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let profiles = ProfileService::new(store, Uuid::new_v4());
        let err = profiles.set_display_name("Ana").await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn user_listings_exclude_comments() {
        let (store, profiles, me) = service();
        store.seed(Relation::Posts, json!({"author": me, "content": "#wtb bike"}));
        store.seed(Relation::Posts, json!({"author": me, "content": "#wts desk"}));
        store.seed(Relation::Posts, json!({"author": me, "content": "a comment", "parent": 1}));

        let listings = profiles.listings(me).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].content, "#wts desk");
    }
}
