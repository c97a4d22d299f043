use market_shared::errors::{AppError, AppResult, ErrorCode};
use market_shared::types::auth::Session;
use market_shared::types::models::{Profile, UserId};
use market_shared::validation;

/// Who is looking at the feed. Passed to every component that reads or
/// writes on the user's behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerContext {
    pub user_id: UserId,
    pub profile: Option<Profile>,
}

impl ViewerContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, profile: None }
    }

    pub fn from_session(session: &Session, profile: Option<Profile>) -> Self {
        Self {
            user_id: session.user_id,
            profile,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn owns(&self, author: UserId) -> bool {
        self.user_id == author
    }

    pub fn require_author(&self, author: UserId) -> AppResult<()> {
        if !self.owns(author) {
            return Err(AppError::new(ErrorCode::NotAuthor, "only the author can do this"));
        }
        Ok(())
    }

    pub fn require_display_name(&self) -> AppResult<()> {
        validation::require_display_name(self.profile.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn authorship() {
        let me = Uuid::new_v4();
        let viewer = ViewerContext::new(me);
        assert!(viewer.require_author(me).is_ok());
        let err = viewer.require_author(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::NotAuthor));
    }

    #[test]
    fn display_name_comes_from_profile() {
        let me = Uuid::new_v4();
        let viewer = ViewerContext::new(me);
        assert!(viewer.require_display_name().is_err());

        let mut profile = Profile::new(me);
        profile.name = Some("Jo".into());
        assert!(viewer.with_profile(profile).require_display_name().is_ok());
    }
}
