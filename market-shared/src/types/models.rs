use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ListingId = i64;
pub type UserId = Uuid;

// --- Profile ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

impl Profile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            name: None,
            avatar: None,
            about: None,
        }
    }

    /// A non-blank display name, required before posting or commenting.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

// --- Listing ---

/// A marketplace post. A listing with a parent is a comment on that parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub author: UserId,
    pub content: String,
    #[serde(default)]
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sold: bool,
    #[serde(default)]
    pub parent: Option<ListingId>,
    #[serde(default)]
    pub comments_number: i64,
    /// Author profile, present when the query expanded it.
    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author_profile: Option<Profile>,
}

impl Listing {
    pub fn is_comment(&self) -> bool {
        self.parent.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewListing {
    pub author: UserId,
    pub content: String,
    pub photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ListingId>,
}

// --- Like ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    /// Absent on optimistic placeholders that have not been stored yet.
    #[serde(default)]
    pub id: Option<i64>,
    pub post_id: ListingId,
    pub user_id: UserId,
}

impl Like {
    pub fn placeholder(post_id: ListingId, user_id: UserId) -> Self {
        Self {
            id: None,
            post_id,
            user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLike {
    pub post_id: ListingId,
    pub user_id: UserId,
}

// --- Saved mark ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMark {
    pub post_id: ListingId,
    pub user_id: UserId,
}

// --- Review ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub author: UserId,
    pub receiver: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "profiles", default, skip_serializing_if = "Option::is_none")]
    pub author_profile: Option<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
    pub author: UserId,
    pub receiver: UserId,
    pub content: String,
}

// --- Message ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub author: UserId,
    pub receiver: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub author: UserId,
    pub receiver: UserId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_decodes_with_expanded_author() {
        let author = Uuid::new_v4();
        let row = json!({
            "id": 7,
            "author": author,
            "content": "#wts desk lamp",
            "photos": ["https://cdn/photos/1.png"],
            "created_at": "2024-03-01T12:00:00Z",
            "sold": false,
            "parent": null,
            "profiles": {"id": author, "name": "Ana", "avatar": null}
        });
        let listing: Listing = serde_json::from_value(row).unwrap();
        assert_eq!(listing.id, 7);
        assert!(!listing.is_comment());
        assert_eq!(listing.comments_number, 0);
        let profile = listing.author_profile.unwrap();
        assert_eq!(profile.display_name(), Some("Ana"));
    }

    #[test]
    fn blank_name_is_not_a_display_name() {
        let mut profile = Profile::new(Uuid::new_v4());
        assert_eq!(profile.display_name(), None);
        profile.name = Some("   ".into());
        assert_eq!(profile.display_name(), None);
    }

    #[test]
    fn new_listing_omits_missing_parent() {
        let row = serde_json::to_value(NewListing {
            author: Uuid::new_v4(),
            content: "#wtb calculator".into(),
            photos: vec![],
            parent: None,
        })
        .unwrap();
        assert!(row.get("parent").is_none());
    }
}
