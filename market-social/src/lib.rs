pub mod messages;
pub mod profile;
pub mod reviews;

pub use messages::{ChatLine, Conversation};
pub use profile::{ProfileService, ProfileUpdate};
pub use reviews::ReviewBoard;
