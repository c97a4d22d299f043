pub mod composer;
pub mod config;
pub mod context;
pub mod feed;
pub mod guard;
pub mod notice;
pub mod notifications;
pub mod routes;
pub mod saved;
pub mod search;
pub mod tracker;

pub use context::ViewerContext;
pub use feed::{FeedController, FeedSnapshot, LoadOutcome};
pub use notifications::CommentActivity;
pub use tracker::{PostTracker, TrackerPhase, TrackerView};
