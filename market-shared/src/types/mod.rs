pub mod api;
pub mod auth;
pub mod event;
pub mod models;
pub mod pagination;

pub use api::*;
pub use auth::*;
pub use event::*;
pub use models::*;
pub use pagination::*;
