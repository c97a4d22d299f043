pub mod types;
pub mod errors;
pub mod store;
pub mod validation;
pub mod uploads;
pub mod telemetry;
pub mod middleware;
pub mod clients;

pub use types::*;
pub use errors::{AppError, ErrorCode, AppResult};
pub use store::{Store, StoreError, StoreResult, PhotoStore};
