pub mod auth;
pub mod error;

pub use auth::{require_identity, AppState, AuthenticatedUser};
pub use error::{ApiError, ApiResult};
