pub mod routes;

// Re-export route handlers for convenience
pub use routes::auto;
pub use routes::checks;
pub use routes::domains;
pub use routes::error::{ApiError, ApiJson};
pub use routes::state::AppState;
