//! Ragline API crate - axum HTTP server and route handlers.
//!
//! Exposes health, retrieval and manual refresh endpoints over the
//! currently published corpus snapshot.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
