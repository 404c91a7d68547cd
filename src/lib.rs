// Social API - users, posts, comments, likes, follows and notifications

// Entity records and the hooks that run around their mutations
pub mod entities;
pub mod ent_framework;

// Store, auth and request-context infrastructure
pub mod infrastructure;

// Business rules and the HTTP surface
pub mod services;
pub mod api;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use app_state::AppState;
pub use error::{AppError, AppResult};
