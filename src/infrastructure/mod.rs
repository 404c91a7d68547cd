// Core infrastructure modules
pub mod database;              // Entity store interface
pub mod sqlite_database;       // SQLite implementation of the store
pub mod middleware;            // ViewerContext middleware and extractor
pub mod monitoring;            // Tracing and health reporting
pub mod security;              // Password hashing, tokens, credential validation
pub mod viewer;                // Viewer context

// Re-export core infrastructure components
pub use database::{DatabaseInterface, UserRecord};
pub use sqlite_database::SqliteDatabase;
pub use security::SecurityService;
pub use viewer::ViewerContext;
