// Shared kernel used by every module

pub mod config; // Environment-driven configuration
pub mod database; // Connection pool and migrations
pub mod errors; // Shared error types
pub mod utils; // Shared utilities

// Re-exports for convenience
pub use config::AppConfig;
pub use database::Database;
pub use errors::{AppError, AppResult};
