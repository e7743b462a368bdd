//! Persistence layer modules.

pub mod db;
pub mod message_repo;
pub mod schema;
pub mod session_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
