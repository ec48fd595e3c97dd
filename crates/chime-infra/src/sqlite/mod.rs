//! SQLite persistence layer.

pub mod gateway;
pub mod pool;

pub use gateway::SqliteGateway;
pub use pool::DatabasePool;
