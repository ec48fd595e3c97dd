//! Infrastructure adapters for Chime.
//!
//! Concrete implementations of the chime-core collaborator traits:
//! - `sqlite` -- the persistence gateway over sqlx/SQLite
//! - `llm` -- OpenAI-compatible completion and image clients over reqwest
//! - `telegram` -- the delivery transport over teloxide

pub mod llm;
pub mod sqlite;
pub mod telegram;
