//! Shared domain types for Chime.
//!
//! This crate holds the data model only: bots, jobs, messages, LLM
//! request/response shapes, and the error enums shared across crates.
//! No IO and no async -- every other crate depends on this one.

pub mod bot;
pub mod engagement;
pub mod error;
pub mod job;
pub mod llm;
pub mod message;
