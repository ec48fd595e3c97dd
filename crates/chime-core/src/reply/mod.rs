//! Tool-augmented reply loop.
//!
//! Produces a single display-ready reply for a conversation, letting the
//! LLM collaborator invoke declared tools across a bounded number of
//! rounds before finalizing.

pub mod engine;
pub mod prompt;
pub mod tools;

pub use engine::{MAX_ROUNDS, ReplyEngine, ReplyError};
pub use tools::{EngagementBand, ToolCall};
