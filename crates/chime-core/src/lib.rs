//! Subsystem logic and collaborator trait definitions for Chime.
//!
//! This crate defines the "ports" (collaborator traits) that the
//! infrastructure layer implements, plus the four subsystems built on them:
//! the job scheduler, the engagement decision engine, the tool-augmented
//! reply loop, and the conversation context builder. It depends only on
//! `chime-types` -- never on `chime-infra` or any database/HTTP crate.

pub mod context;
pub mod delivery;
pub mod engagement;
pub mod llm;
pub mod persistence;
pub mod reply;
pub mod runtime;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod support;
