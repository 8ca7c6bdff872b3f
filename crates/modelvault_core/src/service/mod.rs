//! Use-case orchestration over the repositories, the file bridge and the
//! session.
//!
//! # Responsibility
//! - Expose model lifecycle operations (bootstrap, new, open, save as,
//!   autosave, disk save, import, conflict resolution) to hosts.
//! - Keep hosts decoupled from storage and file capability details.

pub mod engine;
pub mod working_copy;
