//! Local-first synchronization between the working copy, the model store
//! and external files.
//!
//! # Responsibility
//! - Fingerprint payloads (`content_hash`).
//! - Gate and perform autosave commits (`autosave`).
//! - Reconcile imported files with local state (`reconcile`).
//! - Hold explicit session state (`session`).

pub mod autosave;
pub mod content_hash;
pub mod reconcile;
pub mod session;
