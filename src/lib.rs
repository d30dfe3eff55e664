//! Polls RSS/Atom feeds and writes each new item as a templated markdown note.
//!
//! The pipeline, leaves first:
//!
//! - [`feed`] - HTTP fetch and RSS/Atom parsing
//! - [`note`] - content cleanup, formatting, templates and note paths
//! - [`sync`] - dedup/date filtering, the per-feed sync and the scheduler
//! - [`storage`] - persisted state, schema migrations and the note vault
//! - [`notify`] - user-visible notifications
//! - [`config`] - the application config file

pub mod config;
pub mod feed;
pub mod note;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod util;
