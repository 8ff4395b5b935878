//! Checkpoint management for surreal-index-sync
//!
//! Keeps the cursors that record how far every part of the sync has
//! progressed, and persists them so a restarted process resumes where the
//! previous one stopped.
//!
//! # Architecture
//!
//! - [`CheckpointStore`] - Backend-agnostic load/save of the whole [`Snapshot`]
//! - [`WatermarkTracker`] - get/set of named cursors, saving on every update
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file mapping cursor name to timestamp
//! - `Surreal2Store` - One record in a SurrealDB v2 table
//! - `MemoryStore` - Process memory, for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use checkpoint::{FilesystemStore, WatermarkTracker};
//!
//! let mut tracker = WatermarkTracker::load(FilesystemStore::new("state.json")).await?;
//! let films = tracker.get_or("films", default_cursor);
//! tracker.set("films", newer_cursor).await?;
//! ```

mod filesystem;
mod memory;
pub mod store;
mod surreal2;
mod tracker;

#[cfg(test)]
mod tests;

// Re-export store trait and types
pub use store::{CheckpointStore, Snapshot};

// Re-export storage implementations
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use surreal2::Surreal2Store;

pub use tracker::WatermarkTracker;
