//! PostgreSQL query layer for surreal-index-sync.
//!
//! Implements [`sync_core::RowSource`] over the `content` schema of the movies
//! catalogue (`film_work`, `person`, `genre` and their link tables), using
//! `updated_at` as the change timestamp.

mod queries;
mod session;
mod source;

pub use session::{ConnectOpts, PostgresSession};
pub use source::PostgresRowSource;
