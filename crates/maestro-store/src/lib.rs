//! Durable relational state for Maestro.
//!
//! One SQLite database per deployment. Every public function on [`Store`] is
//! one transaction: it commits on success and rolls back on any failure.
//! Precondition failures (duplicate slug, page not in workspace, unknown id)
//! come back as [`error::StoreError::Precondition`] carrying the exact
//! human-readable string the tool layer surfaces to the LLM; integrity
//! errors propagate as database errors.

pub mod db;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;
pub mod workspace;

pub use error::{Result, StoreError};
pub use store::Store;
