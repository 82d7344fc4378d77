//! In-memory view of the pre-ingested knowledge store.
//!
//! The loader walks the project directory once at startup and builds a map
//! of page name → page (light pass-1 summary plus deep pass-2 region
//! content). The view is read-only for the life of the process except via
//! [`Knowledge::apply_update`], which patches both the on-disk artifact and
//! the in-memory copy under a write lock.

pub mod discipline;
pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;
pub mod update;

pub use error::{KnowledgeError, Result};
pub use loader::load_project;
pub use resolve::{normalize_token, Resolution};
pub use types::{Knowledge, KnowledgePage, ProjectKnowledge, Region, RegionPointer};
