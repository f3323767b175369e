//! chat-archive-search library
//!
//! Exact and semantic search over an exported chat conversation archive.
//!
//! # Modules
//!
//! - `core`: archive loading, secrets, paths, time helpers
//! - `search`: embedding store, similarity index and query routing

pub mod core;
pub mod search;

// Re-exports for convenience
pub use core::conversation::{Archive, Conversation, Message};
pub use core::paths::DataPaths;
pub use search::{BackendChoice, EngineOptions, SearchEngine, SearchHit, SearchMode, SearchResults};
