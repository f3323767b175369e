//! Search core for the conversation archive
//!
//! - `units`: text units extracted from conversations
//! - `embedding`: embedding backends (OpenAI, offline harmonic projection)
//! - `store`: durable SQLite vector store
//! - `builder`: incremental store build
//! - `index`: in-memory cosine similarity index
//! - `router`: exact vs semantic query routing
//! - `engine`: startup state shared by all requests

pub mod builder;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod router;
pub mod store;
pub mod units;

pub use embedding::{EmbeddingBackend, HarmonicBackend, OpenAiBackend};
pub use engine::{BackendChoice, EngineOptions, SearchEngine};
pub use error::SearchError;
pub use router::{SearchHit, SearchMode, SearchResults};
