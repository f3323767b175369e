//! Search Engine - archive, embedding backend and similarity index
//!
//! Built once at startup and read-only afterwards, so one engine can be
//! shared by every request.

use anyhow::{bail, Context, Result};

use super::builder::{load_or_build, BuildReport, DEFAULT_BATCH_SIZE};
use super::embedding::{EmbeddingBackend, HarmonicBackend, OpenAiBackend};
use super::index::SimilarityIndex;
use super::router::{exact_search, select_mode, semantic_search, QueryMode, SearchMode, SearchResults, SEMANTIC_TOP_K};
use super::store::EmbeddingStore;
use crate::core::config::Secrets;
use crate::core::conversation::Archive;
use crate::core::paths::DataPaths;

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// OpenAI when secrets are usable, otherwise exact-only
    #[default]
    Auto,
    OpenAi,
    Harmonic,
    None,
}

/// Resolve the configured backend
///
/// `Auto` never fails: missing or invalid secrets mean no backend. An explicit
/// `OpenAi` without secrets is an error.
pub fn resolve_backend(
    choice: BackendChoice,
    paths: &DataPaths,
) -> Result<Option<Box<dyn EmbeddingBackend>>> {
    match choice {
        BackendChoice::None => Ok(None),
        BackendChoice::Harmonic => Ok(Some(Box::new(HarmonicBackend::new()))),
        BackendChoice::Auto => match Secrets::load_optional(&paths.secrets) {
            Some(secrets) => match OpenAiBackend::new(&secrets.openai) {
                Ok(backend) => Ok(Some(Box::new(backend))),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding backend unavailable, semantic search disabled");
                    Ok(None)
                }
            },
            None => Ok(None),
        },
        BackendChoice::OpenAi => {
            let Some(secrets) = Secrets::load_optional(&paths.secrets) else {
                bail!(
                    "OpenAI backend requested but {} is missing or invalid",
                    paths.secrets.display()
                );
            };
            Ok(Some(Box::new(OpenAiBackend::new(&secrets.openai)?)))
        }
    }
}

/// Backend plus the index built from its vectors
pub struct SemanticIndex {
    backend: Box<dyn EmbeddingBackend>,
    index: SimilarityIndex,
}

impl SemanticIndex {
    pub fn new(backend: Box<dyn EmbeddingBackend>, index: SimilarityIndex) -> Self {
        Self { backend, index }
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub paths: DataPaths,
    pub backend: BackendChoice,
    pub batch_size: usize,
}

impl EngineOptions {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            backend: BackendChoice::Auto,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub struct SearchEngine {
    archive: Archive,
    semantic: Option<SemanticIndex>,
    build_report: Option<BuildReport>,
}

impl SearchEngine {
    pub fn new(archive: Archive, semantic: Option<SemanticIndex>) -> Self {
        Self {
            archive,
            semantic,
            build_report: None,
        }
    }

    /// Load the archive and, if a backend is configured, bring the vector
    /// store up to date and build the similarity index
    ///
    /// A malformed archive, an unreadable store or a failed build are errors.
    pub fn start(options: &EngineOptions) -> Result<Self> {
        let backend = resolve_backend(options.backend, &options.paths)?;
        Self::start_with_backend(options, backend)
    }

    /// Same as `start`, with the backend already resolved by the caller
    pub fn start_with_backend(
        options: &EngineOptions,
        backend: Option<Box<dyn EmbeddingBackend>>,
    ) -> Result<Self> {
        let archive = Archive::load(&options.paths.archive)?;

        let Some(backend) = backend else {
            tracing::info!("no embedding backend configured, exact search only");
            return Ok(Self::new(archive, None));
        };

        let store_path = &options.paths.store;
        if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut store = EmbeddingStore::open(store_path).with_context(|| {
            format!(
                "Vector store {} is unreadable; delete it to rebuild",
                store_path.display()
            )
        })?;

        let built = load_or_build(
            &mut store,
            backend.as_ref(),
            archive.conversations(),
            options.batch_size,
        )
        .context("Embedding build failed; completed batches were kept, rerun to resume")?;

        let index = SimilarityIndex::build(&built.records)
            .context("Failed to build similarity index")?;

        let mut engine = Self::new(archive, Some(SemanticIndex::new(backend, index)));
        engine.build_report = Some(built.report);
        Ok(engine)
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn semantic(&self) -> Option<&SemanticIndex> {
        self.semantic.as_ref()
    }

    pub fn semantic_enabled(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn build_report(&self) -> Option<&BuildReport> {
        self.build_report.as_ref()
    }

    /// Route and run one query
    ///
    /// Assumes the boundary already rejected queries shorter than
    /// `MIN_QUERY_CHARS`.
    pub fn search(&self, query: &str) -> super::error::Result<SearchResults> {
        match (select_mode(query, self.semantic.is_some()), &self.semantic) {
            (QueryMode::Semantic(q), Some(semantic)) => {
                let hits = semantic_search(
                    &self.archive,
                    &semantic.index,
                    semantic.backend.as_ref(),
                    q,
                    SEMANTIC_TOP_K,
                )?;
                Ok(SearchResults {
                    mode: SearchMode::Semantic,
                    query: q.to_string(),
                    hits,
                })
            }
            (QueryMode::Semantic(q), None) | (QueryMode::Exact(q), _) => Ok(SearchResults {
                mode: SearchMode::Exact,
                query: q.to_string(),
                hits: exact_search(&self.archive, q),
            }),
        }
    }
}
