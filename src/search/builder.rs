//! Incremental embedding build
//!
//! Only units missing from the store are sent to the backend. Each batch is
//! committed as soon as it comes back, so an interrupted build resumes where
//! it stopped.

use std::time::Instant;

use super::embedding::EmbeddingBackend;
use super::error::{Result, SearchError};
use super::store::{EmbeddingRecord, EmbeddingStore, META_DIMENSION, META_LAST_BUILD, META_MODEL};
use super::units::{extract_units, TextUnit};
use crate::core::conversation::Conversation;

pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub total_units: usize,
    pub existing: usize,
    pub embedded: usize,
    pub batches: usize,
    pub duration_ms: u128,
}

/// Every stored record in insertion order, plus what the build did
#[derive(Debug)]
pub struct BuiltIndex {
    pub records: Vec<EmbeddingRecord>,
    pub report: BuildReport,
}

/// Bring the store up to date with the archive and return its contents
pub fn load_or_build(
    store: &mut EmbeddingStore,
    backend: &dyn EmbeddingBackend,
    conversations: &[Conversation],
    batch_size: usize,
) -> Result<BuiltIndex> {
    let start = Instant::now();
    check_model(store, backend)?;

    let units = extract_units(conversations);
    let stored = store.ids()?;
    let missing: Vec<&TextUnit> = units.iter().filter(|u| !stored.contains(&u.id)).collect();

    let mut report = BuildReport {
        total_units: units.len(),
        existing: units.len() - missing.len(),
        ..Default::default()
    };

    let mut dimension: Option<usize> = store
        .get_meta(META_DIMENSION)?
        .and_then(|d| d.parse().ok());

    let batch_size = batch_size.clamp(1, backend.max_batch_size().max(1));
    if !missing.is_empty() {
        tracing::info!(
            missing = missing.len(),
            existing = report.existing,
            batch_size,
            model = backend.model_name(),
            "embedding new text units"
        );
    }

    for batch in missing.chunks(batch_size) {
        let texts: Vec<&str> = batch.iter().map(|u| u.text.as_str()).collect();
        let vectors = backend.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(SearchError::MalformedResponse(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        let mut records = Vec::with_capacity(batch.len());
        for (unit, vector) in batch.iter().zip(vectors) {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(SearchError::DimensionMismatch {
                    id: unit.id.clone(),
                    expected,
                    found: vector.len(),
                });
            }
            records.push(EmbeddingRecord {
                id: unit.id.clone(),
                conv_id: unit.conv_id.clone(),
                kind: unit.kind,
                vector,
            });
        }

        store.put_batch(&records)?;
        if let Some(dim) = dimension {
            store.set_meta(META_DIMENSION, &dim.to_string())?;
        }

        report.embedded += records.len();
        report.batches += 1;
        tracing::debug!(
            done = report.embedded,
            total = missing.len(),
            "persisted embedding batch"
        );
    }

    if report.embedded > 0 {
        store.set_meta(META_LAST_BUILD, &chrono::Utc::now().timestamp().to_string())?;
    }

    let records = store.all()?;
    report.duration_ms = start.elapsed().as_millis();
    tracing::info!(
        records = records.len(),
        embedded = report.embedded,
        duration_ms = report.duration_ms as u64,
        "embedding index ready"
    );

    Ok(BuiltIndex { records, report })
}

/// Refuse to mix vectors from different models in one store
fn check_model(store: &EmbeddingStore, backend: &dyn EmbeddingBackend) -> Result<()> {
    let configured = backend.model_name();
    match store.get_meta(META_MODEL)? {
        Some(stored) if stored != configured => Err(SearchError::ModelMismatch {
            stored,
            configured: configured.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            store.set_meta(META_MODEL, configured)?;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Backend that maps text to a small deterministic vector and counts
    /// every text it is asked to embed
    pub struct CountingBackend {
        pub texts: AtomicUsize,
        pub calls: AtomicUsize,
        pub fail: bool,
        pub name: String,
    }

    impl CountingBackend {
        pub fn new() -> Self {
            Self {
                texts: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail: false,
                name: "counting".to_string(),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        pub fn texts(&self) -> usize {
            self.texts.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn vector_for(text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let has = |w: &str| if lower.contains(w) { 1.0 } else { 0.0 };
            vec![has("japan"), has("rust"), has("bread"), 0.1]
        }
    }

    impl EmbeddingBackend for CountingBackend {
        fn model_name(&self) -> &str {
            &self.name
        }

        fn max_batch_size(&self) -> usize {
            4
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchError::Backend("connection refused".to_string()));
            }
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::testing::CountingBackend;
    use super::*;
    use crate::core::conversation::fixtures::{conversation, message};

    fn corpus(n: usize) -> Vec<Conversation> {
        (0..n)
            .map(|i| {
                conversation(
                    &format!("c{}", i),
                    &format!("Conversation {}", i),
                    i as i64,
                    vec![
                        message(&format!("c{}-q", i), "user", "tell me about japan", 1),
                        message(&format!("c{}-a", i), "assistant", "rust and bread", 2),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn test_build_is_idempotent() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        let backend = CountingBackend::new();
        let convs = corpus(3);

        let first = load_or_build(&mut store, &backend, &convs, DEFAULT_BATCH_SIZE)?;
        assert_eq!(first.records.len(), 9);
        assert_eq!(first.report.embedded, 9);
        // Clamped to the backend's batch limit of 4
        assert_eq!(first.report.batches, 3);
        let calls = backend.calls();

        let second = load_or_build(&mut store, &backend, &convs, DEFAULT_BATCH_SIZE)?;
        assert_eq!(backend.calls(), calls);
        assert_eq!(second.report.embedded, 0);
        assert_eq!(second.report.existing, 9);
        assert_eq!(second.records, first.records);
        Ok(())
    }

    #[test]
    fn test_build_is_incremental() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        let backend = CountingBackend::new();

        let small = corpus(2);
        load_or_build(&mut store, &backend, &small, 2)?;
        assert_eq!(backend.texts(), 6);

        let large = corpus(5);
        let built = load_or_build(&mut store, &backend, &large, 2)?;
        assert_eq!(backend.texts(), 6 + 9);
        assert_eq!(built.report.embedded, 9);
        assert_eq!(built.records.len(), 15);

        // Store order is insertion order: old records first
        assert_eq!(built.records[0].id, "c0");
        assert_eq!(built.records[6].id, "c2");
        Ok(())
    }

    #[test]
    fn test_backend_failure_keeps_nothing_new() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        let convs = corpus(1);

        let err = load_or_build(&mut store, &CountingBackend::failing(), &convs, 2).unwrap_err();
        assert!(matches!(err, SearchError::Backend(_)));
        assert!(store.is_empty()?);

        // Retrying with a working backend picks everything up
        let backend = CountingBackend::new();
        let built = load_or_build(&mut store, &backend, &convs, 2)?;
        assert_eq!(built.records.len(), 3);
        Ok(())
    }

    #[test]
    fn test_partial_progress_survives_failure() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        let backend = CountingBackend::new();
        load_or_build(&mut store, &backend, &corpus(1), 2)?;

        let err = load_or_build(&mut store, &CountingBackend::failing(), &corpus(3), 2);
        assert!(err.is_err());
        assert_eq!(store.len()?, 3);

        let built = load_or_build(&mut store, &backend, &corpus(3), 2)?;
        assert_eq!(built.report.existing, 3);
        assert_eq!(built.report.embedded, 6);
        Ok(())
    }

    #[test]
    fn test_model_mismatch_refused() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        load_or_build(&mut store, &CountingBackend::new(), &corpus(1), 4)?;

        let other = CountingBackend {
            name: "other-model".to_string(),
            ..CountingBackend::new()
        };
        let err = load_or_build(&mut store, &other, &corpus(1), 4).unwrap_err();
        assert!(matches!(err, SearchError::ModelMismatch { .. }));
        assert_eq!(other.calls(), 0);
        Ok(())
    }

    /// Backend sharing the counting model name whose output goes wrong
    /// from a given call onwards
    struct FaultyBackend {
        calls: AtomicUsize,
        short_from_call: usize,
        dimension: usize,
    }

    impl FaultyBackend {
        fn new(short_from_call: usize, dimension: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                short_from_call,
                dimension,
            }
        }
    }

    impl EmbeddingBackend for FaultyBackend {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let count = if call >= self.short_from_call {
                texts.len() - 1
            } else {
                texts.len()
            };
            Ok(vec![vec![1.0; self.dimension]; count])
        }
    }

    #[test]
    fn test_short_response_fails_batch() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        let backend = FaultyBackend::new(1, 4);

        let err = load_or_build(&mut store, &backend, &corpus(2), 2).unwrap_err();
        assert!(matches!(err, SearchError::MalformedResponse(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        // The first batch was committed before the failure
        let ids: Vec<String> = store.all()?.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c0", "c0-q"]);
        Ok(())
    }

    #[test]
    fn test_stored_dimension_enforced() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        load_or_build(&mut store, &CountingBackend::new(), &corpus(1), 4)?;

        let narrower = FaultyBackend::new(usize::MAX, 3);
        let err = load_or_build(&mut store, &narrower, &corpus(2), 4).unwrap_err();
        assert!(matches!(
            err,
            SearchError::DimensionMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
        assert_eq!(store.len()?, 3);
        assert_eq!(store.stats()?.dimension, Some(4));
        Ok(())
    }

    #[test]
    fn test_dimension_recorded() -> Result<()> {
        let mut store = EmbeddingStore::open_in_memory()?;
        load_or_build(&mut store, &CountingBackend::new(), &corpus(1), 4)?;
        let stats = store.stats()?;
        assert_eq!(stats.dimension, Some(4));
        assert_eq!(stats.model.as_deref(), Some("counting"));
        assert!(stats.last_build.is_some());
        Ok(())
    }
}
