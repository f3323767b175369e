//! Query routing: exact substring scan or semantic lookup
//!
//! The mode is decided per query. A query wrapped in double quotes, or any
//! query when no semantic index is loaded, is matched literally; everything
//! else goes through the embedding backend.

use serde::Serialize;

use super::embedding::EmbeddingBackend;
use super::error::{Result, SearchError};
use super::index::SimilarityIndex;
use super::units::UnitKind;
use crate::core::conversation::{Archive, Conversation, Message};

/// Shortest query accepted at the boundary, in characters
pub const MIN_QUERY_CHARS: usize = 3;
/// Exact mode stops collecting at this many hits
pub const EXACT_HIT_LIMIT: usize = 10;
/// Neighbors requested from the similarity index
pub const SEMANTIC_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode<'q> {
    /// Literal match; quotes already stripped
    Exact(&'q str),
    Semantic(&'q str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    Semantic,
}

/// Fields shared by both hit kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitPayload {
    /// Owning conversation id
    pub id: String,
    pub title: String,
    pub text: String,
    pub role: String,
    /// Unix seconds
    pub created: i64,
    pub created_str: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchHit {
    /// Shows the conversation's first message, dated by the conversation
    Conversation(HitPayload),
    /// Shows one message, dated by the message
    Message(HitPayload),
}

impl SearchHit {
    pub fn new(kind: UnitKind, conv: &Conversation, msg: &Message, score: Option<f32>) -> Self {
        let created = match kind {
            UnitKind::Conversation => conv.created,
            UnitKind::Message => msg.created,
        };
        let payload = HitPayload {
            id: conv.id.clone(),
            title: conv.title_str().to_string(),
            text: msg.text.clone(),
            role: msg.role.clone(),
            created: created.timestamp(),
            created_str: crate::core::conversation::format_time(&created),
            score,
        };
        match kind {
            UnitKind::Conversation => Self::Conversation(payload),
            UnitKind::Message => Self::Message(payload),
        }
    }

    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Conversation(_) => UnitKind::Conversation,
            Self::Message(_) => UnitKind::Message,
        }
    }

    pub fn payload(&self) -> &HitPayload {
        match self {
            Self::Conversation(p) | Self::Message(p) => p,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub mode: SearchMode,
    /// The query as matched (quotes stripped in exact mode)
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// Reject queries shorter than `MIN_QUERY_CHARS`
pub fn validate_query(raw: &str) -> Result<&str> {
    if raw.chars().count() < MIN_QUERY_CHARS {
        return Err(SearchError::QueryTooShort {
            min: MIN_QUERY_CHARS,
        });
    }
    Ok(raw)
}

pub fn select_mode(query: &str, semantic_available: bool) -> QueryMode<'_> {
    let quoted = query.len() >= 2 && query.starts_with('"') && query.ends_with('"');
    if quoted {
        QueryMode::Exact(&query[1..query.len() - 1])
    } else if semantic_available {
        QueryMode::Semantic(query)
    } else {
        QueryMode::Exact(query)
    }
}

/// Case-insensitive substring scan in archive order
///
/// For each conversation the title is checked first, then every message.
/// Returns at most `EXACT_HIT_LIMIT` hits.
pub fn exact_search(archive: &Archive, needle: &str) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    if needle.is_empty() {
        return hits;
    }

    let needle = needle.to_lowercase();
    let matches = |text: &str| text.to_lowercase().contains(&needle);

    'conversations: for conv in archive.conversations() {
        if conv.title.as_deref().is_some_and(|t| matches(t)) {
            if let Some(first) = conv.first_message() {
                hits.push(SearchHit::new(UnitKind::Conversation, conv, first, None));
                if hits.len() >= EXACT_HIT_LIMIT {
                    break 'conversations;
                }
            }
        }

        for msg in &conv.messages {
            if matches(&msg.text) {
                hits.push(SearchHit::new(UnitKind::Message, conv, msg, None));
                if hits.len() >= EXACT_HIT_LIMIT {
                    break 'conversations;
                }
            }
        }
    }

    hits
}

/// Embed the query and resolve the nearest units back to the archive
///
/// Neighbors whose conversation or message is gone are skipped.
pub fn semantic_search(
    archive: &Archive,
    index: &SimilarityIndex,
    backend: &dyn EmbeddingBackend,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    let query_vector = backend.embed(query)?;
    let neighbors = index.top_k(&query_vector, k)?;

    let mut hits = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        let entry = neighbor.entry;
        let Some(conv) = archive.get(&entry.conv_id) else {
            tracing::debug!(id = %entry.id, conv_id = %entry.conv_id, "skipping stale hit: conversation missing");
            continue;
        };

        let msg = match entry.kind {
            UnitKind::Conversation => conv.first_message(),
            UnitKind::Message => conv.find_message(&entry.id),
        };
        let Some(msg) = msg else {
            tracing::debug!(id = %entry.id, conv_id = %entry.conv_id, "skipping stale hit: message missing");
            continue;
        };

        hits.push(SearchHit::new(entry.kind, conv, msg, Some(neighbor.score)));
    }

    Ok(hits)
}
