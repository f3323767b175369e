//! Embedding backends
//!
//! - `OpenAiBackend`: remote `/v1/embeddings` endpoint (blocking HTTP)
//! - `HarmonicBackend`: offline Harmonic Token Projection, deterministic and
//!   training-free (<https://arxiv.org/html/2511.20665>)

use std::f64::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Result, SearchError};
use crate::core::config::OpenAiSecrets;

/// Source of fixed-dimension text vectors
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier persisted with the store; vectors from different models
    /// are not comparable
    fn model_name(&self) -> &str;

    /// Largest number of texts accepted by one `embed_batch` call
    fn max_batch_size(&self) -> usize {
        64
    }

    /// One vector per input text, in input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| SearchError::MalformedResponse("empty embedding response".to_string()))
    }
}

// ===== OpenAI =====

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Inputs are cut here to stay under the model's token limit
const MAX_INPUT_CHARS: usize = 16_000;
const OPENAI_MAX_BATCH: usize = 256;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    organization: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiBackend {
    pub fn new(secrets: &OpenAiSecrets) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SearchError::Backend(format!("failed to build HTTP client: {}", e)))?;

        let base_url = secrets
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL);

        Ok(Self {
            client,
            endpoint: embeddings_endpoint(base_url),
            api_key: secrets.api_key.clone(),
            organization: secrets.organization.clone().filter(|o| !o.is_empty()),
            model: secrets
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}

fn embeddings_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/embeddings") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/embeddings", base)
    } else {
        format!("{}/v1/embeddings", base)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Reorder response rows by their `index` and check count and dimension
fn collect_vectors(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(SearchError::MalformedResponse(format!(
            "expected {} vectors, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    for (pos, d) in data.iter().enumerate() {
        if d.index != pos {
            return Err(SearchError::MalformedResponse(format!(
                "missing vector for input {}",
                pos
            )));
        }
    }

    let dim = data.first().map(|d| d.embedding.len()).unwrap_or(0);
    if data.iter().any(|d| d.embedding.is_empty() || d.embedding.len() != dim) {
        return Err(SearchError::MalformedResponse(
            "vectors have inconsistent dimensions".to_string(),
        ));
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        OPENAI_MAX_BATCH
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts
                .iter()
                .map(|t| truncate_chars(t, MAX_INPUT_CHARS))
                .collect(),
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Backend(format!(
                "API returned {}: {}",
                status,
                truncate_chars(&body, 500)
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| SearchError::MalformedResponse(e.to_string()))?;

        collect_vectors(parsed.data, texts.len())
    }
}

// ===== Harmonic Token Projection =====

/// Output dimension: a sin/cos pair per modulus
pub const HARMONIC_DIM: usize = 384;
const HARMONIC_MODULI: usize = HARMONIC_DIM / 2;
/// Code points considered per token
const MAX_TOKEN_CHARS: usize = 64;

pub struct HarmonicBackend {
    moduli: Vec<u64>,
    name: String,
}

impl HarmonicBackend {
    pub fn new() -> Self {
        Self {
            moduli: first_primes(HARMONIC_MODULI),
            name: format!("harmonic-{}", HARMONIC_DIM),
        }
    }

    /// Mean of the token projections, L2 normalized
    fn project(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f64; HARMONIC_DIM];
        let mut count = 0usize;

        for token in tokenize(text) {
            let n = token_value(&token);
            for (i, &m) in self.moduli.iter().enumerate() {
                let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
                sum[2 * i] += theta.sin();
                sum[2 * i + 1] += theta.cos();
            }
            count += 1;
        }

        if count == 0 {
            return vec![0.0; HARMONIC_DIM];
        }

        let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return sum.into_iter().map(|x| x as f32).collect();
        }
        sum.into_iter().map(|x| (x / norm) as f32).collect()
    }
}

impl Default for HarmonicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBackend for HarmonicBackend {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn max_batch_size(&self) -> usize {
        1024
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.project(t)).collect())
    }
}

fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// Base-2^16 positional value of the token's code points (wrapping)
fn token_value(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_CHARS)
        .fold(0u64, |n, c| n.wrapping_mul(65_536).wrapping_add(c as u64))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}
