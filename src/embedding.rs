//! Batched client for the remote embedding service.
//!
//! Sends `{ "texts": [...] }` to `POST <EMBED_BASE_URL>/embed` and expects
//! `{ "vectors": [[f32; 384], ...] }` with one vector per input. Inputs are
//! split into batches to bound payload size; batches go out sequentially so
//! peak memory stays flat and the remote service is never flooded.
//!
//! A failing batch (HTTP error, wrong count, wrong vector length, malformed
//! body) degrades to zero vectors for that batch instead of failing the
//! call. Positional correspondence with the input is preserved either way,
//! which is what the rest of the pipeline relies on; zero vectors pass the
//! storage dimension check and are picked up later by reprocessing.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crate::config::{EmbedConfig, VECTOR_DIM};

pub struct EmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(config: &EmbedConfig) -> Result<EmbeddingClient> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(EmbeddingClient {
            http,
            endpoint: format!("{}/embed", config.base_url.trim_end_matches('/')),
            batch_size: config.batch_size,
        })
    }

    /// Embed `texts`, returning one vector per input in input order.
    /// Never fails: degraded batches come back as zeros.
    pub async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            match self.embed_batch(batch).await {
                Some(vectors) => out.extend(vectors),
                None => {
                    tracing::warn!(
                        batch_len = batch.len(),
                        "embedder batch degraded to zero vectors"
                    );
                    out.extend(batch.iter().map(|_| vec![0.0f32; VECTOR_DIM]));
                }
            }
        }
        out
    }

    async fn embed_batch(&self, batch: &[String]) -> Option<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "texts": batch });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "embedder returned non-OK");
            return None;
        }
        let json: Value = response.json().await.ok()?;
        parse_vectors(&json, batch.len())
    }
}

/// Extract `vectors` from the response body. Returns `None` (degrade) when
/// the count differs from `expected`, any vector has the wrong length, or
/// the shape is not a nested numeric array.
fn parse_vectors(json: &Value, expected: usize) -> Option<Vec<Vec<f32>>> {
    let vectors = json.get("vectors")?.as_array()?;
    if vectors.len() != expected {
        return None;
    }
    let mut out = Vec::with_capacity(vectors.len());
    for vector in vectors {
        let values = vector.as_array()?;
        if values.len() != VECTOR_DIM {
            return None;
        }
        let mut v = Vec::with_capacity(values.len());
        for value in values {
            v.push(value.as_f64()? as f32);
        }
        out.push(v);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors_json(count: usize, dim: usize) -> Value {
        let vectors: Vec<Vec<f64>> = (0..count).map(|i| vec![i as f64 * 0.1; dim]).collect();
        serde_json::json!({ "vectors": vectors })
    }

    #[test]
    fn parse_accepts_matching_count_and_dim() {
        let json = vectors_json(3, VECTOR_DIM);
        let parsed = parse_vectors(&json, 3).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].len(), VECTOR_DIM);
        assert!((parsed[2][0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn parse_rejects_count_mismatch() {
        let json = vectors_json(2, VECTOR_DIM);
        assert!(parse_vectors(&json, 3).is_none());
    }

    #[test]
    fn parse_rejects_wrong_dimension() {
        let json = vectors_json(2, VECTOR_DIM - 1);
        assert!(parse_vectors(&json, 2).is_none());
    }

    #[test]
    fn parse_rejects_malformed_shapes() {
        assert!(parse_vectors(&serde_json::json!({}), 1).is_none());
        assert!(parse_vectors(&serde_json::json!({ "vectors": "nope" }), 1).is_none());
        assert!(parse_vectors(&serde_json::json!({ "vectors": [["a", "b"]] }), 1).is_none());
    }
}
