//! Embedding client behavior against a real HTTP double.

use studybuddy_ingest::config::{EmbedConfig, VECTOR_DIM};
use studybuddy_ingest::embedding::EmbeddingClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn client_for(server: &MockServer, batch_size: usize) -> EmbeddingClient {
    EmbeddingClient::new(&EmbedConfig {
        base_url: server.uri(),
        batch_size,
        timeout_secs: 5,
    })
    .unwrap()
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("text number {}", i)).collect()
}

/// Responds with one vector per requested text; the first component encodes
/// the position within the batch so ordering is observable.
struct EchoVectors;

impl Respond for EchoVectors {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let n = body["texts"].as_array().map(|a| a.len()).unwrap_or(0);
        let vectors: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let mut v = vec![0.0f32; VECTOR_DIM];
                v[0] = (i + 1) as f32;
                v
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "vectors": vectors }))
    }
}

#[tokio::test]
async fn healthy_embedder_returns_positional_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(EchoVectors)
        .mount(&server)
        .await;

    let client = client_for(&server, 4);
    let vectors = client.embed(&texts(6)).await;

    assert_eq!(vectors.len(), 6);
    assert!(vectors.iter().all(|v| v.len() == VECTOR_DIM));
    // Two batches of 4 and 2; positions restart per batch.
    assert_eq!(vectors[0][0], 1.0);
    assert_eq!(vectors[3][0], 4.0);
    assert_eq!(vectors[4][0], 1.0);
    assert_eq!(vectors[5][0], 2.0);
}

#[tokio::test]
async fn outage_degrades_every_batch_to_zeros() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server, 4);
    let vectors = client.embed(&texts(6)).await;

    assert_eq!(vectors.len(), 6);
    for v in &vectors {
        assert_eq!(v.len(), VECTOR_DIM);
        assert!(v.iter().all(|&x| x == 0.0));
    }
}

#[tokio::test]
async fn count_mismatch_degrades_to_zeros() {
    let server = MockServer::start().await;
    // Always one vector, whatever the batch size.
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "vectors": [vec![1.0f32; VECTOR_DIM]] }),
        ))
        .mount(&server)
        .await;

    let client = client_for(&server, 4);
    let vectors = client.embed(&texts(3)).await;

    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.iter().all(|&x| x == 0.0)));
}

#[tokio::test]
async fn empty_input_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(EchoVectors)
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, 4);
    let vectors = client.embed(&[]).await;
    assert!(vectors.is_empty());
}
