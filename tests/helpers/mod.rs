#![allow(dead_code)]

use chrono::{Duration, Utc};
use groundwork::completion::{Completer, OpenAiCompletionClient};
use groundwork::config::GroundworkConfig;
use groundwork::embedding::remote::RemoteEmbeddingProvider;
use groundwork::embedding::{Embedder, EmbeddingCache};
use groundwork::governor::{Governor, MemoryUsageStore};
use groundwork::RagPipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Phrase only the concept-expansion prompt contains.
pub const CONCEPT_PROMPT_MARKER: &str = "closely related concepts";

/// Config pointing every provider at `base`, with keys set and no retry delay.
pub fn test_config(base: &str) -> GroundworkConfig {
    let mut config = GroundworkConfig::default();
    config.embedding.base_url = base.to_string();
    config.embedding.api_key = "sk-embed".into();
    config.completion.base_url = base.to_string();
    config.completion.api_key = "sk-chat".into();
    config.index.base_url = base.to_string();
    config.index.api_key = "idx-key".into();
    config.governor.rate_limit_backoff_seconds = 0;
    config.governor.request_timeout_seconds = 5;
    config
}

/// Governed embedder backed by the HTTP provider, with an isolated governor.
pub fn test_embedder(config: &GroundworkConfig) -> (Arc<Embedder>, Arc<Governor>) {
    let governor = Arc::new(Governor::in_memory(config.governor.clone()));
    let provider = RemoteEmbeddingProvider::new(&config.embedding, &config.governor).unwrap();
    let embedder = Arc::new(Embedder::new(
        Arc::new(provider),
        Arc::new(EmbeddingCache::new(&config.cache)),
        Arc::clone(&governor),
    ));
    (embedder, governor)
}

pub fn test_completer(config: &GroundworkConfig) -> (Completer, Arc<Governor>) {
    let governor = Arc::new(Governor::in_memory(config.governor.clone()));
    let client = OpenAiCompletionClient::new(&config.completion, &config.governor).unwrap();
    let completer = Completer::new(Arc::new(client), Arc::clone(&governor), &config.completion);
    (completer, governor)
}

pub fn test_pipeline(config: &GroundworkConfig) -> RagPipeline {
    RagPipeline::from_config(config, Arc::new(MemoryUsageStore::new())).unwrap()
}

pub fn embedding_body(vector: &[f32]) -> Value {
    json!({
        "data": [{ "embedding": vector }],
        "usage": { "prompt_tokens": 12, "total_tokens": 12 },
        "model": "text-embedding-3-small"
    })
}

pub fn chat_body(text: &str, model: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }],
        "usage": { "prompt_tokens": 200, "completion_tokens": 50 },
        "model": model
    })
}

pub fn index_body(matches: Vec<Value>) -> Value {
    json!({ "matches": matches })
}

/// One index match with typed metadata. `age_days` sets `createdAt`.
pub fn index_match(id: &str, score: f64, category: &str, content: &str, age_days: i64) -> Value {
    json!({
        "id": id,
        "score": score,
        "metadata": {
            "title": format!("Doc {id}"),
            "content": content,
            "category": category,
            "source": "test-suite",
            "confidenceScore": 0.9,
            "tags": [],
            "createdAt": (Utc::now() - Duration::days(age_days)).to_rfc3339()
        }
    })
}

pub async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2, 0.3])))
        .mount(server)
        .await;
}

pub async fn mount_concepts(server: &MockServer, concepts: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(CONCEPT_PROMPT_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(concepts, "gpt-4o-mini")))
        .mount(server)
        .await;
}

pub async fn mount_answer(server: &MockServer, answer: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(answer, "gpt-4o")))
        .mount(server)
        .await;
}

pub async fn mount_index(server: &MockServer, matches: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_body(matches)))
        .mount(server)
        .await;
}

/// JSON bodies of every request the server saw on `route`, in order.
pub async fn bodies_for(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == route)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
