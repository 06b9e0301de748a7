mod helpers;

use groundwork::RagError;
use helpers::{embedding_body, test_config, test_embedder};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn second_embed_of_same_text_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer sk-embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.5, 0.25])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, governor) = test_embedder(&config);

    let first = embedder.embed("What should I eat after a 16-hour fast?").await.unwrap();
    let second = embedder.embed("What should I eat after a 16-hour fast?").await.unwrap();

    assert_eq!(first, vec![0.5, 0.25]);
    assert_eq!(first, second);

    let stats = governor.usage_stats();
    assert_eq!(stats.total_embeddings, 1);
    assert_eq!(stats.prompt_tokens, 12);
    assert_eq!(stats.total_tokens_used, 12);
    assert_eq!(embedder.cache().stats().hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_embeds_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(embedding_body(&[1.0, 0.0]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, governor) = test_embedder(&config);

    let a = {
        let e = Arc::clone(&embedder);
        tokio::spawn(async move { e.embed("magnesium before bed").await })
    };
    let b = {
        let e = Arc::clone(&embedder);
        tokio::spawn(async move { e.embed("magnesium before bed").await })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a, b);
    assert_eq!(governor.usage_stats().total_embeddings, 1);
    assert_eq!(governor.window_status().embedding_requests, 1);
}

#[tokio::test]
async fn retries_once_after_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.3])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, governor) = test_embedder(&config);

    assert_eq!(embedder.embed("sleep hygiene").await.unwrap(), vec![0.3]);
    // The retry is part of the same logical request
    assert_eq!(governor.window_status().embedding_requests, 1);
}

#[tokio::test]
async fn second_429_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, governor) = test_embedder(&config);

    let err = embedder.embed("sleep hygiene").await.unwrap_err();
    assert!(matches!(err, RagError::RateLimited { ref body } if body == "quota"));
    assert_eq!(governor.usage_stats().total_embeddings, 0);
    assert!(embedder.cache().is_empty());
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, _governor) = test_embedder(&config);

    match embedder.embed("hydration").await.unwrap_err() {
        RagError::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_vector_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let (embedder, _governor) = test_embedder(&config);

    assert!(matches!(
        embedder.embed("hydration").await.unwrap_err(),
        RagError::Parse(_)
    ));
}

#[tokio::test]
async fn request_over_window_cap_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1])))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.governor.max_daily_embedding_requests = 3;
    let (embedder, _governor) = test_embedder(&config);

    for text in ["one", "two", "three"] {
        embedder.embed(text).await.unwrap();
    }
    let err = embedder.embed("four").await.unwrap_err();
    assert!(matches!(
        err,
        RagError::RateLimitExceeded { limit: 3, .. }
    ));
}

#[tokio::test]
async fn exhausted_budget_rejects_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1])))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.governor.daily_budget = 1.0;
    let (embedder, governor) = test_embedder(&config);

    // gpt-4: 40K prompt tokens at $0.03/1K = $1.20
    governor.record_chat("gpt-4", 40_000, 0, 10);
    let before = governor.usage_stats();

    for _ in 0..3 {
        let err = embedder.embed("protein after fasting").await.unwrap_err();
        assert!(matches!(err, RagError::BudgetExceeded { .. }));
    }

    let after = governor.usage_stats();
    assert_eq!(after.total_embeddings, 0);
    assert_eq!(after.estimated_cost, before.estimated_cost);
}
