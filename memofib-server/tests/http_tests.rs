// HTTP Endpoint Tests
// Runs the router on an ephemeral port and drives it with reqwest

use memofib_server::cache::memory::{MemoryCache, MemoryConfig};
use memofib_server::config::ServerConfig;
use memofib_server::{
    AppState, BackendModule, BackendRegistry, Cache, CacheError, Factory, FibService,
    build_state, create_router,
};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Memory cache that records its own hits and misses
struct CountingCache {
    inner: MemoryCache,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CountingCache {
    fn new() -> Self {
        Self {
            inner: MemoryCache::new(MemoryConfig::default(), Span::none()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }
}

impl Cache for CountingCache {
    fn set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner.set(ctx, key, value, ttl)
    }

    fn get(&self, ctx: &CancellationToken, key: &str) -> Result<String, CacheError> {
        let result = self.inner.get(ctx, key);
        let counter = if result.is_ok() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Cache whose lookups take longer than the client is willing to wait
struct SlowCache;

impl Cache for SlowCache {
    fn set(&self, _: &CancellationToken, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _: &CancellationToken, _: &str) -> Result<String, CacheError> {
        std::thread::sleep(Duration::from_millis(300));
        Err(CacheError::NotFound)
    }
}

fn slow_factory(_log: Span) -> anyhow::Result<Arc<dyn Cache>> {
    Ok(Arc::new(SlowCache))
}

fn test_registry() -> BackendRegistry {
    BackendRegistry::builtin()
        .with_module(
            "slow",
            BackendModule::new().export("Factory", slow_factory as Factory),
        )
}

async fn spawn_test_server(state: AppState) -> String {
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    url
}

async fn spawn_with_backend(module: &str) -> String {
    let mut config = ServerConfig::default();
    config.cache.backend.module = module.to_string();
    let state = build_state(&config, &test_registry()).unwrap();
    spawn_test_server(state).await
}

#[tokio::test]
async fn test_fib_returns_result() {
    let base_url = spawn_with_backend("").await;
    let client = Client::new();

    for (n, want) in [(0, 0), (1, 1), (10, 55), (20, 6765)] {
        let response = client
            .get(format!("{}/fib/{}", base_url, n))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["result"], want);
    }
}

#[tokio::test]
async fn test_invalid_value_returns_400() {
    let base_url = spawn_with_backend("").await;
    let client = Client::new();

    for param in ["abc", "1e3", "-"] {
        let response = client
            .get(format!("{}/fib/{}", base_url, param))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.text().await.unwrap(), r#"{"error":"invalid value"}"#);
    }
}

#[tokio::test]
async fn test_repeated_request_hits_cache() {
    let cache = Arc::new(CountingCache::new());
    let state = AppState {
        fib: FibService::new(cache.clone(), Duration::from_secs(15)),
    };
    let base_url = spawn_test_server(state).await;
    let client = Client::new();

    let mut results = Vec::new();
    for _ in 0..2 {
        let body: serde_json::Value = client
            .get(format!("{}/fib/18", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        results.push(body["result"].as_i64().unwrap());
    }

    assert_eq!(results, vec![2584, 2584]);
    assert_eq!(cache.misses.load(Ordering::SeqCst), 1);
    assert_eq!(cache.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_keys_each_miss() {
    let cache = Arc::new(CountingCache::new());
    let state = AppState {
        fib: FibService::new(cache.clone(), Duration::from_secs(15)),
    };
    let base_url = spawn_test_server(state).await;
    let client = Client::new();

    for n in [5, 6, 7] {
        let response = client
            .get(format!("{}/fib/{}", base_url, n))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(cache.misses.load(Ordering::SeqCst), 3);
    assert_eq!(cache.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_memory_backend_end_to_end() {
    let base_url = spawn_with_backend("memory").await;
    let client = Client::new();

    for _ in 0..3 {
        let body: serde_json::Value = client
            .get(format!("{}/fib/25", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["result"], 75025);
    }
}

#[tokio::test]
async fn test_client_disconnect_does_not_crash() {
    let base_url = spawn_with_backend("slow").await;

    let impatient = Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let result = impatient.get(format!("{}/fib/10", base_url)).send().await;
    assert!(result.is_err());

    // The server keeps serving after the abandoned request
    let response = Client::new()
        .get(format!("{}/fib/10", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"], 55);
}

#[tokio::test]
async fn test_request_timeout_returns_empty_503() {
    let mut config = ServerConfig::default();
    config.cache.backend.module = "slow".to_string();
    config.server.request_timeout = Some(Duration::from_millis(50));
    let state = build_state(&config, &test_registry()).unwrap();
    let base_url = spawn_test_server(state).await;

    let response = Client::new()
        .get(format!("{}/fib/10", base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let base_url = spawn_with_backend("").await;

    let response = Client::new()
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "memofib");
}
