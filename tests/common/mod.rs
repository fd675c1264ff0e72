#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use quickadd_sync::config::Config;
use quickadd_sync::hub::Outbound;
use quickadd_sync::models::QueueItem;
use quickadd_sync::scheduler::RetryPolicy;
use quickadd_sync::state::SharedState;
use quickadd_sync::sync::{
    CredentialError, CredentialSource, Deliverer, DeliveryError, Notifier, QueueProcessor,
    RemoteRecord, SyncEvent,
};

// ── Store ───────────────────────────────────────────────────────

/// A migrated queue database in a temporary directory.
pub struct TestDb {
    pub pool: SqlitePool,
    pub url: String,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let pool = quickadd_sync::db::connect(&url)
        .await
        .expect("Failed to open test database");
    TestDb {
        pool,
        url,
        _dir: dir,
    }
}

// ── Fakes ───────────────────────────────────────────────────────

/// Hands out a fixed answer and counts how often it was asked.
pub struct FakeCredentials {
    answer: Result<Option<String>, CredentialError>,
    calls: AtomicUsize,
}

impl FakeCredentials {
    pub fn token(token: &str) -> Arc<Self> {
        Self::answering(Ok(Some(token.to_string())))
    }

    pub fn answering(answer: Result<Option<String>, CredentialError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn request_token(&self) -> Result<Option<String>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Status(u16),
    Unauthorized,
}

/// Delivers according to a per-url behavior (default: succeed) and records every attempt.
pub struct FakeDeliverer {
    behaviors: Mutex<HashMap<String, Behavior>>,
    attempts: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeDeliverer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, url: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// Urls in the order they were attempted.
    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }
}

#[async_trait]
impl Deliverer for FakeDeliverer {
    async fn deliver(
        &self,
        item: &QueueItem,
        token: Option<&str>,
    ) -> Result<RemoteRecord, DeliveryError> {
        self.attempts
            .lock()
            .unwrap()
            .push((item.url.clone(), token.map(str::to_string)));

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&item.url)
            .copied()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(RemoteRecord {
                id: Some(item.id),
                link: Some(item.url.clone()),
            }),
            Behavior::Status(code) => Err(DeliveryError::Status(code)),
            Behavior::Unauthorized => Err(DeliveryError::Unauthorized),
        }
    }
}

/// What a [`MeddlingDeliverer`] does to the store while delivering its target url.
#[derive(Debug, Clone, Copy)]
pub enum Meddle {
    /// Delete the item being delivered, as the API's delete endpoint would.
    DeleteItem,
    /// Close the pool so every later store call fails.
    ClosePool,
}

/// Touches the store behind the processor's back while delivering `target`, then answers 503.
/// Every other url is delivered.
pub struct MeddlingDeliverer {
    pool: SqlitePool,
    target: String,
    meddle: Meddle,
    attempts: Mutex<Vec<String>>,
}

impl MeddlingDeliverer {
    pub fn new(pool: &SqlitePool, target: &str, meddle: Meddle) -> Arc<Self> {
        Arc::new(Self {
            pool: pool.clone(),
            target: target.to_string(),
            meddle,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for MeddlingDeliverer {
    async fn deliver(
        &self,
        item: &QueueItem,
        _token: Option<&str>,
    ) -> Result<RemoteRecord, DeliveryError> {
        self.attempts.lock().unwrap().push(item.url.clone());

        if item.url != self.target {
            return Ok(RemoteRecord {
                id: Some(item.id),
                link: Some(item.url.clone()),
            });
        }

        match self.meddle {
            Meddle::DeleteItem => {
                assert!(quickadd_sync::db::queue::delete(&self.pool, item.id).await.unwrap());
            }
            Meddle::ClosePool => self.pool.close().await,
        }
        Err(DeliveryError::Status(503))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn processor(
    db: &TestDb,
    credentials: Arc<FakeCredentials>,
    deliverer: Arc<FakeDeliverer>,
    notifier: Arc<RecordingNotifier>,
) -> QueueProcessor {
    QueueProcessor::new(db.pool.clone(), credentials, deliverer, notifier)
}

// ── Fake remote API ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct FakeApiState {
    status: u16,
    body: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// A local stand-in for the bookmark API answering every create with `status` and `body`.
pub struct FakeApi {
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeApi {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn fake_create(
    State(state): State<FakeApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let status = StatusCode::from_u16(state.status).unwrap();
    (status, [(header::CONTENT_TYPE, "application/json")], state.body).into_response()
}

pub async fn spawn_fake_api(status: u16, body: &'static str) -> FakeApi {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = FakeApiState {
        status,
        body,
        requests: requests.clone(),
    };

    let app = axum::Router::new()
        .route("/rest/v1/raindrop", axum::routing::post(fake_create))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake API");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Fake API failed");
    });

    FakeApi {
        base: format!("http://{addr}/rest/v1"),
        requests,
    }
}

// ── Full app ────────────────────────────────────────────────────

/// A running service instance with its own database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: SharedState,
    pub client: Client,
    shutdown: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    _db: TestDb,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn enqueue(&self, url: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/queue"))
            .json(&json!({ "url": url }))
            .send()
            .await
            .expect("enqueue request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_json(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Connect a front-end that answers token requests with `token` and collects events.
    pub fn attach_front_end(&self, token: Option<&str>) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (_, mut outbound) = self.state.hub.connect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let token = token.map(str::to_string);

        tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                match msg {
                    Outbound::TokenRequest(reply) => {
                        let _ = reply.send(token.clone());
                    }
                    Outbound::Event(event) => {
                        let _ = events_tx.send(event);
                    }
                }
            }
        });

        events_rx
    }

    /// Poll the queue until `check` holds for the item list, or panic after a few seconds.
    pub async fn wait_for_items(&self, check: impl Fn(&[Value]) -> bool) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (body, _) = self.get_json("/api/v1/queue").await;
            let items = body["items"].as_array().cloned().unwrap_or_default();
            if check(&items) {
                return items;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue never reached expected state: {body}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the scheduler loop to exit.
    pub async fn stop(&mut self) {
        self.shutdown();
        tokio::time::timeout(Duration::from_secs(5), &mut self.scheduler)
            .await
            .expect("scheduler did not stop")
            .expect("scheduler task panicked");
    }
}

pub fn test_config(database_url: &str, api_base: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        api_base: api_base.to_string(),
        sync_tag: "sync-bookmarks".to_string(),
        token_timeout: Duration::from_secs(1),
        delivery_timeout: Duration::from_secs(5),
        stale_syncing_after: Duration::from_secs(300),
        // Failed runs are not re-fired during tests.
        retry: RetryPolicy {
            base_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            max_attempts: 1,
        },
        log_level: "warn".to_string(),
    }
}

/// Spawn the service against `api_base` with a fresh temporary database.
pub async fn spawn_app(api_base: &str) -> TestApp {
    let db = test_db().await;
    let config = test_config(&db.url, api_base);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (app, state, scheduler) = quickadd_sync::build_app(db.pool.clone(), config, shutdown_rx)
        .expect("Failed to build app");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        state,
        client: Client::new(),
        shutdown: shutdown_tx,
        scheduler,
        _db: db,
    }
}
