use crate::model::OutcomeMessage;
use crate::publisher::{BusClient, PublishError};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::post,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use url::Url;

/// Bus that keeps every published message in memory.
#[derive(Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<OutcomeMessage>>,
    published: Notify,
}

impl RecordingBus {
    pub fn messages(&self) -> Vec<OutcomeMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Waits until at least `count` messages were published.
    pub async fn wait_for(&self, count: usize) -> Vec<OutcomeMessage> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.published.notified();
                let messages = self.messages();
                if messages.len() >= count {
                    return messages;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for published messages")
    }
}

#[async_trait]
impl BusClient for RecordingBus {
    async fn publish(&self, message: &OutcomeMessage) -> Result<(), PublishError> {
        self.messages.lock().unwrap().push(message.clone());
        self.published.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Bus that refuses every message with the same error.
pub struct FailingBus {
    error: PublishError,
    attempts: AtomicUsize,
}

impl FailingBus {
    pub fn new(error: PublishError) -> Self {
        FailingBus {
            error,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusClient for FailingBus {
    async fn publish(&self, _message: &OutcomeMessage) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn ping(&self) -> Result<(), PublishError> {
        Err(self.error.clone())
    }
}

/// Bus that never answers within a reasonable time.
pub struct SlowBus {
    delay: Duration,
}

impl SlowBus {
    pub fn new(delay: Duration) -> Self {
        SlowBus { delay }
    }
}

#[async_trait]
impl BusClient for SlowBus {
    async fn publish(&self, _message: &OutcomeMessage) -> Result<(), PublishError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), PublishError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ReceivedCall {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Stand-in for the Log Detective API.
///
/// - `POST /ok` answers `{"status": "ok"}`
/// - `POST /error` answers 500
/// - `POST /garbage` answers 200 with a body that is not JSON
/// - `POST /slow` answers after three seconds
pub struct MockLogDetective {
    base: Url,
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
}

impl MockLogDetective {
    pub async fn spawn() -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/ok", post(ok_handler))
            .route("/error", post(error_handler))
            .route("/garbage", post(garbage_handler))
            .route("/slow", post(slow_handler))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockLogDetective {
            base: Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            calls,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().unwrap().clone()
    }
}

type Calls = Arc<Mutex<Vec<ReceivedCall>>>;

fn record(calls: &Calls, headers: &HeaderMap, body: serde_json::Value) {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    calls.lock().unwrap().push(ReceivedCall {
        authorization,
        body,
    });
}

async fn ok_handler(
    State(calls): State<Calls>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    record(&calls, &headers, body);
    Json(serde_json::json!({"status": "ok"}))
}

async fn error_handler(
    State(calls): State<Calls>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, &'static str) {
    record(&calls, &headers, body);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn garbage_handler(
    State(calls): State<Calls>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> &'static str {
    record(&calls, &headers, body);
    "not json"
}

async fn slow_handler(
    State(calls): State<Calls>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    record(&calls, &headers, body);
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(serde_json::json!({"status": "late"}))
}

/// Address nothing is listening on.
pub async fn unused_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}/analyze")).unwrap()
}
