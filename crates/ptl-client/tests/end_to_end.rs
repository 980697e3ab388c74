//! End-to-end tests: a real `PtlClient` against a real `PtlServer`.
//!
//! Most tests use an in-process loopback transport that feeds the serialized
//! request through `PtlServer::handle_http`, so they exercise the same
//! pipeline as the HTTP endpoint without a socket.  The last tests bind the
//! axum endpoint on an ephemeral port and talk to it with `HttpTransport`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use ptl_client::{
    ClientConfig, ClientError, HookEvent, HookListener, PtlClient, Transport, TransportError,
};
use ptl_core::{Action, PtlError, RequestEnvelope, ResponseEnvelope};
use ptl_server::demo::demo_server;
use ptl_server::domain::{Layer, Object, Schema, Variable};
use ptl_server::infrastructure::http;
use ptl_server::PtlServer;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Transport that hands the request to an in-process server.
struct Loopback {
    server: Arc<PtlServer>,
    posts: AtomicUsize,
}

#[async_trait]
impl Transport for Loopback {
    async fn post(
        &self,
        url: &str,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, TransportError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.server.handle_http("POST", &body).await.body)
    }
}

/// A second layer with writable, write-only and object properties.
fn scratch_layer() -> Layer {
    Layer::new(
        "scratch",
        Schema::new()
            .with("x", Variable::number(0))
            .with("secret", Variable::string("").writeonly())
            .with(
                "point",
                Object::new(
                    Schema::new()
                        .with("x", Variable::number(1))
                        .with("y", Variable::number(2)),
                ),
            )
            .with(
                "frame",
                Object::new(
                    Schema::new().with("label", Variable::string("f")).with(
                        "origin",
                        Object::new(
                            Schema::new()
                                .with("x", Variable::number(0))
                                .with("y", Variable::number(0)),
                        ),
                    ),
                ),
            ),
    )
}

fn server() -> Arc<PtlServer> {
    Arc::new(demo_server("0.0.1").unwrap().add_layer(scratch_layer()))
}

fn loopback_client(server: Arc<PtlServer>, version: &str) -> (PtlClient, Arc<Loopback>) {
    let transport = Arc::new(Loopback {
        server,
        posts: AtomicUsize::new(0),
    });
    let client = PtlClient::new(
        ClientConfig::default().with_protocol_version(version),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    (client, transport)
}

async fn synced_client() -> (PtlClient, Arc<Loopback>) {
    let (client, transport) = loopback_client(server(), "0.0.1");
    client.sync().await.unwrap();
    (client, transport)
}

async fn login(client: &PtlClient, username: &str, password: &str) -> Value {
    client
        .call(
            "api/auth",
            vec![json!({"username": username, "password": password})],
        )
        .await
        .unwrap()
}

// ── Sync ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sync_mirrors_every_visible_property() {
    // Arrange
    let (client, _transport) = loopback_client(server(), "0.0.1");

    // Act
    let layers = client.sync().await.unwrap();

    // Assert
    let names: Vec<&str> = layers.iter().map(|l| l.name()).collect();
    assert_eq!(names, ["api", "scratch"]);
    let api = client.layer("api").unwrap();
    assert_eq!(
        api.schema().names().collect::<Vec<_>>(),
        ["counter", "title", "increment", "reset", "echo", "time", "auth", "logout"]
    );
    assert!(api.get_property("tokens").is_err());
    assert!(api.method("time").unwrap().is_arrow());
    assert_eq!(api.variable("title").unwrap().get().unwrap(), json!("ptl test"));
    assert_eq!(
        client.layer("scratch").unwrap().snapshot()["point"],
        json!({"x": 1, "y": 2})
    );
}

// ── Scenario A: calls patch the mirror ────────────────────────────────────────

#[tokio::test]
async fn test_increment_three_times_updates_result_and_mirror() {
    // Arrange
    let (client, _transport) = synced_client().await;
    login(&client, "alice", "222").await;
    let api = client.layer("api").unwrap();
    let increment = api.method("increment").unwrap();

    for expected in 1..=3 {
        // Act
        let returned = increment.call(vec![]).await.unwrap();

        // Assert
        assert_eq!(returned, json!(expected));
        assert_eq!(api.variable("counter").unwrap().get().unwrap(), json!(expected));
    }
}

#[tokio::test]
async fn test_auth_token_lives_in_the_context_until_logout() {
    let (client, _transport) = synced_client().await;

    let session = login(&client, "bob", "111").await;
    let token = client.context().get("token").cloned();
    client.call("api/logout", vec![]).await.unwrap();

    assert_eq!(session, json!({"username": "bob", "roles": ["admin", "user"]}));
    assert!(matches!(token, Some(Value::String(_))));
    assert_eq!(client.context().get("token"), Some(&Value::Null));
}

#[tokio::test]
async fn test_wrong_credentials_reject_only_that_call() {
    let (client, _transport) = synced_client().await;

    let err = client
        .call("api/auth", vec![json!({"username": "bob", "password": "nope"})])
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(401));
    assert!(client.context().get("token").is_none());
}

// ── Scenario B: buffered writes ───────────────────────────────────────────────

#[tokio::test]
async fn test_buffered_set_travels_in_one_batch() {
    // Arrange
    let (client, transport) = synced_client().await;
    let scratch = client.layer("scratch").unwrap();
    let x = scratch.variable("x").unwrap();
    let posts_before = transport.posts.load(Ordering::SeqCst);

    // Act
    client.start_buffering();
    let write = x.set(json!(8));
    let echo = client.call("api/echo", vec![json!("hi")]);
    let outcomes = client.stop_buffering_and_flush().await.unwrap();

    // Assert
    assert_eq!(outcomes.len(), 2);
    assert_eq!(write.await.unwrap(), json!(8));
    assert_eq!(echo.await.unwrap(), json!(["hi"]));
    assert_eq!(x.get().unwrap(), json!(8));
    assert_eq!(transport.posts.load(Ordering::SeqCst), posts_before + 1);
}

#[tokio::test]
async fn test_mixed_batch_yields_one_outcome_per_action() {
    // Arrange
    let (client, _transport) = synced_client().await;
    client.start_buffering();
    let actions = [
        client.get_property_value("api/title"),
        client.call("api/reset", vec![]),
        client.get_property_value("api/nope"),
        client.make_request(Action::new("api/title", ptl_core::ActionKind::Get, vec![])),
    ];

    // Act
    let outcomes = client.stop_buffering_and_flush().await.unwrap();

    // Assert
    assert_eq!(outcomes.len(), 4);
    let [title, reset, missing, again] = actions;
    assert_eq!(title.await.unwrap(), json!("ptl test"));
    assert_eq!(reset.await.unwrap_err().code(), Some(403));
    assert_eq!(missing.await.unwrap_err().code(), Some(404));
    assert_eq!(again.await.unwrap(), json!("ptl test"));
}

// ── Scenario C: permissions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_write_only_property_cannot_be_read() {
    // Arrange
    let (client, transport) = synced_client().await;
    let secret = client.layer("scratch").unwrap().variable("secret").unwrap().clone();
    let posts_before = transport.posts.load(Ordering::SeqCst);

    // Act
    let local = secret.get();
    let written = secret.set(json!("hunter2")).await.unwrap();
    let remote = client.get_property_value("scratch/secret").await;

    // Assert
    assert_eq!(local.unwrap_err().code(), Some(403));
    assert_eq!(written, Value::Null);
    assert_eq!(remote.unwrap_err().code(), Some(403));
    assert_eq!(transport.posts.load(Ordering::SeqCst), posts_before + 2);
}

#[tokio::test]
async fn test_read_only_write_is_rejected_locally_and_remotely() {
    let (client, transport) = synced_client().await;
    let counter = client.layer("api").unwrap().variable("counter").unwrap().clone();
    let posts_before = transport.posts.load(Ordering::SeqCst);

    let local = counter.set(json!(100)).await;
    let remote = client.set_property_value("api/counter", json!(100)).await;

    assert_eq!(local.unwrap_err().code(), Some(403));
    assert_eq!(remote.unwrap_err().code(), Some(403));
    assert_eq!(transport.posts.load(Ordering::SeqCst), posts_before + 1);
    assert_eq!(counter.get().unwrap(), json!(0));
}

// ── Objects ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_object_update_is_rejected() {
    // Arrange
    let (client, _transport) = synced_client().await;
    let scratch = client.layer("scratch").unwrap();
    let point = scratch.object("point").unwrap();

    // Act
    let local = point.set(json!({"x": 5})).await;
    let remote = client.set_property_value("scratch/point", json!({"x": 5})).await;

    // Assert
    assert!(matches!(local.unwrap_err(), ClientError::Ptl(PtlError::Type(_))));
    assert!(remote.is_err());
    assert_eq!(point.get().unwrap(), json!({"x": 1, "y": 2}));
}

#[tokio::test]
async fn test_whole_object_update_reaches_children() {
    let (client, _transport) = synced_client().await;
    let scratch = client.layer("scratch").unwrap();

    scratch.object("point").unwrap().set(json!({"x": 5, "y": 6})).await.unwrap();

    assert_eq!(scratch.variable("point.y").unwrap().get().unwrap(), json!(6));
}

#[tokio::test]
async fn test_nested_object_update_reaches_grandchildren() {
    // Arrange
    let (client, _transport) = synced_client().await;
    let scratch = client.layer("scratch").unwrap();
    let value = json!({"label": "g", "origin": {"x": 3, "y": 4}});

    // Act
    let stored = client.set_property_value("scratch/frame", value.clone()).await;
    let reread = client.get_property_value("scratch/frame").await;

    // Assert
    assert_eq!(stored.unwrap(), value);
    assert_eq!(reread.unwrap(), value);
    assert_eq!(scratch.variable("frame.origin.x").unwrap().get().unwrap(), json!(3));
    assert_eq!(scratch.object("frame").unwrap().get().unwrap(), value);
}

// ── Scenario D: version mismatch ──────────────────────────────────────────────

#[tokio::test]
async fn test_foreign_version_fails_every_caller() {
    // Arrange
    let (client, _transport) = loopback_client(server(), "9.9.9");

    // Act
    let err = client.sync().await.unwrap_err();

    // Assert
    assert_eq!(
        err,
        ClientError::VersionMismatch {
            expected: "res@9.9.9".into(),
            got: "res@0.0.1".into(),
        }
    );
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_after_response_hook_runs_once_per_batch() {
    let (client, _transport) = synced_client().await;
    let batches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&batches);
    client
        .add_hook_listener("afterResponseProcessed", move |_: &PtlClient, event: &HookEvent| {
            if matches!(event, HookEvent::AfterResponseProcessed(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let (a, b) = tokio::join!(
        client.get_property_value("api/title"),
        client.call("api/time", vec![])
    );

    assert!(a.is_ok() && b.unwrap().is_u64());
    assert_eq!(batches.load(Ordering::SeqCst), 1);
}

/// Reads the title from inside the hook, once.
struct ReadTitleOnce {
    fired: AtomicBool,
    title: Arc<Mutex<Option<Value>>>,
}

#[async_trait]
impl HookListener for ReadTitleOnce {
    async fn on_event(&self, client: &PtlClient, _event: &HookEvent) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let title = client.get_property_value("api/title").await.ok();
        if let Ok(mut slot) = self.title.lock() {
            *slot = title;
        }
    }
}

#[tokio::test]
async fn test_hook_listener_request_does_not_block_the_batch() {
    // Arrange
    let (client, transport) = synced_client().await;
    let title = Arc::new(Mutex::new(None));
    client
        .add_hook_listener(
            "afterResponseProcessed",
            ReadTitleOnce {
                fired: AtomicBool::new(false),
                title: Arc::clone(&title),
            },
        )
        .unwrap();

    // Act
    let counter = tokio::time::timeout(
        Duration::from_secs(3),
        client.get_property_value("api/counter"),
    )
    .await;

    // Assert
    assert_eq!(counter.expect("request should not hang").unwrap(), json!(0));
    assert_eq!(*title.lock().unwrap(), Some(json!("ptl test")));
    assert_eq!(transport.posts.load(Ordering::SeqCst), 3);
}

// ── Over HTTP ─────────────────────────────────────────────────────────────────

struct Running {
    url: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn start() -> Running {
    let server = server();
    let (listener, addr) = http::bind("127.0.0.1", 0).await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        http::serve(listener, server, "/ptl", async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    Running {
        url: format!("http://{addr}/ptl"),
        stop: Some(tx),
    }
}

#[tokio::test]
async fn test_http_client_syncs_and_calls() {
    // Arrange
    let running = start().await;
    let client = PtlClient::http(ClientConfig::new(&running.url));

    // Act
    client.sync().await.unwrap();
    login(&client, "alice", "222").await;
    let counter = client.call("api/increment", vec![]).await.unwrap();

    // Assert
    assert_eq!(counter, json!(1));
    let api = client.layer("api").unwrap();
    assert_eq!(api.variable("counter").unwrap().get().unwrap(), json!(1));
}

#[tokio::test]
async fn test_http_version_mismatch_is_reported() {
    let running = start().await;
    let client = PtlClient::http(ClientConfig::new(&running.url).with_protocol_version("9.9.9"));

    let err = client.call("api/time", vec![]).await.unwrap_err();

    assert!(matches!(err, ClientError::VersionMismatch { .. }));
}
