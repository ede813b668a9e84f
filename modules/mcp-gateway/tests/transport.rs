#![allow(clippy::unwrap_used, clippy::expect_used)]

//! The `/mcp` endpoint driven in-process: access gate on every call, session
//! binding, the event stream and per-tool scopes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, BodyDataStream};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use futures_util::StreamExt;
use mcp_gateway::{
    GatewayConfig, McpGateway, OperationDescriptor, OperationError, OperationSet,
    ProtectedOperation, SessionRegistry, SessionState,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use xaa_auth::{AccessGate, JwtValidator, StaticKeyProvider, ValidatorConfig, decoding_key_from_pem};
use xaa_security::SecurityContext;
use xaa_testkit::keys::ISSUER_PUBLIC_PEM;
use xaa_testkit::{TEST_AUDIENCE, TEST_ISSUER, TestToken};

const CONNECT_READ: &str = "mcp:connect mcp:tools:read";
const CONNECT_MANAGE: &str = "mcp:connect mcp:tools:read mcp:tools:manage";

struct Echo {
    descriptor: OperationDescriptor,
}

#[async_trait]
impl ProtectedOperation for Echo {
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, ctx: &SecurityContext, args: Value) -> Result<Value, OperationError> {
        Ok(json!({ "subject": ctx.subject(), "args": args }))
    }
}

struct Touch {
    descriptor: OperationDescriptor,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ProtectedOperation for Touch {
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _ctx: &SecurityContext, _args: Value) -> Result<Value, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "touched": true }))
    }
}

struct Harness {
    router: Router,
    registry: Arc<SessionRegistry>,
    touches: Arc<AtomicUsize>,
}

fn gate() -> AccessGate {
    let key = decoding_key_from_pem(jsonwebtoken::Algorithm::EdDSA, ISSUER_PUBLIC_PEM.as_bytes())
        .unwrap();
    let validator = JwtValidator::new(
        Arc::new(StaticKeyProvider::new().with_default_key(key)),
        ValidatorConfig::new(TEST_ISSUER),
    );
    AccessGate::new(Arc::new(validator), TEST_AUDIENCE)
}

fn harness_with(config: GatewayConfig) -> Harness {
    let touches = Arc::new(AtomicUsize::new(0));
    let operations = OperationSet::new(gate())
        .with(Arc::new(Echo {
            descriptor: OperationDescriptor::new("echo", "Echo arguments", json!({"type": "object"}))
                .requires("mcp:tools:read"),
        }))
        .with(Arc::new(Touch {
            descriptor: OperationDescriptor::new("touch", "Mutate something", json!({"type": "object"}))
                .requires("mcp:tools:manage")
                .updates("test://things"),
            calls: touches.clone(),
        }));
    let gateway = McpGateway::new(config, gate(), operations, TEST_ISSUER).unwrap();
    Harness {
        router: gateway.build_router(),
        registry: gateway.registry(),
        touches,
    }
}

fn harness() -> Harness {
    harness_with(GatewayConfig {
        public_url: Some(Url::parse("https://tools.example.test").unwrap()),
        ..GatewayConfig::default()
    })
}

fn token(subject: &str, scope: &str) -> String {
    TestToken::new(subject).scope(scope).sign()
}

fn rpc(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

fn request(method: Method, token: Option<&str>, session: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri("/mcp");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn initialize(&self, token: &str) -> String {
        let resp = self
            .send(request(
                Method::POST,
                Some(token),
                None,
                Some(&rpc(1, "initialize", json!({ "protocolVersion": "2025-06-18" }))),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        resp.headers()
            .get("mcp-session-id")
            .expect("initialize must return a session id")
            .to_str()
            .unwrap()
            .to_owned()
    }

    async fn call(&self, token: &str, session: &str, tool: &str) -> Value {
        let resp = self
            .send(request(
                Method::POST,
                Some(token),
                Some(session),
                Some(&rpc(2, "tools/call", json!({ "name": tool, "arguments": { "x": 1 } }))),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        json_body(resp).await
    }
}

async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn next_frame(stream: &mut BodyDataStream) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream produced nothing in time")
        .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
}

#[tokio::test]
async fn missing_token_is_401_with_metadata_challenge() {
    let h = harness();

    let resp = h
        .send(request(Method::POST, None, None, Some(&rpc(1, "initialize", json!({})))))
        .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.starts_with("Bearer error=\"invalid_token\""));
    assert!(challenge.contains(
        "resource_metadata=\"https://tools.example.test/.well-known/oauth-protected-resource\""
    ));
    assert_eq!(json_body(resp).await["code"], "unauthenticated");
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn token_for_another_audience_is_401() {
    let h = harness();
    let foreign = TestToken::new("alice")
        .audience("mcp://other-resource")
        .scope(CONNECT_MANAGE)
        .sign();

    let resp = h
        .send(request(Method::POST, Some(&foreign), None, Some(&rpc(1, "initialize", json!({})))))
        .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn token_without_connect_scope_is_403() {
    let h = harness();

    let resp = h
        .send(request(
            Method::POST,
            Some(&token("alice", "mcp:tools:read")),
            None,
            Some(&rpc(1, "initialize", json!({}))),
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.contains("scope=\"mcp:connect\""));
}

#[tokio::test]
async fn session_is_bound_to_the_initializing_subject() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let session = h.registry.get(&session_id).unwrap();
    assert_eq!(session.bound_subject(), "alice");
    assert_eq!(session.state(), SessionState::Active);

    let resp = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    drop(resp);

    let session_id = h.initialize(&alice).await;
    let mallory = token("mallory", CONNECT_MANAGE);
    let resp = h
        .send(request(Method::GET, Some(&mallory), Some(&session_id), None))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["code"], "session_mismatch");

    let session = h.registry.get(&session_id).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert!(!session.has_stream());
}

#[tokio::test]
async fn other_subject_cannot_post_or_terminate() {
    let h = harness();
    let session_id = h.initialize(&token("alice", CONNECT_READ)).await;
    let mallory = token("mallory", CONNECT_MANAGE);

    let resp = h
        .send(request(Method::POST, Some(&mallory), Some(&session_id), Some(&rpc(2, "ping", json!({})))))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h
        .send(request(Method::DELETE, Some(&mallory), Some(&session_id), None))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn post_without_session_must_be_initialize() {
    let h = harness();

    let resp = h
        .send(request(
            Method::POST,
            Some(&token("alice", CONNECT_READ)),
            None,
            Some(&rpc(1, "tools/list", json!({}))),
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["code"], "invalid_request");
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn initialize_on_existing_session_is_rejected() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let resp = h
        .send(request(
            Method::POST,
            Some(&alice),
            Some(&session_id),
            Some(&rpc(3, "initialize", json!({}))),
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn terminated_session_is_not_found() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let resp = h
        .send(request(Method::DELETE, Some(&alice), Some(&session_id), None))
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = h
        .send(request(Method::POST, Some(&alice), Some(&session_id), Some(&rpc(2, "ping", json!({})))))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["code"], "session_not_found");
}

#[tokio::test]
async fn ping_list_and_unknown_method() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let resp = h
        .send(request(Method::POST, Some(&alice), Some(&session_id), Some(&rpc(2, "ping", json!({})))))
        .await;
    assert_eq!(json_body(resp).await["result"], json!({}));

    let resp = h
        .send(request(
            Method::POST,
            Some(&alice),
            Some(&session_id),
            Some(&rpc(3, "tools/list", json!({}))),
        ))
        .await;
    let body = json_body(resp).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "echo");
    assert_eq!(tools[0]["annotations"]["readOnlyHint"], true);
    assert_eq!(tools[1]["annotations"]["readOnlyHint"], false);

    let resp = h
        .send(request(
            Method::POST,
            Some(&alice),
            Some(&session_id),
            Some(&rpc(4, "resources/list", json!({}))),
        ))
        .await;
    assert_eq!(json_body(resp).await["error"]["code"], -32601);
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let resp = h
        .send(request(
            Method::POST,
            Some(&alice),
            Some(&session_id),
            Some(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })),
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn malformed_json_is_parse_error() {
    let h = harness();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("alice", CONNECT_READ)))
        .body(Body::from("{oops"))
        .unwrap();

    let resp = h.send(req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"]["code"], -32700);
}

#[tokio::test]
async fn mutating_tool_needs_manage_scope() {
    let h = harness();
    let reader = token("alice", CONNECT_READ);
    let session_id = h.initialize(&reader).await;

    let body = h.call(&reader, &session_id, "touch").await;

    assert_eq!(body["result"]["isError"], true);
    assert_eq!(body["result"]["structuredContent"]["error"]["kind"], "unauthorized");
    assert_eq!(h.touches.load(Ordering::SeqCst), 0);

    let body = h.call(&reader, &session_id, "echo").await;
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["structuredContent"]["subject"], "alice");
}

#[tokio::test]
async fn unknown_tool_is_invalid_params() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let body = h.call(&alice, &session_id, "nope").await;

    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn mutation_is_announced_on_the_event_stream() {
    let h = harness();
    let manager = token("alice", CONNECT_MANAGE);
    let session_id = h.initialize(&manager).await;

    let resp = h
        .send(request(Method::GET, Some(&manager), Some(&session_id), None))
        .await;
    let mut stream = resp.into_body().into_data_stream();

    let body = h.call(&manager, &session_id, "touch").await;
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(h.touches.load(Ordering::SeqCst), 1);

    let frame = next_frame(&mut stream).await.unwrap();
    assert!(frame.contains("id: 1"));
    assert!(frame.contains("notifications/resources/updated"));
    assert!(frame.contains("test://things"));
}

#[tokio::test]
async fn last_event_id_replays_missed_events() {
    let h = harness();
    let manager = token("alice", CONNECT_MANAGE);
    let session_id = h.initialize(&manager).await;
    h.call(&manager, &session_id, "touch").await;
    h.call(&manager, &session_id, "touch").await;

    let mut req = request(Method::GET, Some(&manager), Some(&session_id), None);
    req.headers_mut().insert("last-event-id", "1".parse().unwrap());
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let mut stream = resp.into_body().into_data_stream();

    let frame = next_frame(&mut stream).await.unwrap();
    assert!(frame.contains("id: 2"));
}

#[tokio::test]
async fn second_stream_on_a_session_conflicts() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let first = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(second).await["code"], "stream_conflict");
}

#[tokio::test]
async fn dropping_the_stream_closes_the_session() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;
    let session = h.registry.get(&session_id).unwrap();

    let resp = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    drop(resp);

    assert!(session.is_closed());
    assert!(h.registry.get(&session_id).is_none());
}

#[tokio::test]
async fn stream_disconnect_can_keep_the_session() {
    let h = harness_with(GatewayConfig {
        close_on_stream_disconnect: false,
        ..GatewayConfig::default()
    });
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;

    let resp = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    drop(resp);

    let session = h.registry.get(&session_id).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert!(!session.has_stream());
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let h = harness();
    let alice = token("alice", CONNECT_READ);
    let session_id = h.initialize(&alice).await;
    let resp = h
        .send(request(Method::GET, Some(&alice), Some(&session_id), None))
        .await;
    let mut stream = resp.into_body().into_data_stream();

    assert_eq!(h.registry.shutdown(), 1);

    assert!(next_frame(&mut stream).await.is_none());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn public_routes_need_no_token() {
    let h = harness();

    let resp = h
        .send(
            Request::get("/.well-known/oauth-protected-resource")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let metadata = json_body(resp).await;
    assert_eq!(metadata["resource"], TEST_AUDIENCE);
    assert_eq!(metadata["authorization_servers"], json!([TEST_ISSUER]));

    let resp = h
        .send(
            Request::get("/.well-known/oauth-protected-resource/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn request_id_is_generated_and_propagated() {
    let h = harness();

    let resp = h.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = h
        .send(
            Request::get("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn subject_over_its_session_limit_gets_429() {
    let h = harness_with(GatewayConfig {
        max_sessions_per_subject: 1,
        ..GatewayConfig::default()
    });
    let alice = token("alice", CONNECT_READ);
    let first = h.initialize(&alice).await;

    let resp = h
        .send(request(
            Method::POST,
            Some(&alice),
            None,
            Some(&rpc(1, "initialize", json!({ "protocolVersion": "2025-06-18" }))),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["code"], "session_limit");

    h.initialize(&token("bob", CONNECT_READ)).await;

    let resp = h
        .send(request(Method::DELETE, Some(&alice), Some(&first), None))
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    h.initialize(&alice).await;
    assert_eq!(h.registry.open_for("alice"), 1);
}

#[test]
fn gate_for_another_resource_is_refused_at_construction() {
    let config = GatewayConfig {
        resource: "mcp://elsewhere".to_owned(),
        ..GatewayConfig::default()
    };

    assert!(McpGateway::new(config, gate(), OperationSet::new(gate()), TEST_ISSUER).is_err());
}
