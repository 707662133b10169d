use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use askql_adapters::http::HttpAssistantBackend;
use askql_core::assistant::{self, AssistantBackend};
use askql_core::connection_form::{ConnectionConfig, FormField};
use askql_core::error::WorkflowError;
use askql_core::feedback::{FeedbackEvent, FeedbackMode};
use askql_core::session::{QueryResult, Session, SessionState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct MockService {
    connect_reply: Value,
    query_reply: Value,
    query_status: StatusCode,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockService {
    fn new(connect_reply: Value, query_reply: Value) -> Self {
        Self {
            connect_reply,
            query_reply,
            query_status: StatusCode::OK,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests_to(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|(recorded, _)| recorded == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn record(&self, path: &str, body: Value) {
        self.requests
            .lock()
            .expect("requests lock")
            .push((path.to_string(), body));
    }
}

async fn handle_connect(
    State(service): State<MockService>,
    Json(body): Json<Value>,
) -> Json<Value> {
    service.record("/connect", body);
    Json(service.connect_reply.clone())
}

async fn handle_query(
    State(service): State<MockService>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    service.record("/query", body);
    (service.query_status, Json(service.query_reply.clone()))
}

async fn handle_feedback(
    State(service): State<MockService>,
    Json(body): Json<Value>,
) -> StatusCode {
    service.record("/noice", body);
    StatusCode::OK
}

async fn spawn_mock(service: MockService) -> SocketAddr {
    let router = Router::new()
        .route("/connect", post(handle_connect))
        .route("/query", post(handle_query))
        .route("/noice", post(handle_feedback))
        .with_state(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock listener should bind");
    let address = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    address
}

fn backend_for(address: SocketAddr) -> HttpAssistantBackend {
    HttpAssistantBackend::new(&format!("http://{address}"), None).expect("valid base url")
}

fn openai_session() -> Session {
    let mut config = ConnectionConfig::with_model("gpt-4o");
    config.update(FormField::DatabaseUri, "postgresql://u:p@h:5432/d");
    config.update(FormField::PrimaryCredential, "sk-x");
    Session::new(config)
}

#[tokio::test(flavor = "current_thread")]
async fn connect_query_and_feedback_against_mock_service() {
    let service = MockService::new(
        json!({ "schema": "table t (id int)" }),
        json!({ "sql_query": "SELECT COUNT(*) FROM t", "answer": "42" }),
    );
    let backend = backend_for(spawn_mock(service.clone()).await);
    let mut session = openai_session();

    let schema = assistant::connect(&mut session, &backend)
        .await
        .expect("connect should succeed");
    assert_eq!(schema, "table t (id int)");
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.error().is_none());

    let connect_bodies = service.requests_to("/connect");
    assert_eq!(connect_bodies.len(), 1);
    assert_eq!(
        connect_bodies[0],
        json!({
            "db_uri": "postgresql://u:p@h:5432/d",
            "llm_type": "gpt-4o",
            "api_key": "sk-x",
            "aws_access_key_id": "",
            "aws_secret_access_key": "",
        })
    );

    let result = assistant::query(&mut session, &backend, "How many rows?")
        .await
        .expect("query should succeed");
    assert_eq!(result, QueryResult::new("SELECT COUNT(*) FROM t", "42"));
    assert!(session.error().is_none());
    let query_bodies = service.requests_to("/query");
    assert_eq!(query_bodies.len(), 1);
    assert_eq!(query_bodies[0]["question"], "How many rows?");
    assert_eq!(query_bodies[0]["api_key"], "sk-x");

    assistant::submit_feedback(&session, &backend, true).await;
    assert_eq!(
        service.requests_to("/noice"),
        vec![json!({
            "noice": true,
            "input": "Schema:table t (id int)\n\nQuestion: How many rows?",
            "output": "SELECT COUNT(*) FROM t",
        })]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn escaped_schema_payload_is_normalized() {
    let service = MockService::new(json!({ "schema": "a\\nb\\\\c" }), json!({}));
    let backend = backend_for(spawn_mock(service).await);
    let mut session = openai_session();

    let schema = assistant::connect(&mut session, &backend)
        .await
        .expect("connect should succeed");
    assert_eq!(schema, "a\nbc");
    assert_eq!(session.schema(), "a\nbc");
}

#[tokio::test(flavor = "current_thread")]
async fn empty_or_missing_schema_fails_connect() {
    for reply in [json!({ "schema": "" }), json!({ "tables": [] })] {
        let backend = backend_for(spawn_mock(MockService::new(reply, json!({}))).await);
        let mut session = openai_session();

        let error = assistant::connect(&mut session, &backend)
            .await
            .expect_err("connect should fail");
        assert_eq!(error, WorkflowError::MissingSchema);
        assert_eq!(session.state(), SessionState::ConnectionFailed);
        assert_eq!(session.error(), Some("No schema data received from the server."));
    }
}

async fn spawn_plain_text_service() -> SocketAddr {
    let router = Router::new()
        .route("/connect", post(|| async { "ok" }))
        .route("/query", post(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("plain text listener should bind");
    let address = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    address
}

#[tokio::test(flavor = "current_thread")]
async fn plain_text_success_replies_carry_no_payload() {
    let backend = backend_for(spawn_plain_text_service().await);
    let mut session = openai_session();

    let reply = backend
        .connect(session.config())
        .await
        .expect("2xx reply is not a transport failure");
    assert_eq!(reply.schema, None);

    let error = assistant::connect(&mut session, &backend)
        .await
        .expect_err("no schema in reply");
    assert_eq!(error, WorkflowError::MissingSchema);
    assert_eq!(session.error(), Some("No schema data received from the server."));

    let reply = backend
        .query(session.config(), "How many rows?")
        .await
        .expect("2xx reply is not a transport failure");
    assert_eq!(reply.sql_query, None);
    assert_eq!(reply.answer, None);
}

#[tokio::test(flavor = "current_thread")]
async fn server_error_on_query_clears_previous_result() {
    let service = MockService {
        query_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..MockService::new(
            json!({ "schema": "table t (id int)" }),
            json!({ "detail": "model unavailable" }),
        )
    };
    let backend = backend_for(spawn_mock(service).await);
    let mut session = openai_session();
    assistant::connect(&mut session, &backend)
        .await
        .expect("connect should succeed");

    let error = assistant::query(&mut session, &backend, "How many rows?")
        .await
        .expect_err("server error");
    match error {
        WorkflowError::Query(source) => assert_eq!(source.status(), Some(500)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.result(), &QueryResult::default());
    assert_eq!(
        session.error(),
        Some("An error occurred while processing your request. Please try again.")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_service_fails_connect() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("bound address");
    drop(listener);

    let backend = backend_for(address);
    let mut session = openai_session();
    let error = assistant::connect(&mut session, &backend)
        .await
        .expect_err("nothing is listening");
    assert!(matches!(error, WorkflowError::Connect(_)));
    assert_eq!(
        session.error(),
        Some("An error occurred while connecting to the database. Please try again.")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn negative_feedback_follows_feedback_mode() {
    let service = MockService::new(
        json!({ "schema": "table t (id int)" }),
        json!({ "sql_query": "SELECT 1" }),
    );
    let backend = backend_for(spawn_mock(service.clone()).await);

    let mut session = openai_session();
    assistant::connect(&mut session, &backend)
        .await
        .expect("connect should succeed");
    let result = assistant::query(&mut session, &backend, "one?")
        .await
        .expect("query should succeed");
    assert_eq!(result, QueryResult::new("SELECT 1", ""));

    assistant::submit_feedback(&session, &backend, false).await;
    assert!(service.requests_to("/noice").is_empty());

    let session = session.with_feedback_mode(FeedbackMode::Symmetric);
    assistant::submit_feedback(&session, &backend, false).await;
    let sent = service.requests_to("/noice");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["noice"], false);
}

#[tokio::test(flavor = "current_thread")]
async fn feedback_errors_are_reported_only_to_the_caller() {
    let backend = backend_for(spawn_mock(MockService::new(json!({}), json!({}))).await);
    let event = FeedbackEvent::new(true, "Schema:\n\nQuestion: q", "SELECT 1");
    backend
        .send_feedback(&event)
        .await
        .expect("mock accepts feedback");

    let missing = HttpAssistantBackend::new(
        &format!("http://{}/missing-prefix", backend.base_url().authority()),
        None,
    )
    .expect("valid url");
    let error = missing
        .send_feedback(&event)
        .await
        .expect_err("unknown route");
    assert_eq!(error.status(), Some(404));
}
