//! HTTP surface tests against a scripted model client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_test::TestServer;
use diagnosa::AppState;
use diagnosa::config::AppConfig;
use diagnosa::controller::{FALLBACK_REPLY, SessionController};
use diagnosa::llm::{ExchangeError, ModelClient, Turn};
use diagnosa::server::{SESSION_COOKIE, build_router};
use diagnosa::session::DEFAULT_GREETING;
use serde_json::{Value, json};

type Reply = Result<Option<String>, ExchangeError>;

/// Replays canned results and records the history length of every call.
struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::default(),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(
        &self,
        history: &[Turn],
        _new_message: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, ExchangeError> {
        self.calls.lock().unwrap().push(history.len());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Takes a moment to answer and echoes the message back.
struct SlowEchoClient;

#[async_trait::async_trait]
impl ModelClient for SlowEchoClient {
    async fn generate(
        &self,
        _history: &[Turn],
        new_message: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, ExchangeError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Some(format!("re: {new_message}")))
    }

    fn model_id(&self) -> &str {
        "slow-echo"
    }
}

fn server(client: &Arc<ScriptedClient>) -> (TestServer, AppState) {
    server_with(Arc::clone(client) as Arc<dyn ModelClient>)
}

fn server_with(client: Arc<dyn ModelClient>) -> (TestServer, AppState) {
    let config = Arc::new(AppConfig::load_from_args(["diagnosa"]).expect("defaults load"));
    let controller = SessionController::new(client, Duration::from_secs(60));
    let state = AppState::new(config, controller);
    let server = TestServer::new(build_router(state.clone())).expect("test server");
    (server, state)
}

#[tokio::test]
async fn test_index_seeds_session_and_sets_cookie() {
    let client = ScriptedClient::new(vec![]);
    let (server, state) = server(&client);

    let response = server.get("/").await;
    response.assert_status_ok();

    let cookie = response.cookie(SESSION_COOKIE);
    assert!(state.sessions.get(cookie.value()).is_some());
    assert!(response.text().contains("I am an earthquake analysis expert"));
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_form_submit_renders_reply() {
    let client = ScriptedClient::new(vec![Ok(Some("**Fact A** and Fact B".to_string()))]);
    let (server, state) = server(&client);

    let cookie = server.get("/").await.cookie(SESSION_COOKIE);
    let session_id = cookie.value().to_string();

    let response = server
        .post("/")
        .add_cookie(cookie)
        .form(&[("message", "01/01")])
        .await;
    response.assert_status_ok();

    let html = response.text();
    assert!(html.contains("01/01"));
    assert!(html.contains("<strong>Fact A</strong> and Fact B"));

    let session = state.sessions.get(&session_id).unwrap();
    assert_eq!(session.conversation().turn_count(), 4);
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_form_failure_shows_notice_once() {
    let client = ScriptedClient::new(vec![Err(ExchangeError::auth("API key not valid"))]);
    let (server, state) = server(&client);

    let cookie = server.get("/").await.cookie(SESSION_COOKIE);
    let session_id = cookie.value().to_string();

    let failed = server
        .post("/")
        .add_cookie(cookie.clone())
        .form(&[("message", "01/01")])
        .await;
    failed.assert_status_ok();
    assert!(failed.text().contains(r#"data-kind="auth""#));

    // The notice belongs to that exchange only.
    let reloaded = server.get("/").add_cookie(cookie).await;
    assert!(!reloaded.text().contains(r#"role="alert""#));
    assert!(reloaded.text().contains("01/01"));

    let session = state.sessions.get(&session_id).unwrap();
    assert_eq!(session.conversation().turn_count(), 3);
}

#[tokio::test]
async fn test_api_chat_scenario() {
    let client = ScriptedClient::new(vec![Ok(Some("Fact A and Fact B".to_string()))]);
    let (server, _state) = server(&client);

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "01/01" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "replied");
    assert!(body.get("error").is_none());
    assert_eq!(
        body["messages"],
        json!([
            { "role": "assistant", "content": DEFAULT_GREETING },
            { "role": "user", "content": "01/01" },
            { "role": "assistant", "content": "Fact A and Fact B" },
        ])
    );
    assert_eq!(*client.calls.lock().unwrap(), vec![3]);

    let session_id = body["session_id"].as_str().unwrap();
    let history: Value = server
        .get(&format!("/api/sessions/{session_id}/messages"))
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_api_chat_blank_and_fallback() {
    let client = ScriptedClient::new(vec![Ok(None)]);
    let (server, _state) = server(&client);

    let blank: Value = server
        .post("/api/chat")
        .json(&json!({ "message": "   " }))
        .await
        .json();
    assert_eq!(blank["status"], "ignored");
    assert_eq!(blank["messages"].as_array().unwrap().len(), 1);
    assert_eq!(client.call_count(), 0);

    let session_id = blank["session_id"].as_str().unwrap();
    let fallback: Value = server
        .post("/api/chat")
        .json(&json!({ "message": "hello", "session_id": session_id }))
        .await
        .json();
    assert_eq!(fallback["status"], "fallback");
    assert_eq!(fallback["messages"][2]["content"], FALLBACK_REPLY);
}

#[tokio::test]
async fn test_api_chat_failure_reports_error() {
    let client = ScriptedClient::new(vec![Err(ExchangeError::timeout(Duration::from_secs(60)))]);
    let (server, _state) = server(&client);

    let body: Value = server
        .post("/api/chat")
        .json(&json!({ "message": "01/01" }))
        .await
        .json();

    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["kind"], "timeout");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_api_rejects_malformed_session_id() {
    let client = ScriptedClient::new(vec![]);
    let (server, _state) = server(&client);

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "hi", "session_id": "../../etc" }))
        .expect_failure()
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_delete_session() {
    let client = ScriptedClient::new(vec![]);
    let (server, state) = server(&client);

    let session = state.sessions.create();
    let path = format!("/api/sessions/{}", session.id());

    server.delete(&path).await.assert_status(axum::http::StatusCode::NO_CONTENT);
    assert!(state.sessions.is_empty());

    server
        .delete(&path)
        .expect_failure()
        .await
        .assert_status_not_found();
    server
        .get(&format!("{path}/messages"))
        .expect_failure()
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_health() {
    let client = ScriptedClient::new(vec![]);
    let (server, _state) = server(&client);

    server.get("/health").await.assert_text("ok");
}

#[tokio::test]
async fn test_concurrent_posts_to_one_session_both_complete() {
    let (server, state) = server_with(Arc::new(SlowEchoClient));
    let session = state.sessions.create();
    let id = session.id().to_string();

    let (a, b) = tokio::join!(
        server
            .post("/api/chat")
            .json(&json!({ "message": "a", "session_id": id })),
        server
            .post("/api/chat")
            .json(&json!({ "message": "b", "session_id": id })),
    );
    a.assert_status_ok();
    b.assert_status_ok();

    let a: Value = a.json();
    let b: Value = b.json();
    assert_eq!(a["status"], "replied");
    assert_eq!(b["status"], "replied");

    let mut lens = [
        a["messages"].as_array().unwrap().len(),
        b["messages"].as_array().unwrap().len(),
    ];
    lens.sort_unstable();
    assert_eq!(lens, [3, 5]);

    // Each reply follows its own question.
    let conversation = session.conversation();
    assert_eq!(conversation.turn_count(), 6);
    let display = conversation.snapshot_for_display();
    for pair in display[1..].chunks(2) {
        assert_eq!(pair[1].text, format!("re: {}", pair[0].text));
    }
}
