//! Drives the JSON API and the sync server over real sockets.

use async_trait::async_trait;
use codeverse_ai::{AiError, ChatMessage, CompletionBackend};
use codeverse_auth::{Mail, MailError, Mailer, PasswordHasher};
use codeverse_collab::{PeerInfo, ProtocolError, SyncClient};
use codeverse_server::{serve_http, sweep_sessions, AppState, Config, Services};
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use uuid::Uuid;
use yrs::{Doc, ReadTxn, Text, Transact, WriteTxn};

// ─── Harness ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
}

impl RecordingMailer {
    fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let mail = sent.last().expect("no mail sent");
        mail.text
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .expect("no code in mail")
            .to_string()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

struct EchoBackend;

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("echo: {last}"))
    }
}

struct TestApp {
    _dir: TempDir,
    base: String,
    ws: String,
    state: AppState,
    mailer: Arc<RecordingMailer>,
    http: reqwest::Client,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.editor.url = "http://editor.test".into();

    let mailer = Arc::new(RecordingMailer::default());
    let services = Services {
        mailer: mailer.clone(),
        completions: Arc::new(EchoBackend),
        hasher: PasswordHasher::new(1024, 1, 1).unwrap(),
    };
    let state = AppState::build(config, services).unwrap();

    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", http_listener.local_addr().unwrap());
    let ws = format!("ws://{}", ws_listener.local_addr().unwrap());

    let sync = state.sync.clone();
    tokio::spawn(async move {
        sync.serve(ws_listener).await.unwrap();
    });
    tokio::spawn(serve_http(state.clone(), http_listener));

    TestApp {
        _dir: dir,
        base,
        ws,
        state,
        mailer,
        http: reqwest::Client::new(),
    }
}

async fn send(request: RequestBuilder) -> (u16, Value) {
    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    let text = response.text().await.unwrap();
    let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).unwrap() };
    (status, body)
}

impl TestApp {
    fn with_token(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        send(self.with_token(self.http.get(format!("{}{path}", self.base)), token)).await
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        send(self.with_token(self.http.post(format!("{}{path}", self.base)), token).json(&body)).await
    }

    async fn delete(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        send(self.with_token(self.http.delete(format!("{}{path}", self.base)), token)).await
    }

    /// Sign up and log in; returns the session token.
    async fn register(&self, username: &str, email: &str, password: &str) -> String {
        let (status, _) = self
            .post(
                "/api/auth/signup",
                None,
                json!({
                    "username": username,
                    "email": email,
                    "password": password,
                    "confirm_password": password,
                }),
            )
            .await;
        assert_eq!(status, 201);
        self.login(email, password).await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post("/api/auth/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, 200, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_project(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post("/api/projects", Some(token), json!({ "name": name, "language": "python" }))
            .await;
        assert_eq!(status, 201, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..60 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

// ─── Accounts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_healthz() {
    let app = spawn_app().await;
    let (status, body) = app.get("/healthz", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_signup_login_logout() {
    let app = spawn_app().await;
    let token = app.register("ada", "Ada@Example.com", "secret1").await;

    let (status, me) = app.get("/api/me", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(me["email"], "ada@example.com");
    assert!(me.get("password_hash").is_none());

    let (status, body) = app
        .post(
            "/api/auth/signup",
            None,
            json!({ "username": "ada2", "email": "ada@example.com", "password": "secret1", "confirm_password": "secret1" }),
        )
        .await;
    assert_eq!(status, 409);
    assert!(body["error"].is_string());

    let (status, _) = app
        .post("/api/auth/login", None, json!({ "email": "ada@example.com", "password": "nope99" }))
        .await;
    assert_eq!(status, 401);
    let (status, _) = app
        .post("/api/auth/login", None, json!({ "email": "who@example.com", "password": "secret1" }))
        .await;
    assert_eq!(status, 404);

    let (status, _) = app.post("/api/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, 204);
    let (status, body) = app.get("/api/me", Some(&token)).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Session is invalid or expired");
}

#[tokio::test]
async fn test_requests_without_token_rejected() {
    let app = spawn_app().await;
    let (status, body) = app.get("/api/dashboard", None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Missing bearer token");

    let (status, _) = app.get("/api/dashboard", Some("deadbeef")).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_signup_validation_is_json() {
    let app = spawn_app().await;
    let (status, body) = app
        .post(
            "/api/auth/signup",
            None,
            json!({ "username": "bob", "email": "bob@example.com", "password": "abc", "confirm_password": "abc" }),
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());

    // Malformed bodies use the same error shape
    let (status, body) = app.post("/api/auth/login", None, json!({ "email": 5 })).await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = spawn_app().await;
    let old_session = app.register("ada", "ada@example.com", "secret1").await;

    let (status, body) = app
        .post("/api/auth/reset/request", None, json!({ "email": "ada@example.com" }))
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["email"], "ada@example.com");

    let (status, body) = app
        .post("/api/auth/reset/resend", None, json!({ "email": "ada@example.com" }))
        .await;
    assert_eq!(status, 429);
    assert!(body["error"].as_str().unwrap().contains("wait"));

    let code = app.mailer.last_code();
    let wrong = if code == "123456" { "654321" } else { "123456" };
    let (status, _) = app
        .post("/api/auth/reset/verify", None, json!({ "email": "ada@example.com", "code": wrong }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = app
        .post("/api/auth/reset/verify", None, json!({ "email": "ada@example.com", "code": code }))
        .await;
    assert_eq!(status, 200);
    let ticket = body["ticket"].as_str().unwrap().to_string();

    let complete = json!({ "ticket": ticket, "password": "brandnew", "confirm_password": "brandnew" });
    let (status, _) = app.post("/api/auth/reset/complete", None, complete.clone()).await;
    assert_eq!(status, 204);
    let (status, _) = app.post("/api/auth/reset/complete", None, complete).await;
    assert_eq!(status, 400);

    // Old sessions are revoked, the new password works
    let (status, _) = app.get("/api/me", Some(&old_session)).await;
    assert_eq!(status, 401);
    app.login("ada@example.com", "brandnew").await;
}

#[tokio::test]
async fn test_reset_unknown_email() {
    let app = spawn_app().await;
    let (status, _) = app
        .post("/api/auth/reset/request", None, json!({ "email": "ghost@example.com" }))
        .await;
    assert_eq!(status, 404);
}

// ─── Projects & dashboard ────────────────────────────────────────────────────

#[tokio::test]
async fn test_project_and_file_lifecycle() {
    let app = spawn_app().await;
    let token = app.register("ada", "ada@example.com", "secret1").await;

    let (status, dash) = app.get("/api/dashboard", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(dash["stats"]["total_projects"], 0);
    assert_eq!(dash["stats"]["avg_files_per_project"], 0.0);
    assert_eq!(dash["streak"], 1);
    assert_eq!(dash["tips"].as_array().unwrap().len(), 4);

    let project = app.create_project(&token, "  Demo  ").await;
    let files_path = format!("/api/projects/{project}/files");

    let (status, file) = app.post(&files_path, Some(&token), json!({ "filename": "app.js" })).await;
    assert_eq!(status, 201);
    assert_eq!(file["language"], "javascript");
    let room = file["room_id"].as_str().unwrap().to_string();
    let simple_room = Uuid::parse_str(&room).unwrap().simple().to_string();
    assert_eq!(
        file["editor_url"],
        format!("http://editor.test/editor/{simple_room}?username=ada")
    );

    let (status, _) = app.post(&files_path, Some(&token), json!({ "filename": "app.js" })).await;
    assert_eq!(status, 409);
    let (status, readme) = app.post(&files_path, Some(&token), json!({ "filename": "README" })).await;
    assert_eq!(status, 201);
    assert_eq!(readme["language"], "python");

    let (_, dash) = app.get("/api/dashboard", Some(&token)).await;
    assert_eq!(dash["stats"]["total_projects"], 1);
    assert_eq!(dash["stats"]["total_files"], 2);
    assert_eq!(dash["stats"]["avg_files_per_project"], 2.0);
    assert_eq!(dash["projects"][0]["name"], "Demo");
    assert_eq!(dash["projects"][0]["files"].as_array().unwrap().len(), 2);

    let readme_id = readme["id"].as_str().unwrap();
    let (status, _) = app
        .delete(&format!("/api/projects/{project}/files/{readme_id}"), Some(&token))
        .await;
    assert_eq!(status, 204);

    let (_, activity) = app
        .get(&format!("/api/projects/{project}/activity?limit=10"), Some(&token))
        .await;
    let kinds: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_object().unwrap().keys().next().unwrap().as_str())
        .collect();
    assert_eq!(kinds, ["FileDeleted", "FileCreated", "FileCreated", "ProjectCreated"]);

    let (status, _) = app.delete(&format!("/api/projects/{project}"), Some(&token)).await;
    assert_eq!(status, 204);
    let (status, _) = app.get(&files_path, Some(&token)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_projects_are_private() {
    let app = spawn_app().await;
    let ada = app.register("ada", "ada@example.com", "secret1").await;
    let eve = app.register("eve", "eve@example.com", "secret1").await;
    let project = app.create_project(&ada, "Secret").await;

    let (status, _) = app.get(&format!("/api/projects/{project}/files"), Some(&eve)).await;
    assert_eq!(status, 404);
    let (status, _) = app
        .post(&format!("/api/projects/{project}/files"), Some(&eve), json!({ "filename": "x.py" }))
        .await;
    assert_eq!(status, 404);
    let (status, _) = app.delete(&format!("/api/projects/{project}"), Some(&eve)).await;
    assert_eq!(status, 404);

    let (_, dash) = app.get("/api/dashboard", Some(&eve)).await;
    assert_eq!(dash["stats"]["total_projects"], 0);
}

#[tokio::test]
async fn test_quick_room_link() {
    let app = spawn_app().await;
    let token = app.register("ada lovelace", "ada@example.com", "secret1").await;
    let (status, body) = app.get("/api/rooms/quick?from=debug", Some(&token)).await;
    assert_eq!(status, 200);
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("http://editor.test/editor/"));
    assert!(url.ends_with("?username=ada%20lovelace&from=debug"));
}

// ─── Editing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_editing_session_updates_file() {
    let app = spawn_app().await;
    let token = app.register("ada", "ada@example.com", "secret1").await;
    let project = app.create_project(&token, "Live").await;
    let (_, file) = app
        .post(&format!("/api/projects/{project}/files"), Some(&token), json!({ "filename": "main.py" }))
        .await;
    let file_id = file["id"].as_str().unwrap().to_string();
    let room = Uuid::parse_str(file["room_id"].as_str().unwrap()).unwrap();

    let mut editor = SyncClient::new(PeerInfo::new("anon"), room, &app.ws, &token);
    editor.connect().await.unwrap();
    let peers = app.state.sync.room_peers(room).await;
    assert_eq!(peers[0].name, "ada");

    let doc = Doc::new();
    let update = {
        let before = doc.transact().state_vector();
        {
            let mut txn = doc.transact_mut();
            let text = txn.get_or_insert_text("content");
            text.insert(&mut txn, 0, "import os\nprint(os.name)\n");
        }
        doc.transact().encode_diff_v1(&before)
    };
    editor.send_delta(update).await.unwrap();

    let content_path = format!("/api/projects/{project}/files/{file_id}/content");
    eventually(|| async {
        let (_, body) = app.get(&content_path, Some(&token)).await;
        body["content"] == "import os\nprint(os.name)\n"
    })
    .await;

    editor.disconnect().await;

    // Closing the room records the line count and an edit entry
    let files_path = format!("/api/projects/{project}/files");
    eventually(|| async {
        let (_, files) = app.get(&files_path, Some(&token)).await;
        files[0]["lines"] == 2
    })
    .await;
    let (_, activity) = app.get(&format!("/api/projects/{project}/activity"), Some(&token)).await;
    assert_eq!(activity[0]["kind"]["FileEdited"]["lines"], 2);

    // Stored text is still served once the room is gone
    let (_, body) = app.get(&content_path, Some(&token)).await;
    assert_eq!(body["content"], "import os\nprint(os.name)\n");
}

#[tokio::test]
async fn test_editor_join_needs_session() {
    let app = spawn_app().await;
    let mut editor = SyncClient::new(PeerInfo::new("anon"), Uuid::new_v4(), &app.ws, "not-a-session");
    match editor.connect().await {
        Err(ProtocolError::Rejected(reason)) => assert_eq!(reason, "Session is invalid or expired"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ─── Assistant ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_history_per_session() {
    let app = spawn_app().await;
    let token = app.register("ada", "ada@example.com", "secret1").await;

    let (status, body) = app.get("/api/ai/chat", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    let (status, body) = app.post("/api/ai/chat", Some(&token), json!({ "message": "hi" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["reply"], "echo: hi");

    let (_, body) = app.get("/api/ai/chat", Some(&token)).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[2]["role"], "assistant");

    // Another session of the same user starts fresh
    let other = app.login("ada@example.com", "secret1").await;
    let (_, body) = app.get("/api/ai/chat", Some(&other)).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    let (status, _) = app.delete("/api/ai/chat", Some(&token)).await;
    assert_eq!(status, 204);
    let (_, body) = app.get("/api/ai/chat", Some(&token)).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    let (status, _) = app.post("/api/ai/chat", Some(&token), json!({ "message": "   " })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_chat_memory_follows_session_lifetime() {
    let app = spawn_app().await;
    let ended = app.register("ada", "ada@example.com", "secret1").await;

    // Reading alone keeps nothing
    app.get("/api/ai/chat", Some(&ended)).await;
    assert_eq!(app.state.assistant.conversation_count().await, 0);

    app.post("/api/ai/chat", Some(&ended), json!({ "message": "hi" })).await;
    app.state.store.purge_expired_sessions(u64::MAX).unwrap();

    let live = app.login("ada@example.com", "secret1").await;
    app.post("/api/ai/chat", Some(&live), json!({ "message": "hello" })).await;
    assert_eq!(app.state.assistant.conversation_count().await, 2);

    sweep_sessions(&app.state.auth, &app.state.assistant).await;
    assert_eq!(app.state.assistant.conversation_count().await, 1);
    let (_, body) = app.get("/api/ai/chat", Some(&live)).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_assist_action() {
    let app = spawn_app().await;
    let token = app.register("ada", "ada@example.com", "secret1").await;

    let (status, body) = app
        .post(
            "/api/ai/assist",
            Some(&token),
            json!({ "action": "explain", "language": "python", "code": "print(1)" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["action"], "explain");
    assert!(body["reply"].as_str().unwrap().contains("print(1)"));

    let (status, _) = app
        .post("/api/ai/assist", Some(&token), json!({ "action": "debug", "code": "" }))
        .await;
    assert_eq!(status, 400);
}
