//! End-to-end tests against a live server on an ephemeral port.
//!
//! Chat providers are in-process stubs; the store is in memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use courseconnect::{build_app, AppState};
use futures::{SinkExt, StreamExt};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use providers::{ChatProvider, ImageInput, ProviderRouter, VisionProvider};
use serde_json::{json, Value};
use services::store::CourseStore;
use services::vision::VisionService;
use shared::agent_api::ChatMessage;
use shared::settings::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

struct Unavailable;

#[async_trait]
impl ChatProvider for Unavailable {
    fn id(&self) -> &str {
        "openai"
    }
    fn model(&self) -> &str {
        "gpt-4o-mini"
    }
    async fn generate(&self, _messages: Vec<ChatMessage>) -> Result<String> {
        Err(anyhow!("503 Service Unavailable"))
    }
}

struct Echo;

#[async_trait]
impl ChatProvider for Echo {
    fn id(&self) -> &str {
        "local"
    }
    fn model(&self) -> &str {
        "echo"
    }
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("You asked: {}", last))
    }
}

/// Vision model that finds every image off-topic.
struct OffTopic;

#[async_trait]
impl VisionProvider for OffTopic {
    fn id(&self) -> &str {
        "openai"
    }
    fn model(&self) -> &str {
        "gpt-4o-mini"
    }
    async fn describe(&self, _prompt: &str, _image: &ImageInput) -> Result<String> {
        Ok("NOT_RELEVANT: it is a photo of a cat".to_string())
    }
}

// 1x1 transparent PNG
const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

struct TestServer {
    base: String,
    client: reqwest::Client,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self::start_with(AppConfig::default(), providers, VisionService::new(vec![])).await
    }

    async fn start_with(config: AppConfig, providers: Vec<Arc<dyn ChatProvider>>, vision: VisionService) -> Self {
        let state = AppState::new(
            config,
            ProviderRouter::new(providers),
            vision,
            CourseStore::open_in_memory().unwrap(),
            None,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, build_app(state)).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn sample_pdf(line: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(line)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

#[tokio::test]
async fn health_lists_providers() {
    let server = TestServer::start(vec![Arc::new(Echo)]).await;
    let body: Value = server
        .client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], json!(["local"]));
    assert_eq!(body["search"], false);
}

#[tokio::test]
async fn chat_survives_primary_failure() {
    let server = TestServer::start(vec![Arc::new(Unavailable)]).await;
    let (status, body) = server
        .post("/api/ai/chat", json!({ "message": "How do I study for finals?" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["provider"], "fallback");
    assert!(!body["response"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_uses_next_provider_in_chain() {
    let server = TestServer::start(vec![Arc::new(Unavailable), Arc::new(Echo)]).await;
    let (status, body) = server
        .post("/api/ai/chat", json!({ "message": "What is photosynthesis?" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["provider"], "local");
    assert!(body["response"].as_str().unwrap().contains("photosynthesis"));
}

#[tokio::test]
async fn flagged_chat_is_rejected() {
    let server = TestServer::start(vec![Arc::new(Echo)]).await;
    let (status, body) = server
        .post("/api/ai/chat", json!({ "message": "this homework is shit" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "content_rejected");

    let (status, _) = server.post("/api/ai/chat", json!({ "message": "   " })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn chat_stream_ends_with_done() {
    let server = TestServer::start(vec![Arc::new(Echo)]).await;
    let body = server
        .client
        .post(server.url("/api/ai/chat/stream"))
        .json(&json!({ "message": "Explain recursion" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let events: Vec<&str> = body
        .lines()
        .filter_map(|l| l.strip_prefix("event:"))
        .map(str::trim)
        .collect();
    assert!(events.contains(&"content"), "{}", body);
    assert_eq!(events.last(), Some(&"done"));
    assert!(body.contains("recursion"));
}

#[tokio::test]
async fn content_check_reports_category() {
    let server = TestServer::start(vec![]).await;
    let (status, body) = server
        .post("/api/content/check", json!({ "text": "what a bullshit quiz" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["isSafe"], false);
    assert_eq!(body["category"], "profanity");

    let (_, body) = server
        .post("/api/content/check", json!({ "text": "Can someone share the lab notes?" }))
        .await;
    assert_eq!(body["isSafe"], true);
}

#[tokio::test]
async fn pdf_extract_accepts_multipart_and_base64() {
    use base64::Engine;

    let server = TestServer::start(vec![]).await;
    let pdf = sample_pdf("BIO 220 Cell Biology");

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(pdf.clone()).file_name("syllabus.pdf"),
    );
    let resp = server
        .client
        .post(server.url("/api/pdf-extract"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["text"].as_str().unwrap().contains("Biology"));
    assert_eq!(body["metadata"]["pages"], 1);
    assert_eq!(body["metadata"]["fileName"], "syllabus.pdf");

    let encoded = base64::engine::general_purpose::STANDARD.encode(&pdf);
    let (status, body) = server
        .post(
            "/api/pdf-extract",
            json!({ "data": format!("data:application/pdf;base64,{}", encoded) }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["text"].as_str().unwrap().contains("Cell"));
}

#[tokio::test]
async fn pdf_extract_rejects_non_pdf() {
    use base64::Engine;

    let server = TestServer::start(vec![]).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"just some notes");
    let (status, body) = server
        .post("/api/pdf-extract", json!({ "data": encoded }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "not_pdf");
}

#[tokio::test]
async fn pdf_extract_enforces_upload_limit() {
    use base64::Engine;

    let mut config = AppConfig::default();
    config.server.max_upload_bytes = 1024;
    let server = TestServer::start_with(config, vec![], VisionService::new(vec![])).await;

    let mut oversized = b"%PDF-1.4\n".to_vec();
    oversized.resize(1200, b'a');
    let encoded = base64::engine::general_purpose::STANDARD.encode(&oversized);
    let (status, body) = server
        .post("/api/pdf-extract", json!({ "data": encoded }))
        .await;
    assert_eq!(status, 413);
    assert_eq!(body["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn pdf_without_text_is_unprocessable() {
    use base64::Engine;

    let server = TestServer::start(vec![]).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4\ngarbage without objects");
    let (status, body) = server
        .post("/api/pdf-extract", json!({ "data": encoded }))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "scanned_pdf");
}

#[tokio::test]
async fn vision_rejects_bad_images() {
    let server = TestServer::start(vec![]).await;

    let (status, body) = server
        .post(
            "/api/chat/vision",
            json!({ "message": "what is this?", "image": PNG, "mimeType": "application/pdf" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post(
            "/api/chat/vision",
            json!({ "message": "what is this?", "image": "not base64!!", "mimeType": "image/png" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn vision_turns_away_off_topic_images() {
    let vision = VisionService::new(vec![Arc::new(OffTopic) as Arc<dyn VisionProvider>]);
    let server = TestServer::start_with(AppConfig::default(), vec![], vision).await;

    let (status, body) = server
        .post(
            "/api/chat/vision",
            json!({
                "message": "can you explain this diagram?",
                "image": PNG,
                "mimeType": "image/png",
                "courseData": {
                    "classCode": "BIO 110",
                    "className": "Intro Biology",
                    "description": "Cells and genetics",
                    "topics": ["mitosis"]
                }
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["accepted"], false);
    assert!(body["response"].as_str().unwrap().contains("cat"));
}

#[tokio::test]
async fn username_rules_and_claims() {
    let server = TestServer::start(vec![]).await;
    let check = |name: &str, claim: bool| {
        let body = json!({ "username": name, "claim": claim });
        let server = &server;
        async move { server.post("/api/username/validate", body).await.1 }
    };

    assert_eq!(check("a", false).await["valid"], false);
    assert_eq!(check(&"x".repeat(21), false).await["valid"], false);
    assert_eq!(check("SiteAdmin", false).await["valid"], false);

    let claimed = check("  Study Buddy ", true).await;
    assert_eq!(claimed["valid"], true);
    assert_eq!(claimed["username"], "Study Buddy");

    let again = check("study buddy", false).await;
    assert_eq!(again["valid"], false);
    assert!(again["error"].as_str().is_some());
}

#[tokio::test]
async fn newsletter_dedupes_subscribers() {
    let server = TestServer::start(vec![]).await;
    let (status, _) = server
        .post("/api/newsletter", json!({ "email": "ana@school.edu" }))
        .await;
    assert_eq!(status, 201);
    let (status, body) = server
        .post("/api/newsletter", json!({ "email": "ANA@school.edu" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Already subscribed");
    let (status, _) = server.post("/api/newsletter", json!({ "email": "nope" })).await;
    assert_eq!(status, 400);

    let count: Value = server
        .client
        .get(server.url("/api/newsletter"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 1);
}

#[tokio::test]
async fn syllabus_upload_creates_then_joins() {
    let server = TestServer::start(vec![]).await;
    let syllabus = json!({
        "classCode": "CS 101",
        "className": "Introduction to Programming",
        "university": "State University",
        "term": "Fall 2025"
    });

    let (status, first) = server
        .post("/api/syllabus/upload", json!({ "syllabus": syllabus, "userId": "u1" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(first["action"], "created");
    let group_id = first["group"]["id"].as_str().unwrap().to_string();

    let (status, second) = server
        .post(
            "/api/syllabus/upload",
            json!({ "syllabus": { "classCode": "cs-101", "className": "Programming", "university": "state university", "term": "fall 2025" }, "userId": "u2" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(second["action"], "joined");
    assert_eq!(second["group"]["id"], group_id.as_str());
    assert_eq!(second["group"]["members"], json!(["u1", "u2"]));
    assert!(second["matches"][0]["score"].as_u64().unwrap() >= 60);

    let (status, _) = server
        .post("/api/syllabus/upload", json!({ "syllabus": {}, "userId": "u3" }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn syllabus_parse_falls_back_to_patterns() {
    let server = TestServer::start(vec![Arc::new(Unavailable)]).await;
    let text = "MATH 221 Calculus II\nInstructor: Dr. Rivera\nrivera@uni.edu\nSpring 2026\n";
    let (status, body) = server.post("/api/syllabus/parse", json!({ "text": text })).await;
    assert_eq!(status, 200);
    assert_eq!(body["classCode"], "MATH 221");
    assert_eq!(body["term"], "Spring 2026");
    assert_eq!(body["instructorEmail"], "rivera@uni.edu");
}

#[tokio::test]
async fn rooms_relay_messages_and_history() {
    let server = TestServer::start(vec![]).await;
    let ws_url = format!("{}/api/socketio", server.base.replace("http://", "ws://"));

    let (mut ana, _) = tokio_tungstenite::connect_async(&ws_url).await.expect("ws connect");
    let (mut ben, _) = tokio_tungstenite::connect_async(&ws_url).await.expect("ws connect");

    async fn next_event<S>(ws: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out")
                .expect("socket closed")
                .expect("socket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    let join = |user: &str, name: &str| {
        json!({ "event": "join-room", "data": { "roomId": "cs101", "userId": user, "userName": name } })
            .to_string()
    };
    ana.send(Message::Text(join("u1", "Ana").into())).await.unwrap();
    assert_eq!(next_event(&mut ana).await["event"], "room-state");
    ben.send(Message::Text(join("u2", "Ben").into())).await.unwrap();
    let state = next_event(&mut ben).await;
    assert_eq!(state["event"], "room-state");
    assert_eq!(state["data"]["members"].as_array().unwrap().len(), 2);
    assert_eq!(next_event(&mut ana).await["event"], "user-joined");

    let post = json!({ "event": "new-message", "data": { "roomId": "cs101", "text": "study group at 6?" } });
    ben.send(Message::Text(post.to_string().into())).await.unwrap();
    let received = next_event(&mut ana).await;
    assert_eq!(received["event"], "new-message");
    assert_eq!(received["data"]["author"], "Ben");
    assert_eq!(received["data"]["text"], "study group at 6?");

    let history: Value = server
        .client
        .get(server.url("/api/rooms/cs101/messages?limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    ben.close(None).await.unwrap();
    let left = next_event(&mut ana).await;
    assert_eq!(left["event"], "user-left");
    assert_eq!(left["data"]["userId"], "u2");
}
