use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::settings::{ModelProvider, ProviderAuth};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::provider::{error_detail, ChatProvider, ImageInput, VisionProvider};
use crate::sse::SseParser;

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

// ── Non-streaming response types ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Streaming response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ── Conversion ───────────────────────────────────────────────────────

fn to_openai_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content
            })
        })
        .collect()
}

/// A single user turn carrying both the prompt and the image.
fn vision_message(prompt: &str, image: &ImageInput) -> serde_json::Value {
    serde_json::json!({
        "role": "user",
        "content": [
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image.data_url() } }
        ]
    })
}

// ── Client ───────────────────────────────────────────────────────────

pub struct OpenAIClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

impl OpenAIClient {
    pub fn from_auth(
        model: &str,
        auth: &ProviderAuth,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let auth_token = auth
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("No OpenAI authentication configured (OPENAI_API_KEY)"))?;

        Ok(Self {
            http: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .pool_max_idle_per_host(2)
                .build()?,
            auth_token,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout,
        })
    }

    /// Chat client for the configured text model.
    pub fn chat_from_config(config: &ModelProvider) -> Result<Self> {
        Self::from_auth(
            &config.openai_model,
            &config.openai_auth,
            config.openai_base_url.as_deref(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Client for the configured image-capable model.
    pub fn vision_from_config(config: &ModelProvider) -> Result<Self> {
        Self::from_auth(
            &config.openai_vision_model,
            &config.openai_auth,
            config.openai_base_url.as_deref(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn post(&self, req: &OpenAIRequest, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut builder = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Content-Type", "application/json")
            .json(req);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            if detail.is_empty() {
                return Err(anyhow!("openai error: {}", status));
            }
            return Err(anyhow!("openai error: {}\n{}", status, detail));
        }
        Ok(resp)
    }

    async fn complete(&self, messages: Vec<serde_json::Value>, max_tokens: Option<u32>) -> Result<String> {
        let req = OpenAIRequest {
            model: self.model.clone(),
            messages,
            stream: None,
            max_tokens,
        };
        let resp = self.post(&req, Some(self.timeout)).await?;
        let body: OpenAIResponse = resp.json().await?;
        let text = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl ChatProvider for OpenAIClient {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.complete(to_openai_messages(&messages), None).await
    }

    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let req = OpenAIRequest {
            model: self.model.clone(),
            messages: to_openai_messages(&messages),
            stream: Some(true),
            max_tokens: None,
        };
        let resp = self.post(&req, None).await?;

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                    return Ok(());
                }
            };
            for event in parser.feed(&bytes) {
                if event.data == "[DONE]" {
                    let _ = tx.send(StreamChunk::Done {
                        model: Some(self.model.clone()),
                    });
                    return Ok(());
                }
                match serde_json::from_str::<OpenAIStreamResponse>(&event.data) {
                    Ok(resp) => {
                        if let Some(content) = resp
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_deref())
                        {
                            if !content.is_empty() {
                                let _ = tx.send(StreamChunk::Text(content.to_string()));
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!("skipping unparseable openai stream event: {}", e);
                    }
                }
            }
        }

        let _ = tx.send(StreamChunk::Done {
            model: Some(self.model.clone()),
        });
        Ok(())
    }
}

#[async_trait]
impl VisionProvider for OpenAIClient {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn describe(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        self.complete(vec![vision_message(prompt, image)], Some(1000))
            .await
    }
}
