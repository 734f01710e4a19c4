use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::settings::ModelProvider;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::provider::{error_detail, ChatProvider};
use crate::sse::LineBuffer;

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Streaming response: each line is one of these JSON objects.
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
}

fn to_ollama_messages(messages: Vec<ChatMessage>) -> Vec<OllamaMessage> {
    messages
        .into_iter()
        .map(|m| OllamaMessage {
            role: m.role,
            content: m.content,
            thinking: None,
        })
        .collect()
}

/// Local model served by Ollama.
pub struct OllamaClient {
    http: Client,
    base: String,
    model: String,
    timeout: Duration,
    think: bool,
}

impl OllamaClient {
    pub fn new(base: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .pool_max_idle_per_host(2)
                .build()?,
            base: base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
            think: false,
        })
    }

    pub fn from_config(config: &ModelProvider) -> Result<Self> {
        let mut client = Self::new(
            &config.ollama_base_url,
            &config.local_model,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        client.think = config.think;
        Ok(client)
    }

    fn request<'a>(&'a self, messages: Vec<ChatMessage>, stream: bool) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.model,
            messages: to_ollama_messages(messages),
            stream,
            think: self.think.then_some(true),
        }
    }
}

/// Translate one NDJSON line into chunks. Returns `true` once the stream is finished.
fn relay_line(line: &str, model: &str, tx: &UnboundedSender<StreamChunk>) -> bool {
    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                let _ = tx.send(StreamChunk::Error(format!("ollama: {}", err)));
                return true;
            }
            if let Some(msg) = &chunk.message {
                if let Some(thinking) = msg.thinking.as_deref().filter(|t| !t.is_empty()) {
                    let _ = tx.send(StreamChunk::Thinking(thinking.to_string()));
                }
                if !msg.content.is_empty() {
                    let _ = tx.send(StreamChunk::Text(msg.content.clone()));
                }
            }
            if chunk.done {
                let _ = tx.send(StreamChunk::Done {
                    model: Some(model.to_string()),
                });
                return true;
            }
            false
        }
        Err(e) => {
            let _ = tx.send(StreamChunk::Error(format!(
                "Failed to parse Ollama stream: {}",
                e
            )));
            true
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    fn id(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!("{}/api/chat", self.base);
        let req = self.request(messages, false);
        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ollama error: {} {}", status, error_detail(&body)));
        }
        let body: OllamaChatResponse = resp.json().await?;
        Ok(body.message.content)
    }

    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!("{}/api/chat", self.base);
        let req = self.request(messages, true);
        let resp = self.http.post(url).json(&req).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ollama error: {} {}", status, error_detail(&body)));
        }

        // Ollama streams line-delimited JSON
        let mut stream = resp.bytes_stream();
        let mut lines = LineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                    return Ok(());
                }
            };
            for line in lines.feed(&bytes) {
                if relay_line(&line, &self.model, &tx) {
                    return Ok(());
                }
            }
        }

        if let Some(line) = lines.finish() {
            if relay_line(&line, &self.model, &tx) {
                return Ok(());
            }
        }
        let _ = tx.send(StreamChunk::Done {
            model: Some(self.model.clone()),
        });
        Ok(())
    }
}
