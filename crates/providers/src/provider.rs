use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::{ChatMessage, StreamChunk};
use tokio::sync::mpsc::UnboundedSender;

/// A text model reachable over HTTP.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name ("local", "openai", "gemini").
    fn id(&self) -> &str;

    /// Model identifier sent upstream.
    fn model(&self) -> &str;

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Stream a reply into `tx`.
    ///
    /// Contract: returns `Err` only if nothing was sent yet, so the router can
    /// fall through to the next provider. Once chunks have gone out, failures
    /// are reported as `StreamChunk::Error` and the method returns `Ok(())`.
    ///
    /// The default sends the whole non-streamed reply as one chunk.
    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let text = self.generate(messages).await?;
        let _ = tx.send(StreamChunk::Text(text));
        let _ = tx.send(StreamChunk::Done {
            model: Some(self.model().to_string()),
        });
        Ok(())
    }
}

/// A base64-encoded image as uploaded by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data_base64: String,
}

impl ImageInput {
    pub fn new(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: data_base64.into(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// A model that can answer a prompt about an image.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    async fn describe(&self, prompt: &str, image: &ImageInput) -> Result<String>;
}

/// Trim an upstream error body for inclusion in an error message.
pub(crate) fn error_detail(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() > 800 {
        format!("{}...", body.chars().take(800).collect::<String>())
    } else {
        body.to_string()
    }
}
