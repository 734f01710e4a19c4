use crate::fallback::canned_response;
use crate::gemini::GeminiClient;
use crate::ollama::OllamaClient;
use crate::openai::OpenAIClient;
use crate::provider::{ChatProvider, VisionProvider};
use anyhow::{anyhow, Result};
use serde::Serialize;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::settings::ModelProvider;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Provider and model name reported for canned replies.
pub const FALLBACK_PROVIDER: &str = "fallback";

/// A reply and who produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub provider: String,
}

impl Generation {
    pub fn canned(question: &str) -> Self {
        Self {
            text: canned_response(question).to_string(),
            model: FALLBACK_PROVIDER.to_string(),
            provider: FALLBACK_PROVIDER.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provider == FALLBACK_PROVIDER
    }
}

/// Build the chat adapter registered under `name`.
pub fn build_chat_provider(name: &str, config: &ModelProvider) -> Result<Arc<dyn ChatProvider>> {
    Ok(match name {
        "local" | "ollama" => Arc::new(OllamaClient::from_config(config)?),
        "openai" => Arc::new(OpenAIClient::chat_from_config(config)?),
        "gemini" => Arc::new(GeminiClient::chat_from_config(config)?),
        other => return Err(anyhow!("Unknown provider: {}", other)),
    })
}

/// Build the image-capable adapters in `vision_preference` order, skipping
/// any that cannot be configured.
pub fn build_vision_providers(config: &ModelProvider) -> Vec<Arc<dyn VisionProvider>> {
    let mut out: Vec<Arc<dyn VisionProvider>> = Vec::new();
    for name in &config.vision_preference {
        let built: Result<Arc<dyn VisionProvider>> = match name.as_str() {
            "openai" => OpenAIClient::vision_from_config(config)
                .map(|c| Arc::new(c) as Arc<dyn VisionProvider>),
            "gemini" => GeminiClient::vision_from_config(config)
                .map(|c| Arc::new(c) as Arc<dyn VisionProvider>),
            other => Err(anyhow!("Unknown vision provider: {}", other)),
        };
        match built {
            Ok(p) => out.push(p),
            Err(e) => tracing::warn!("vision provider {} unavailable: {}", name, e),
        }
    }
    out
}

/// Tries chat providers in preference order, falling back on failure.
///
/// No retries, no backoff: each provider gets exactly one attempt per call.
pub struct ProviderRouter {
    providers: Vec<Arc<dyn ChatProvider>>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self { providers }
    }

    /// Build adapters from `provider_preference`. Providers that cannot be
    /// configured (usually a missing API key) are skipped with a warning.
    pub fn from_config(config: &ModelProvider) -> Self {
        let mut providers = Vec::new();
        for name in &config.provider_preference {
            match build_chat_provider(name, config) {
                Ok(p) => providers.push(p),
                Err(e) => tracing::warn!("chat provider {} unavailable: {}", name, e),
            }
        }
        Self { providers }
    }

    /// Returns the name of the first configured provider.
    pub fn active_provider(&self) -> Option<&str> {
        self.providers.first().map(|p| p.id())
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<Generation> {
        let mut last_error = None;

        // Try providers in order of preference, falling back on failure
        for provider in &self.providers {
            match provider.generate(messages.clone()).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(Generation {
                        text,
                        model: provider.model().to_string(),
                        provider: provider.id().to_string(),
                    });
                }
                Ok(_) => {
                    tracing::warn!("provider {} returned an empty reply", provider.id());
                    last_error = Some(anyhow!("{} returned an empty reply", provider.id()));
                }
                Err(e) => {
                    tracing::warn!("provider {} failed: {}", provider.id(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No providers configured")))
    }

    /// Like [`generate`](Self::generate), but a total failure yields a canned
    /// reply picked from `question` instead of an error.
    pub async fn generate_or_fallback(&self, messages: Vec<ChatMessage>, question: &str) -> Generation {
        match self.generate(messages).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::error!("all chat providers failed, using canned reply: {}", e);
                Generation::canned(question)
            }
        }
    }

    /// Streaming generation with provider fallback.
    ///
    /// Contract: if a provider fails *before* any chunks are sent, the next one
    /// is tried. Once streaming starts, errors go through `StreamChunk::Error`
    /// and the method returns `Ok(())`. `Err` means nobody could stream.
    pub async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let mut last_error = None;

        for provider in &self.providers {
            let _ = tx.send(StreamChunk::Status(format!(
                "Connecting to {} ({})...",
                provider.id(),
                provider.model()
            )));
            match provider.generate_stream(messages.clone(), tx.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("provider {} failed to stream: {}", provider.id(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No providers configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::unbounded_channel;

    struct Scripted {
        id: &'static str,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(id: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply: Some(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        fn id(&self) -> &str {
            self.id
        }
        fn model(&self) -> &str {
            "test-model"
        }
        async fn generate(&self, _messages: Vec<ChatMessage>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow!("{} is down", self.id))
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let a = Scripted::ok("local", "from local");
        let b = Scripted::ok("openai", "from openai");
        let router = ProviderRouter::new(vec![a.clone(), b.clone()]);
        let out = router.generate(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(out.provider, "local");
        assert_eq!(out.text, "from local");
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_through_on_failure() {
        let a = Scripted::failing("local");
        let b = Scripted::ok("gemini", "from gemini");
        let router = ProviderRouter::new(vec![a.clone(), b]);
        let out = router.generate(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(out.provider, "gemini");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_reply_counts_as_failure() {
        let router = ProviderRouter::new(vec![
            Scripted::ok("local", "   "),
            Scripted::ok("openai", "real answer"),
        ]);
        let out = router.generate(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(out.provider, "openai");
    }

    #[tokio::test]
    async fn all_failing_yields_canned_reply() {
        let router = ProviderRouter::new(vec![Scripted::failing("local"), Scripted::failing("openai")]);
        let out = router
            .generate_or_fallback(vec![ChatMessage::user("hello")], "hello")
            .await;
        assert!(out.is_fallback());
        assert_eq!(out.model, FALLBACK_PROVIDER);
        assert!(!out.text.is_empty());
    }

    #[tokio::test]
    async fn no_providers_is_an_error() {
        let router = ProviderRouter::new(vec![]);
        assert!(router.generate(vec![]).await.is_err());
        assert_eq!(router.active_provider(), None);
    }

    #[tokio::test]
    async fn stream_falls_through_to_next_provider() {
        let router = ProviderRouter::new(vec![
            Scripted::failing("local"),
            Scripted::ok("gemini", "streamed"),
        ]);
        let (tx, mut rx) = unbounded_channel();
        router
            .generate_stream(vec![ChatMessage::user("hi")], tx)
            .await
            .unwrap();
        let mut chunks = Vec::new();
        while let Some(c) = rx.recv().await {
            chunks.push(c);
        }
        let statuses = chunks
            .iter()
            .filter(|c| matches!(c, StreamChunk::Status(_)))
            .count();
        assert_eq!(statuses, 2);
        assert!(chunks.contains(&StreamChunk::Text("streamed".into())));
        assert!(matches!(chunks.last(), Some(StreamChunk::Done { .. })));
    }

    #[tokio::test]
    async fn stream_reports_total_failure() {
        let router = ProviderRouter::new(vec![Scripted::failing("local")]);
        let (tx, _rx) = unbounded_channel();
        assert!(router.generate_stream(vec![], tx).await.is_err());
    }

    #[test]
    fn unavailable_providers_are_skipped() {
        let config = ModelProvider {
            provider_preference: vec!["openai".into(), "local".into()],
            ..Default::default()
        };
        // No OpenAI key in the default auth, so only the local adapter remains
        let router = ProviderRouter::from_config(&config);
        assert_eq!(router.provider_ids(), vec!["local".to_string()]);
        assert!(build_vision_providers(&config).is_empty());
    }
}
