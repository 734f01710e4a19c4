//! The AI study tutor behind `/api/ai/chat` and `@ai` room mentions.

use crate::classify::{classify_complexity, classify_subject, tutor_system_prompt, Subject};
use providers::duckduckgo::DuckDuckGoClient;
use providers::{Generation, ProviderRouter};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use std::sync::Arc;

/// Most recent history turns forwarded to the model.
pub const MAX_HISTORY_TURNS: usize = 10;

const SEARCH_TRIGGERS: &[&str] = &["latest", "current", "news", "today", "search"];

/// One prior turn as the web client sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    #[serde(alias = "text")]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReply {
    pub response: String,
    pub model: String,
    pub provider: String,
    pub subject: Subject,
}

/// Whether the question asks for information fresher than the model's.
pub fn needs_web_search(question: &str) -> bool {
    let words: Vec<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    SEARCH_TRIGGERS.iter().any(|t| words.iter().any(|w| w == t))
}

pub struct Tutor {
    router: Arc<ProviderRouter>,
    search: Option<Arc<DuckDuckGoClient>>,
    max_results: usize,
}

impl Tutor {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            search: None,
            max_results: 0,
        }
    }

    pub fn with_search(mut self, client: Arc<DuckDuckGoClient>, max_results: usize) -> Self {
        self.search = Some(client);
        self.max_results = max_results;
        self
    }

    /// Build the full message list for `request`, including any search
    /// context. Search failures are logged and ignored.
    pub async fn build_messages(&self, request: &TutorRequest) -> Vec<ChatMessage> {
        let question = request.message.trim();
        let subject = classify_subject(question);
        let complexity = classify_complexity(question);
        let mut system = tutor_system_prompt(subject, complexity, request.context.as_deref());

        if let Some(client) = self.search.as_ref().filter(|_| needs_web_search(question)) {
            match client.search(question, self.max_results).await {
                Ok(hits) if !hits.is_empty() => {
                    system.push_str("\n\nRecent web results (cite them when relevant):\n");
                    for hit in hits {
                        system.push_str(&format!("- {} ({}): {}\n", hit.title, hit.url, hit.snippet));
                    }
                }
                Ok(_) => tracing::debug!("web search returned nothing for tutor question"),
                Err(e) => tracing::warn!("web search failed, answering without it: {}", e),
            }
        }

        let mut messages = vec![ChatMessage::system(system)];
        let skip = request
            .conversation_history
            .len()
            .saturating_sub(MAX_HISTORY_TURNS);
        for turn in request.conversation_history.iter().skip(skip) {
            if turn.content.trim().is_empty() {
                continue;
            }
            messages.push(match turn.role.as_str() {
                "assistant" | "ai" | "bot" | "model" => ChatMessage::assistant(turn.content.clone()),
                _ => ChatMessage::user(turn.content.clone()),
            });
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Answer a question. Always produces a non-empty reply; when every
    /// provider fails it is a canned one.
    pub async fn answer(&self, request: &TutorRequest) -> TutorReply {
        let subject = classify_subject(&request.message);
        let messages = self.build_messages(request).await;
        let generation = self.router.generate_or_fallback(messages, &request.message).await;
        if generation.is_fallback() {
            tracing::warn!("tutor answered {} question with a canned reply", subject.as_str());
        }
        let Generation { text, model, provider } = generation;
        TutorReply {
            response: text,
            model,
            provider,
            subject,
        }
    }

    /// Shorthand for a bare question with no history.
    pub async fn ask(&self, question: &str, context: Option<&str>) -> TutorReply {
        let request = TutorRequest {
            message: question.to_string(),
            context: context.map(str::to_string),
            conversation_history: Vec::new(),
        };
        self.answer(&request).await
    }
}
