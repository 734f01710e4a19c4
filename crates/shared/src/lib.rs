pub mod course;
pub mod events;
pub mod settings;

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".into(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".into(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".into(),
                content: content.into(),
            }
        }
    }

    /// One increment of a streamed model reply.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamChunk {
        /// Progress note for the client ("Connecting to gemini...").
        Status(String),
        /// Reasoning tokens, for models that expose them.
        Thinking(String),
        Text(String),
        /// Terminal chunk. `model` names whoever produced the reply.
        Done { model: Option<String> },
        Error(String),
    }

    impl StreamChunk {
        /// Name of the event this chunk is relayed as.
        pub fn event_name(&self) -> &'static str {
            match self {
                StreamChunk::Status(_) => "status",
                StreamChunk::Thinking(_) => "thinking",
                StreamChunk::Text(_) => "content",
                StreamChunk::Done { .. } => "done",
                StreamChunk::Error(_) => "error",
            }
        }
    }
}

pub mod search_types {
    use serde::{Deserialize, Serialize};

    /// A single web search hit.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SearchHit {
        pub title: String,
        pub url: String,
        pub snippet: String,
    }
}
