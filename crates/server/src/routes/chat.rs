//! Tutor chat, plain and streamed.
//!
//! The streamed variant relays provider chunks as server-sent events named
//! `status`, `thinking`, `content`, `done` and `error`. One deadline covers
//! the whole upstream read, and dropping the response (client gone) aborts
//! the upstream task.

use crate::error::ApiResult;
use crate::routes::{ensure_safe, required};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use providers::fallback::canned_response;
use providers::{ProviderRouter, FALLBACK_PROVIDER};
use serde::Serialize;
use serde_json::json;
use services::classify::Subject;
use services::tutor::TutorRequest;
use shared::agent_api::{ChatMessage, StreamChunk};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    success: bool,
    response: String,
    model: String,
    provider: String,
    subject: Subject,
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<TutorRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    let message = required(&request.message, "message")?;
    ensure_safe(message)?;

    let reply = state.tutor.answer(&request).await;
    tracing::debug!("tutor reply from {} ({})", reply.provider, reply.model);
    Ok(Json(ChatResponse {
        success: true,
        response: reply.response,
        model: reply.model,
        provider: reply.provider,
        subject: reply.subject,
    }))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<TutorRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(request) = payload?;
    let question = required(&request.message, "message")?.to_string();
    ensure_safe(&question)?;

    let messages = state.tutor.build_messages(&request).await;
    let (tx, rx) = unbounded_channel();
    let task = tokio::spawn(relay(
        state.router.clone(),
        messages,
        question,
        tx,
        state.stream_timeout(),
    ));
    let guard = AbortOnDrop(task.abort_handle());

    let stream = UnboundedReceiverStream::new(rx).map(move |chunk| {
        let _ = &guard;
        Ok::<_, Infallible>(to_event(&chunk))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Aborts the upstream task when the event stream is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) fn to_event(chunk: &StreamChunk) -> Event {
    let data = match chunk {
        StreamChunk::Status(message) => json!({ "message": message }),
        StreamChunk::Thinking(text) => json!({ "text": text }),
        StreamChunk::Text(text) => json!({ "text": text }),
        StreamChunk::Done { model } => json!({ "model": model }),
        StreamChunk::Error(message) => json!({ "message": message }),
    };
    Event::default()
        .event(chunk.event_name())
        .data(data.to_string())
}

/// Stream a reply into `tx`, guaranteeing it ends with `done`.
///
/// Total failure before streaming becomes a single canned `content` chunk.
/// Hitting the deadline becomes an `error` chunk.
pub(crate) async fn relay(
    router: Arc<ProviderRouter>,
    messages: Vec<ChatMessage>,
    question: String,
    tx: UnboundedSender<StreamChunk>,
    deadline: Duration,
) {
    let (upstream_tx, mut upstream_rx) = unbounded_channel();
    let forward = async {
        let upstream = router.generate_stream(messages, upstream_tx);
        tokio::pin!(upstream);
        let mut outcome = None;
        let mut saw_done = false;
        loop {
            tokio::select! {
                result = &mut upstream, if outcome.is_none() => outcome = Some(result),
                chunk = upstream_rx.recv() => match chunk {
                    Some(chunk) => {
                        saw_done |= matches!(chunk, StreamChunk::Done { .. });
                        if tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        (outcome, saw_done)
    };

    match tokio::time::timeout(deadline, forward).await {
        Ok((Some(Err(e)), _)) => {
            tracing::error!("all chat providers failed to stream, using canned reply: {}", e);
            let _ = tx.send(StreamChunk::Text(canned_response(&question).to_string()));
            let _ = tx.send(StreamChunk::Done {
                model: Some(FALLBACK_PROVIDER.to_string()),
            });
        }
        Ok((_, true)) => {}
        Ok((_, false)) => {
            let _ = tx.send(StreamChunk::Done { model: None });
        }
        Err(_) => {
            tracing::warn!("streamed reply timed out after {:?}", deadline);
            let _ = tx.send(StreamChunk::Error(format!(
                "Request timed out after {} seconds",
                deadline.as_secs()
            )));
            let _ = tx.send(StreamChunk::Done { model: None });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use providers::ChatProvider;

    struct Slow;

    #[async_trait]
    impl ChatProvider for Slow {
        fn id(&self) -> &str {
            "local"
        }
        fn model(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _messages: Vec<ChatMessage>) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    struct Down;

    #[async_trait]
    impl ChatProvider for Down {
        fn id(&self) -> &str {
            "openai"
        }
        fn model(&self) -> &str {
            "down"
        }
        async fn generate(&self, _messages: Vec<ChatMessage>) -> Result<String> {
            Err(anyhow!("503"))
        }
    }

    async fn collect(router: ProviderRouter, deadline: Duration) -> Vec<StreamChunk> {
        let (tx, mut rx) = unbounded_channel();
        relay(Arc::new(router), vec![ChatMessage::user("hi")], "hello".into(), tx, deadline).await;
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn total_failure_streams_canned_content() {
        let chunks = collect(ProviderRouter::new(vec![Arc::new(Down)]), Duration::from_secs(5)).await;
        let texts: Vec<&StreamChunk> = chunks
            .iter()
            .filter(|c| matches!(c, StreamChunk::Text(_)))
            .collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(
            chunks.last(),
            Some(&StreamChunk::Done {
                model: Some("fallback".into())
            })
        );
    }

    #[tokio::test]
    async fn deadline_emits_error_then_done() {
        let chunks = collect(ProviderRouter::new(vec![Arc::new(Slow)]), Duration::from_secs(1)).await;
        let n = chunks.len();
        assert!(matches!(chunks[n - 2], StreamChunk::Error(ref m) if m.contains("timed out")));
        assert_eq!(chunks[n - 1], StreamChunk::Done { model: None });
    }
}
