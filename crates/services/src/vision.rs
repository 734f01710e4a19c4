//! Image questions: an optional on-topic check followed by analysis.
//!
//! Both steps are single sequential provider calls. The check uses only the
//! first vision provider and lets the image through if it errors; analysis
//! falls through every provider and ends in a canned reply.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use providers::{ImageInput, VisionProvider, FALLBACK_PROVIDER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
];

const FALLBACK_ANALYSIS: &str = "I can't analyze images right now because the AI vision \
service is unavailable. Try describing what the image shows in text, or upload it again in a \
few minutes.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisionInputError {
    #[error("image data is required")]
    MissingImage,

    #[error("unsupported image type '{0}' (use PNG, JPEG, GIF or WebP)")]
    UnsupportedType(String),

    #[error("image data is not valid base64")]
    InvalidBase64,
}

/// Course the chat is attached to, used for the relevance check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseData {
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl CourseData {
    fn label(&self) -> String {
        match (self.class_code.trim(), self.class_name.trim()) {
            ("", "") => "this course".to_string(),
            (code, "") => code.to_string(),
            ("", name) => name.to_string(),
            (code, name) => format!("{} ({})", name, code),
        }
    }

    fn is_blank(&self) -> bool {
        self.class_code.trim().is_empty()
            && self.class_name.trim().is_empty()
            && self.description.trim().is_empty()
            && self.topics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    NotRelevant(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisionReply {
    pub response: String,
    pub model: String,
    pub provider: String,
    /// False when the image was turned away as off-topic.
    pub accepted: bool,
}

/// Check mime type and payload, accepting a `data:` URL as well as bare base64.
pub fn validate_image(image: &str, mime_type: &str) -> Result<ImageInput, VisionInputError> {
    let mut data = image.trim();
    let mut mime = mime_type.trim().to_ascii_lowercase();
    if let Some(rest) = data.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(',') {
            if mime.is_empty() {
                mime = header.trim_end_matches(";base64").to_ascii_lowercase();
            }
            data = payload;
        }
    }
    if data.is_empty() {
        return Err(VisionInputError::MissingImage);
    }
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(VisionInputError::UnsupportedType(mime));
    }
    STANDARD
        .decode(data)
        .map_err(|_| VisionInputError::InvalidBase64)?;
    Ok(ImageInput::new(mime, data))
}

/// Read a `RELEVANT` / `NOT_RELEVANT: reason` verdict. Anything else counts
/// as relevant.
pub fn parse_verdict(reply: &str) -> Relevance {
    let trimmed = reply.trim();
    let upper = trimmed.to_ascii_uppercase();
    match upper.find("NOT_RELEVANT") {
        Some(idx) => {
            let after = &trimmed[idx + "NOT_RELEVANT".len()..];
            let reason = after.trim_start_matches([':', ' ', '-']).trim();
            Relevance::NotRelevant(if reason.is_empty() {
                "it does not look related to the course".to_string()
            } else {
                reason.to_string()
            })
        }
        None => Relevance::Relevant,
    }
}

fn relevance_prompt(course: &CourseData) -> String {
    let mut prompt = format!(
        "A student uploaded this image to the study chat for {}.",
        course.label()
    );
    if !course.description.trim().is_empty() {
        prompt.push_str(&format!(" Course description: {}.", course.description.trim()));
    }
    if !course.topics.is_empty() {
        prompt.push_str(&format!(" Topics: {}.", course.topics.join(", ")));
    }
    prompt.push_str(
        " Is the image plausibly related to this course or to studying in general (notes, \
         diagrams, problems, slides, textbook pages)? Reply with exactly RELEVANT, or \
         NOT_RELEVANT: followed by a short reason.",
    );
    prompt
}

fn analysis_prompt(message: &str, course: Option<&CourseData>) -> String {
    let mut prompt = String::from(
        "You are CourseConnect AI, a study tutor. Look carefully at the image and help the student.",
    );
    if let Some(course) = course.filter(|c| !c.is_blank()) {
        prompt.push_str(&format!(" The student is taking {}.", course.label()));
    }
    let message = message.trim();
    if message.is_empty() {
        prompt.push_str(" Explain what the image shows and how it relates to their studies.");
    } else {
        prompt.push_str("\n\nStudent's question: ");
        prompt.push_str(message);
    }
    prompt
}

pub struct VisionService {
    providers: Vec<Arc<dyn VisionProvider>>,
}

impl VisionService {
    pub fn new(providers: Vec<Arc<dyn VisionProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Ask the first provider whether the image fits the course. Errors and
    /// a missing provider count as a pass.
    pub async fn check_relevance(&self, image: &ImageInput, course: &CourseData) -> Relevance {
        let Some(provider) = self.providers.first() else {
            return Relevance::Relevant;
        };
        match provider.describe(&relevance_prompt(course), image).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                tracing::warn!("image relevance check failed, allowing image: {}", e);
                Relevance::Relevant
            }
        }
    }

    /// Analyse the image with each provider in turn, ending in a canned reply.
    pub async fn analyze(&self, message: &str, image: &ImageInput, course: Option<&CourseData>) -> VisionReply {
        let prompt = analysis_prompt(message, course);
        for provider in &self.providers {
            match provider.describe(&prompt, image).await {
                Ok(text) if !text.trim().is_empty() => {
                    return VisionReply {
                        response: text,
                        model: provider.model().to_string(),
                        provider: provider.id().to_string(),
                        accepted: true,
                    };
                }
                Ok(_) => tracing::warn!("vision provider {} returned an empty reply", provider.id()),
                Err(e) => tracing::warn!("vision provider {} failed: {}", provider.id(), e),
            }
        }
        tracing::error!("all vision providers failed, using canned reply");
        VisionReply {
            response: FALLBACK_ANALYSIS.to_string(),
            model: FALLBACK_PROVIDER.to_string(),
            provider: FALLBACK_PROVIDER.to_string(),
            accepted: true,
        }
    }

    /// Full flow: relevance check when course data is present, then analysis.
    pub async fn respond(&self, message: &str, image: &ImageInput, course: Option<&CourseData>) -> VisionReply {
        if let Some(course) = course.filter(|c| !c.is_blank()) {
            if let Relevance::NotRelevant(reason) = self.check_relevance(image, course).await {
                tracing::info!("image rejected as off-topic for {}: {}", course.label(), reason);
                let (model, provider) = self
                    .providers
                    .first()
                    .map(|p| (p.model().to_string(), p.id().to_string()))
                    .unwrap_or_else(|| (FALLBACK_PROVIDER.to_string(), FALLBACK_PROVIDER.to_string()));
                return VisionReply {
                    response: format!(
                        "This image doesn't seem to be related to {}: {}. Please share an image \
                         of your course material, such as notes, a problem, or a diagram, and \
                         I'll be glad to help.",
                        course.label(),
                        reason.trim_end_matches('.')
                    ),
                    model,
                    provider,
                    accepted: false,
                };
            }
        }
        self.analyze(message, image, course).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // 1x1 transparent PNG
    const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    struct Scripted {
        id: &'static str,
        replies: Vec<Result<&'static str, &'static str>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(id: &'static str, replies: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                id,
                replies,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionProvider for Scripted {
        fn id(&self) -> &str {
            self.id
        }
        fn model(&self) -> &str {
            "vision-test"
        }
        async fn describe(&self, _prompt: &str, _image: &ImageInput) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(n).or(self.replies.last()) {
                Some(Ok(text)) => Ok(text.to_string()),
                Some(Err(e)) => Err(anyhow!(*e)),
                None => Err(anyhow!("no script")),
            }
        }
    }

    fn course() -> CourseData {
        CourseData {
            class_code: "BIO 110".into(),
            class_name: "Intro Biology".into(),
            ..Default::default()
        }
    }

    #[test]
    fn validates_mime_and_base64() {
        assert!(validate_image(PNG, "image/png").is_ok());
        assert!(validate_image(PNG, "IMAGE/JPEG").is_ok());
        assert_eq!(
            validate_image(PNG, "application/pdf"),
            Err(VisionInputError::UnsupportedType("application/pdf".into()))
        );
        assert_eq!(validate_image("not base64!!", "image/png"), Err(VisionInputError::InvalidBase64));
        assert_eq!(validate_image("", "image/png"), Err(VisionInputError::MissingImage));
    }

    #[test]
    fn data_urls_are_unwrapped() {
        let url = format!("data:image/png;base64,{}", PNG);
        let image = validate_image(&url, "").unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data_base64, PNG);
    }

    #[test]
    fn verdicts() {
        assert_eq!(parse_verdict("RELEVANT"), Relevance::Relevant);
        assert_eq!(
            parse_verdict("NOT_RELEVANT: a photo of a cat"),
            Relevance::NotRelevant("a photo of a cat".into())
        );
        assert!(matches!(parse_verdict("not_relevant"), Relevance::NotRelevant(_)));
        assert_eq!(parse_verdict("I think so"), Relevance::Relevant);
    }

    #[tokio::test]
    async fn off_topic_image_is_rejected() {
        let provider = Scripted::new("openai", vec![Ok("NOT_RELEVANT: it is a selfie")]);
        let service = VisionService::new(vec![provider.clone()]);
        let image = validate_image(PNG, "image/png").unwrap();
        let reply = service.respond("what is this?", &image, Some(&course())).await;
        assert!(!reply.accepted);
        assert!(reply.response.contains("selfie"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_error_lets_image_through() {
        let provider = Scripted::new("openai", vec![Err("timeout"), Ok("A diagram of mitosis.")]);
        let service = VisionService::new(vec![provider]);
        let image = validate_image(PNG, "image/png").unwrap();
        let reply = service.respond("", &image, Some(&course())).await;
        assert!(reply.accepted);
        assert_eq!(reply.response, "A diagram of mitosis.");
        assert_eq!(reply.provider, "openai");
    }

    #[tokio::test]
    async fn analysis_falls_through_then_cans() {
        let image = validate_image(PNG, "image/png").unwrap();
        let service = VisionService::new(vec![
            Scripted::new("openai", vec![Err("down")]),
            Scripted::new("gemini", vec![Ok("Looks like a graph of y = x^2.")]),
        ]);
        let reply = service.analyze("explain", &image, None).await;
        assert_eq!(reply.provider, "gemini");

        let empty = VisionService::new(vec![]);
        let reply = empty.respond("explain", &image, Some(&course())).await;
        assert_eq!(reply.provider, FALLBACK_PROVIDER);
        assert!(reply.accepted);
        assert!(!reply.response.is_empty());
    }
}
