use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::settings::{ModelProvider, ProviderAuth};
use std::time::Duration;

use crate::provider::{error_detail, ChatProvider, ImageInput, VisionProvider};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

fn to_gemini_request(messages: Vec<ChatMessage>) -> GeminiRequest {
    let mut system_instruction = None;
    let mut contents: Vec<GeminiContent> = Vec::new();
    for m in messages {
        if m.role == "system" {
            system_instruction = Some(GeminiContent {
                role: "system".to_string(),
                parts: vec![GeminiPart::text(m.content)],
            });
        } else {
            // Gemini expects roles: "user" | "model".
            let role = match m.role.as_str() {
                "assistant" => "model",
                "user" => "user",
                other => other,
            };
            contents.push(GeminiContent {
                role: role.to_string(),
                parts: vec![GeminiPart::text(m.content)],
            });
        }
    }
    GeminiRequest {
        contents,
        system_instruction,
    }
}

fn response_text(body: GeminiResponse) -> String {
    body.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn from_auth(model: &str, auth: &ProviderAuth, timeout: Duration) -> Result<Self> {
        let auth_token = auth
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("No Gemini authentication configured (GOOGLE_AI_API_KEY)"))?;

        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            auth_token,
            model: model.to_string(),
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn chat_from_config(config: &ModelProvider) -> Result<Self> {
        Self::from_auth(
            &config.gemini_model,
            &config.gemini_auth,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn vision_from_config(config: &ModelProvider) -> Result<Self> {
        Self::from_auth(
            &config.gemini_vision_model,
            &config.gemini_auth,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn send(&self, req: &GeminiRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.auth_token)
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            if detail.is_empty() {
                return Err(anyhow!("gemini error: {}", status));
            }
            return Err(anyhow!("gemini error: {}\n{}", status, detail));
        }
        let body: GeminiResponse = resp.json().await?;
        Ok(response_text(body))
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.send(&to_gemini_request(messages)).await
    }
}

#[async_trait]
impl VisionProvider for GeminiClient {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn describe(&self, prompt: &str, image: &ImageInput) -> Result<String> {
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiPart::text(prompt),
                    GeminiPart {
                        text: None,
                        inline_data: Some(GeminiInlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.data_base64.clone(),
                        }),
                    },
                ],
            }],
            system_instruction: None,
        };
        self.send(&req).await
    }
}
