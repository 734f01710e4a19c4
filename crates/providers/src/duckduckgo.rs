//! DuckDuckGo Instant Answer search.
//!
//! Used to give the tutor some fresh context for questions about current
//! events. The API is keyless and returns an abstract plus related topics.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use shared::search_types::SearchHit;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com/";

pub struct DuckDuckGoClient {
    http: Client,
    base_url: String,
}

impl DuckDuckGoClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.to_string(),
        })
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(anyhow!("search query must not be empty"));
        }
        let url = url::Url::parse_with_params(
            &self.base_url,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )?;
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("duckduckgo error: {}", resp.status()));
        }
        let body: Value = resp.json().await?;
        Ok(parse_instant_answer(&body, max_results))
    }
}

/// Flatten an Instant Answer payload into hits: the abstract first, then
/// related topics (including those nested one level inside topic groups).
pub fn parse_instant_answer(body: &Value, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    let abstract_url = str_field(body, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = str_field(body, "Heading");
        hits.push(SearchHit {
            title: if heading.is_empty() {
                title_from_text(abstract_text)
            } else {
                heading.to_string()
            },
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = body.get("RelatedTopics").and_then(|t| t.as_array()) {
        for topic in topics {
            if let Some(nested) = topic.get("Topics").and_then(|t| t.as_array()) {
                hits.extend(nested.iter().filter_map(topic_hit));
            } else if let Some(hit) = topic_hit(topic) {
                hits.push(hit);
            }
        }
    }

    hits.truncate(max_results);
    hits
}

fn topic_hit(topic: &Value) -> Option<SearchHit> {
    let text = str_field(topic, "Text");
    let url = str_field(topic, "FirstURL");
    if text.is_empty() || url.is_empty() {
        return None;
    }
    Some(SearchHit {
        title: title_from_text(text),
        url: url.to_string(),
        snippet: text.to_string(),
    })
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("").trim()
}

fn title_from_text(text: &str) -> String {
    let head = text.split(" - ").next().unwrap_or(text).trim();
    if head.chars().count() > 80 {
        format!("{}...", head.chars().take(80).collect::<String>())
    } else {
        head.to_string()
    }
}
