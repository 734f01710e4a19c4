pub mod chat;
pub mod content;
pub mod health;
pub mod newsletter;
pub mod pdf;
pub mod search;
pub mod socket;
pub mod syllabus;
pub mod username;
pub mod vision;

use crate::error::{ApiError, ApiResult};
use services::content_filter::check_content;

/// Trimmed `value`, or a 400 naming `field` when it is blank.
pub(crate) fn required<'a>(value: &'a str, field: &str) -> ApiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} must not be empty", field)));
    }
    Ok(value)
}

/// Reject text the content filter flags.
pub(crate) fn ensure_safe(text: &str) -> ApiResult<()> {
    let verdict = check_content(text);
    if verdict.is_safe {
        return Ok(());
    }
    let reason = verdict.reason.unwrap_or_else(|| "inappropriate content".to_string());
    tracing::info!("rejected message: {}", reason);
    Err(ApiError::content_rejected(format!(
        "Your message was blocked: {}. Please keep the conversation respectful and on topic.",
        reason
    )))
}
