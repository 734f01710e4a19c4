use crate::error::{ApiError, ApiResult};
use crate::routes::ensure_safe;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use services::vision::{validate_image, CourseData, VisionReply};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    course_data: Option<CourseData>,
}

/// Relevance check (when course data is given) followed by analysis.
pub async fn vision(
    State(state): State<AppState>,
    payload: Result<Json<VisionRequest>, JsonRejection>,
) -> ApiResult<Json<VisionReply>> {
    let Json(request) = payload?;
    let image = validate_image(&request.image, &request.mime_type)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if !request.message.trim().is_empty() {
        ensure_safe(&request.message)?;
    }
    let reply = state
        .vision
        .respond(&request.message, &image, request.course_data.as_ref())
        .await;
    Ok(Json(reply))
}
