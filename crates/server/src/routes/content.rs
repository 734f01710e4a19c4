use crate::error::ApiResult;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use services::content_filter::{check_content, FilterResult};

#[derive(Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    text: String,
}

/// Filter verdict for arbitrary text. Always 200; the verdict carries the result.
pub async fn check(payload: Result<Json<ContentRequest>, JsonRejection>) -> ApiResult<Json<FilterResult>> {
    let Json(request) = payload?;
    Ok(Json(check_content(&request.text)))
}
