use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").unwrap());

#[derive(Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    email: String,
}

#[derive(Serialize)]
pub struct SubscribeResponse {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
pub struct CountResponse {
    count: usize,
}

/// 201 for a new subscriber, 200 when the address was already on the list.
pub async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubscribeResponse>)> {
    let Json(request) = payload?;
    let email = request.email.trim();
    if !EMAIL.is_match(email) {
        return Err(ApiError::bad_request("a valid email address is required"));
    }
    if state.store.subscribe(email)? {
        tracing::info!("new newsletter subscriber ({} total)", state.store.subscriber_count()?);
        Ok((
            StatusCode::CREATED,
            Json(SubscribeResponse {
                success: true,
                message: "Successfully subscribed to the newsletter",
            }),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(SubscribeResponse {
                success: true,
                message: "Already subscribed",
            }),
        ))
    }
}

pub async fn count(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    Ok(Json(CountResponse {
        count: state.store.subscriber_count()?,
    }))
}
