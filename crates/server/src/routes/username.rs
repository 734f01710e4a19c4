use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use services::username::{validate_username, UsernameError};

#[derive(Deserialize)]
pub struct UsernameRequest {
    #[serde(default)]
    username: String,
    /// Record the name as used when it is valid.
    #[serde(default)]
    claim: bool,
}

#[derive(Serialize)]
pub struct UsernameResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl UsernameResponse {
    fn rejected(err: UsernameError) -> Self {
        Self {
            valid: false,
            username: None,
            error: Some(err.to_string()),
        }
    }
}

/// Validation outcome is always a 200; `valid` says whether the name passed.
pub async fn validate(
    State(state): State<AppState>,
    payload: Result<Json<UsernameRequest>, JsonRejection>,
) -> ApiResult<Json<UsernameResponse>> {
    let Json(request) = payload?;
    let taken = state.store.guest_names()?;
    let name = match validate_username(&request.username, taken.iter().map(String::as_str)) {
        Ok(name) => name,
        Err(e) => return Ok(Json(UsernameResponse::rejected(e))),
    };
    // a concurrent claim can win between the check and the insert
    if request.claim && !state.store.claim_guest_name(&name)? {
        return Ok(Json(UsernameResponse::rejected(UsernameError::Taken)));
    }
    Ok(Json(UsernameResponse {
        valid: true,
        username: Some(name),
        error: None,
    }))
}
