//! Syllabus parsing, class matching and the upload flow that joins or
//! creates a class group.

use crate::error::{ApiError, ApiResult};
use crate::routes::required;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use services::matching::find_matches;
use shared::course::{ClassGroup, ClassMatch, SyllabusData};

#[derive(Deserialize)]
pub struct ParseRequest {
    #[serde(default)]
    text: String,
}

pub async fn parse(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> ApiResult<Json<SyllabusData>> {
    let Json(request) = payload?;
    let text = required(&request.text, "text")?;
    Ok(Json(state.syllabus.parse(text).await))
}

#[derive(Deserialize)]
pub struct MatchRequest {
    syllabus: SyllabusData,
}

#[derive(Serialize)]
pub struct MatchResponse {
    matches: Vec<ClassMatch>,
}

pub async fn find(
    State(state): State<AppState>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> ApiResult<Json<MatchResponse>> {
    let Json(request) = payload?;
    let groups = state.store.list_public_groups()?;
    let matches = find_matches(&request.syllabus, &groups, state.config.matching.threshold);
    Ok(Json(MatchResponse { matches }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    syllabus: Option<SyllabusData>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadAction {
    Joined,
    Created,
}

#[derive(Serialize)]
pub struct UploadResponse {
    action: UploadAction,
    group: ClassGroup,
    matches: Vec<ClassMatch>,
}

/// Store the syllabus, then join the best matching public group or start a
/// new one with the uploader as its first member.
pub async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let Json(request) = payload?;
    let user_id = required(&request.user_id, "userId")?.to_string();

    let syllabus = match (request.syllabus, request.text.as_deref().map(str::trim)) {
        (Some(data), _) if !data.is_empty() => data,
        (_, Some(text)) if !text.is_empty() => state.syllabus.parse(text).await,
        _ => return Err(ApiError::bad_request("syllabus or text is required")),
    };
    if syllabus.is_empty() {
        return Err(ApiError::bad_request(
            "could not find any class information in the syllabus",
        ));
    }

    let groups = state.store.list_public_groups()?;
    let matches = find_matches(&syllabus, &groups, state.config.matching.threshold);

    let (action, group) = match matches.first() {
        Some(best) => {
            let group = state
                .store
                .add_member(&best.group_id, &user_id)?
                .ok_or_else(|| ApiError::not_found(format!("class group {} vanished", best.group_id)))?;
            tracing::info!("{} joined {} (score {})", user_id, group.class_code, best.score);
            (UploadAction::Joined, group)
        }
        None => {
            let group = ClassGroup::from_syllabus(&syllabus, &user_id);
            state.store.save_group(&group)?;
            tracing::info!("{} created group {} for {}", user_id, group.id, group.class_code);
            (UploadAction::Created, group)
        }
    };
    state.store.save_syllabus(&user_id, Some(&group.id), &syllabus)?;

    Ok(Json(UploadResponse {
        action,
        group,
        matches,
    }))
}

#[derive(Serialize)]
pub struct SyllabiResponse {
    syllabi: Vec<SyllabusData>,
}

/// Every syllabus a user has uploaded, oldest first.
pub async fn for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<SyllabiResponse>> {
    Ok(Json(SyllabiResponse {
        syllabi: state.store.syllabi_for_user(&user_id)?,
    }))
}
