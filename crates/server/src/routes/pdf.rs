//! `POST /api/pdf-extract`: multipart upload (`file` field) or JSON
//! `{ "data": "<base64>", "fileName": "..." }`.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use services::pdf::{extract_pdf, PdfExtraction, PdfMetadata};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PdfJsonBody {
    #[serde(default)]
    data: String,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMetadata {
    #[serde(flatten)]
    inner: PdfMetadata,
    file_name: Option<String>,
}

#[derive(Serialize)]
pub struct PdfResponse {
    success: bool,
    text: String,
    metadata: ResponseMetadata,
}

struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
}

pub async fn extract(State(state): State<AppState>, request: Request) -> ApiResult<Json<PdfResponse>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    let upload = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<PdfJsonBody>::from_request(request, &state).await?;
        let data = body.data.trim();
        let data = data
            .split_once(";base64,")
            .map_or(data, |(_, payload)| payload);
        if data.is_empty() {
            return Err(ApiError::bad_request("data must not be empty"));
        }
        let bytes = STANDARD
            .decode(data)
            .map_err(|_| ApiError::bad_request("data is not valid base64"))?;
        Upload {
            bytes,
            file_name: body.file_name,
        }
    };

    let limit = state.config.server.max_upload_bytes;
    if upload.bytes.len() > limit {
        return Err(ApiError::payload_too_large(format!(
            "PDF is larger than the {} byte limit",
            limit
        )));
    }

    let Upload { bytes, file_name } = upload;
    let size = bytes.len();
    let PdfExtraction { text, metadata } = tokio::task::spawn_blocking(move || extract_pdf(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("PDF extraction task failed: {}", e)))??;
    tracing::info!(
        "extracted {} chars from {} ({} bytes, {} pages)",
        metadata.characters,
        file_name.as_deref().unwrap_or("upload"),
        size,
        metadata.pages
    );

    Ok(Json(PdfResponse {
        success: true,
        text,
        metadata: ResponseMetadata {
            inner: metadata,
            file_name,
        },
    }))
}

async fn read_multipart(mut multipart: Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Upload {
            bytes: bytes.to_vec(),
            file_name,
        });
    }
    Err(ApiError::bad_request("no file field in upload"))
}
