//! JSON error responses.
//!
//! Every error leaves the server as
//! `{ "error": { "code": "bad_request", "message": "..." } }`.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use services::pdf::PdfError;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn content_rejected(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "content_rejected", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("request failed: {:#}", err);
        Self::internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large("request body is too large")
        } else {
            Self::bad_request(rejection.body_text())
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large("upload is too large")
        } else {
            Self::bad_request(err.body_text())
        }
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::NotPdf | PdfError::Empty => {
                Self::new(StatusCode::BAD_REQUEST, "not_pdf", err.to_string())
            }
            PdfError::Scanned { ref primary, ref fallback } => {
                tracing::info!("no text in PDF (pdf-extract: {}; lopdf: {})", primary, fallback);
                Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "scanned_pdf",
                    "Could not extract text from this PDF. It may be a scanned, image-only document.",
                )
            }
            PdfError::Io(e) => Self::internal(format!("failed to process PDF: {}", e)),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
