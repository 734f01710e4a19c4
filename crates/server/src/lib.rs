//! HTTP and WebSocket front end for the CourseConnect study services.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Status and configured providers |
//! | `POST` | `/api/ai/chat` | Tutor answer (JSON) |
//! | `POST` | `/api/ai/chat/stream` | Tutor answer as server-sent events |
//! | `POST` | `/api/chat/vision` | Image question with relevance check |
//! | `POST` | `/api/pdf-extract` | PDF text extraction (multipart or base64 JSON) |
//! | `POST` | `/api/syllabus/parse` | Syllabus text to course metadata |
//! | `POST` | `/api/syllabus/match` | Score a syllabus against public groups |
//! | `POST` | `/api/syllabus/upload` | Join the best matching group or create one |
//! | `GET`  | `/api/users/{user_id}/syllabi` | Syllabi a user has uploaded |
//! | `POST` | `/api/content/check` | Content filter verdict |
//! | `POST` | `/api/username/validate` | Guest name rules, optionally claiming it |
//! | `GET`/`POST` | `/api/newsletter` | Subscriber count / subscribe |
//! | `POST` | `/api/search` | Web search |
//! | `GET`  | `/api/rooms/{room_id}/messages` | Persisted room history |
//! | `GET`  | `/api/socketio` | Real-time rooms over WebSocket |

pub mod error;
pub mod routes;
pub mod state;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use shared::settings::AppConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the router with all routes and layers.
pub fn build_app(state: AppState) -> Router {
    // base64 JSON uploads are a third larger than the file itself
    let body_limit = state.config.server.max_upload_bytes.saturating_mul(2);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/ai/chat", post(routes::chat::chat))
        .route("/api/ai/chat/stream", post(routes::chat::chat_stream))
        .route("/api/chat/vision", post(routes::vision::vision))
        .route("/api/pdf-extract", post(routes::pdf::extract))
        .route("/api/syllabus/parse", post(routes::syllabus::parse))
        .route("/api/syllabus/match", post(routes::syllabus::find))
        .route("/api/syllabus/upload", post(routes::syllabus::upload))
        .route("/api/users/{user_id}/syllabi", get(routes::syllabus::for_user))
        .route("/api/content/check", post(routes::content::check))
        .route("/api/username/validate", post(routes::username::validate))
        .route(
            "/api/newsletter",
            get(routes::newsletter::count).post(routes::newsletter::subscribe),
        )
        .route("/api/search", post(routes::search::search))
        .route("/api/rooms/{room_id}/messages", get(routes::socket::history))
        .route("/api/socketio", get(routes::socket::upgrade))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.server.bind` and serve until the process is stopped.
pub async fn serve(config: AppConfig) -> Result<()> {
    let bind = config.server.bind.clone();
    let state = AppState::from_config(config)?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("CourseConnect listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
