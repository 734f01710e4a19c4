use crate::error::ApiResult;
use crate::routes::required;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::search_types::SearchHit;

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    results: Vec<SearchHit>,
}

/// Web search. Upstream failures and disabled search both give no results.
pub async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Json(request) = payload?;
    let query = required(&request.query, "query")?;

    let Some(client) = &state.search else {
        return Ok(Json(SearchResponse { results: Vec::new() }));
    };
    let results = match client.search(query, state.config.search.max_results).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("web search failed: {}", e);
            Vec::new()
        }
    };
    Ok(Json(SearchResponse { results }))
}
