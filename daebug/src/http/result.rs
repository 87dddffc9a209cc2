//! `POST /<poll_path>` — deliver result / control message (`spec.md` §4.F).

use super::AppState;
use crate::error::BrokerError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ResultParams {
    name: Option<String>,
}

pub async fn handle(
    State(state): State<AppState>,
    Query(params): Query<ResultParams>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let Some(name) = params.name.filter(|n| !n.trim().is_empty()) else {
        return BrokerError::BadRequest("missing name".to_string()).into_response();
    };

    // Every branch of `spec.md` §4.F's dispatch returns 200, including
    // "no job found" — the client has no recourse for a stale POST.
    state.broker.post_result(name, body).await;
    StatusCode::OK.into_response()
}
