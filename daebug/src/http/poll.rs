//! `GET /<poll_path>` — long-poll (`spec.md` §4.F).

use super::AppState;
use crate::{broker::PollOutcome, error::BrokerError};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PollParams {
    name: Option<String>,
    url: Option<String>,
}

pub async fn handle(State(state): State<AppState>, Query(params): Query<PollParams>) -> Response {
    let Some(name) = params.name.filter(|n| !n.trim().is_empty()) else {
        return BrokerError::BadRequest("missing name".to_string()).into_response();
    };

    match state.broker.poll(name, params.url).await {
        Ok(PollOutcome::Empty) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/javascript")],
            String::new(),
        )
            .into_response(),
        Ok(PollOutcome::Job { id, code }) => {
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/javascript")],
                code,
            )
                .into_response();
            if let Ok(value) = id.to_string().parse() {
                response.headers_mut().insert("x-job-id", value);
            }
            response
        }
        Err(e) => e.into_response(),
    }
}
