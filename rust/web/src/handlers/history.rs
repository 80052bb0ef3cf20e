use crate::errors::IntoErrorResponse;
use crate::history::{HistoryError, HistoryStore};
use mextrain_engine::PlayerId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

/// `GET /api/history?limit=N&player=P`
#[derive(Debug, Default, Deserialize)]
pub struct GetHistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub player: Option<PlayerId>,
}

/// Completed matches, newest first; `player` keeps only matches that player sat in.
pub async fn get_recent_matches(history: Arc<HistoryStore>, query: GetHistoryQuery) -> Response {
    let matches = match query.player {
        Some(player) => history.by_player(&player).map(|mut found| {
            if let Some(limit) = query.limit {
                found.truncate(limit);
            }
            found
        }),
        None => history.recent(query.limit),
    };
    match matches {
        Ok(matches) => success_response(StatusCode::OK, matches),
        Err(err) => history_error(err),
    }
}

pub async fn get_match_by_id(history: Arc<HistoryStore>, match_id: String) -> Response {
    match history.get(&match_id) {
        Ok(record) => success_response(StatusCode::OK, record),
        Err(err) => history_error(err),
    }
}

pub async fn get_statistics(history: Arc<HistoryStore>) -> Response {
    match history.stats() {
        Ok(stats) => success_response(StatusCode::OK, stats),
        Err(err) => history_error(err),
    }
}

fn success_response<T>(status: StatusCode, body: T) -> Response
where
    T: Serialize,
{
    reply::with_status(reply::json(&body), status).into_response()
}

fn history_error(err: HistoryError) -> Response {
    err.into_http_response()
}
