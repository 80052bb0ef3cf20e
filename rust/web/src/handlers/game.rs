use crate::errors::ErrorResponse;
use crate::session::{SessionError, SessionId, SessionManager, SessionView};
use mextrain_engine::config::{DoubleRule, MatchConfig};
use mextrain_engine::tile::{Orientation, Tile};
use mextrain_engine::train::TrainRef;
use mextrain_engine::PlayerId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::{self, StatusCode};
use warp::reply::{self, Response};
use warp::Reply;

/// Body of `POST /api/sessions`. Every match setting is optional and falls back to the
/// server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub host: PlayerId,
    pub min_players: Option<usize>,
    pub max_players: Option<usize>,
    pub ai_enabled: Option<bool>,
    pub ai_skill_level: Option<u8>,
    pub ai_fill_to_max: Option<bool>,
    pub games_to_play: Option<u32>,
    pub starting_engine_value: Option<u8>,
    pub max_pip: Option<u8>,
    pub hand_size: Option<usize>,
    pub double_rule: Option<DoubleRule>,
    pub seed: Option<u64>,
}

impl CreateSessionRequest {
    fn into_config(self, default_skill_level: u8) -> (PlayerId, MatchConfig) {
        let mut config = MatchConfig {
            ai_skill_level: default_skill_level,
            ..MatchConfig::default()
        };
        if let Some(max_pip) = self.max_pip {
            config.max_pip = max_pip;
            config.starting_engine_value = max_pip;
            config.games_to_play = u32::from(max_pip) + 1;
        }
        if let Some(min_players) = self.min_players {
            config.min_players = min_players;
        }
        if let Some(max_players) = self.max_players {
            config.max_players = max_players;
        }
        if let Some(ai_enabled) = self.ai_enabled {
            config.ai_enabled = ai_enabled;
        }
        if let Some(level) = self.ai_skill_level {
            config.ai_skill_level = level;
        }
        if let Some(fill) = self.ai_fill_to_max {
            config.ai_fill_to_max = fill;
        }
        if let Some(games) = self.games_to_play {
            config.games_to_play = games;
        }
        if let Some(engine) = self.starting_engine_value {
            config.starting_engine_value = engine;
        }
        if self.hand_size.is_some() {
            config.hand_size = self.hand_size;
        }
        if let Some(rule) = self.double_rule {
            config.double_rule = rule;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        (self.host, config)
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub state: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub player_id: PlayerId,
    pub tile: Tile,
    pub train: TrainRef,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    pub player: Option<PlayerId>,
}

/// `left` and `right` together narrow the answer to one tile.
#[derive(Debug, Deserialize)]
pub struct MovesQuery {
    pub player: PlayerId,
    pub left: Option<u8>,
    pub right: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TerminateRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForcedTurnResponse {
    pub session_id: SessionId,
    pub player_id: PlayerId,
}

/// Creates a lobby with the requesting player seated as host.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/sessions`
///
/// # Request Format
/// ```json
/// {
///   "host": "alice",
///   "max_players": 4,          // Optional, 1-8
///   "ai_skill_level": 3,       // Optional, 1-5 (server default otherwise)
///   "games_to_play": 13,       // Optional, 1-100
///   "seed": 42                 // Optional: reproducible deals
/// }
/// ```
///
/// # Response Format
/// - **Success (201 Created)**: `{ "session_id": "...", "state": { ... } }`
/// - **Error (400 Bad Request)**: `invalid_config` or `invalid_player`
pub async fn create_session(
    sessions: Arc<SessionManager>,
    request: CreateSessionRequest,
) -> Response {
    let default_level = sessions
        .settings()
        .get()
        .map(|s| s.default_skill_level)
        .unwrap_or(MatchConfig::default().ai_skill_level);
    let (host, config) = request.into_config(default_level);

    let created = sessions
        .create_session(config, &host)
        .and_then(|session_id| {
            let state = sessions.state(&session_id, Some(&host))?;
            Ok(SessionResponse { session_id, state })
        });
    match created {
        Ok(body) => success_response(StatusCode::CREATED, body),
        Err(err) => session_error(err),
    }
}

/// Seats a player in the lobby, or reconnects them if they already hold a seat.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/sessions/{session_id}/join`
///
/// # Error Cases
/// - `lobby_full` (409): every seat is taken
/// - `already_started` (409): the match is under way
pub async fn join_session(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayerRequest,
) -> Response {
    match sessions.join(&session_id, &request.player_id) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

/// Starts the match, adding AI seats when the session allows them.
///
/// `?force=true` starts even below the minimum seat count.
pub async fn start_match(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    query: StartQuery,
) -> Response {
    match sessions.start(&session_id, query.force) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

/// Session view for `?player=`; without a player every hand appears as a count.
pub async fn get_session_state(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    query: StateQuery,
) -> Response {
    match sessions.state(&session_id, query.player.as_deref()) {
        Ok(view) => success_response(StatusCode::OK, view),
        Err(err) => session_error(err),
    }
}

pub async fn valid_moves(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    query: MovesQuery,
) -> Response {
    let tile = match (query.left, query.right) {
        (Some(left), Some(right)) => Some(Tile::new(left, right)),
        (None, None) => None,
        _ => {
            return ErrorResponse::new("invalid_query", "tile filter needs both left and right")
                .into_response(StatusCode::BAD_REQUEST)
        }
    };
    match sessions.valid_moves(&session_id, &query.player, tile) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

/// Plays a tile from the player's hand onto a train.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/sessions/{session_id}/play`
///
/// # Request Format
/// ```json
/// {
///   "player_id": "alice",
///   "tile": { "left": 12, "right": 7 },
///   "train": { "kind": "personal", "owner": "alice" },
///   "orientation": "natural"   // Optional
/// }
/// ```
///
/// # Response Format
/// - **Success (200 OK)**: `move_result` event with the resolved move
/// - **Error (409 Conflict)**: `not_your_turn`
/// - **Error (422 Unprocessable Entity)**: `illegal_move`, `invalid_tile`
pub async fn play_tile(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayRequest,
) -> Response {
    match sessions.play(
        &session_id,
        &request.player_id,
        request.tile,
        &request.train,
        request.orientation,
    ) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

/// Draws a tile. The drawn tile is only revealed in this response.
pub async fn draw_tile(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayerRequest,
) -> Response {
    match sessions.draw(&session_id, &request.player_id) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

pub async fn pass_turn(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayerRequest,
) -> Response {
    match sessions.pass(&session_id, &request.player_id) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

pub async fn disconnect_player(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayerRequest,
) -> Response {
    match sessions.disconnect(&session_id, &request.player_id) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

pub async fn reconnect_player(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: PlayerRequest,
) -> Response {
    match sessions.reconnect(&session_id, &request.player_id) {
        Ok(event) => success_response(StatusCode::OK, event),
        Err(err) => session_error(err),
    }
}

/// Stops a session for every player.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/admin/sessions/{session_id}/terminate?reason=...`
///
/// # Response Format
/// - **Success (204 No Content)**: Empty response body
/// - **Error (410 Gone)**: `session_terminated` when already stopped
pub async fn terminate_session(
    sessions: Arc<SessionManager>,
    session_id: SessionId,
    request: TerminateRequest,
) -> Response {
    let reason = request
        .reason
        .unwrap_or_else(|| "terminated by operator".to_string());
    match sessions.terminate(&session_id, &reason) {
        Ok(()) => empty_response(StatusCode::NO_CONTENT),
        Err(err) => session_error(err),
    }
}

/// Plays the current seat's turn as draw-then-pass.
pub async fn force_turn(sessions: Arc<SessionManager>, session_id: SessionId) -> Response {
    match sessions.force_next_turn(&session_id) {
        Ok(player_id) => success_response(
            StatusCode::OK,
            ForcedTurnResponse {
                session_id,
                player_id,
            },
        ),
        Err(err) => session_error(err),
    }
}

fn success_response<T>(status: StatusCode, body: T) -> Response
where
    T: Serialize,
{
    reply::with_status(reply::json(&body), status).into_response()
}

fn empty_response(status: StatusCode) -> Response {
    let mut response = http::Response::new(warp::hyper::Body::empty());
    *response.status_mut() = status;
    response
}

fn session_error(err: SessionError) -> Response {
    use crate::errors::IntoErrorResponse;
    err.into_http_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_overrides_only_given_fields() {
        let request: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "host": "alice",
            "max_players": 3,
            "seed": 9
        }))
        .expect("parse");
        let (host, config) = request.into_config(4);

        assert_eq!(host, "alice");
        assert_eq!(config.max_players, 3);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.ai_skill_level, 4);
        assert_eq!(config.games_to_play, MatchConfig::default().games_to_play);
    }

    #[test]
    fn smaller_sets_rescale_the_engine_sequence() {
        let request = CreateSessionRequest {
            host: "alice".into(),
            max_pip: Some(9),
            ..CreateSessionRequest::default()
        };
        let (_, config) = request.into_config(2);
        assert_eq!(config.starting_engine_value, 9);
        assert_eq!(config.games_to_play, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn play_request_accepts_train_refs() {
        let request: PlayRequest = serde_json::from_value(serde_json::json!({
            "player_id": "bob",
            "tile": { "left": 12, "right": 3 },
            "train": { "kind": "mexican" }
        }))
        .expect("parse");
        assert_eq!(request.train, TrainRef::Mexican);
        assert!(request.orientation.is_none());
    }
}
