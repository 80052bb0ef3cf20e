pub mod game;
pub mod health;
pub mod history;
pub mod settings;
pub mod sse;

pub use game::{
    CreateSessionRequest, ForcedTurnResponse, MovesQuery, PlayRequest, PlayerRequest,
    SessionResponse, StartQuery, StateQuery, TerminateRequest, create_session,
    disconnect_player, draw_tile, force_turn, get_session_state, join_session, pass_turn,
    play_tile, reconnect_player, start_match, terminate_session, valid_moves,
};
pub use health::health;
pub use history::{GetHistoryQuery, get_match_by_id, get_recent_matches, get_statistics};
pub use settings::{
    UpdateFieldRequest, UpdateSettingsRequest, get_settings, reset_settings, update_field,
    update_settings,
};
pub use sse::stream_events;
