//! HTTP and SSE front end for Mexican Train matches.
//!
//! Each match lives in a session owned by [`SessionManager`]. Requests are applied one at
//! a time per session, AI seats are played on the tokio runtime, and every state change is
//! published on the [`EventBus`] for SSE subscribers.

pub mod errors;
pub mod events;
pub mod handlers;
pub mod history;
pub mod logging;
pub mod server;
pub mod session;
pub mod settings;

pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription, GameEvent};
pub use history::{HistoryError, HistoryStats, HistoryStore, PlayerStats};
pub use logging::{LogEntry, LogFormat, TestLogSubscriber, init_logging, init_test_logging};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use session::{
    GameSession, PlayerView, SessionError, SessionId, SessionManager, SessionStatus, SessionView,
};
pub use settings::{AppSettings, SettingsError, SettingsStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_provides_shared_components() {
        let ctx = AppContext::new_for_tests();

        let event_bus = ctx.event_bus();
        let sessions = ctx.sessions();

        assert_eq!(event_bus.subscriber_count(), 0);
        assert!(sessions.active_sessions().is_empty());
        assert_eq!(ctx.history().total_matches().expect("count"), 0);
    }
}
