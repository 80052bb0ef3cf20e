use crate::session::SessionId;
use mextrain_engine::logger::RoundRecord;
use mextrain_engine::round::{RoundEndReason, RoundSnapshot};
use mextrain_engine::tile::Tile;
use mextrain_engine::validator::ValidMove;
use mextrain_engine::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

// Bounded so a stalled client cannot grow memory without limit; a full channel drops
// the subscriber instead of blocking the session.
const EVENT_CHANNEL_BUFFER: usize = 1000;

pub type EventSender = mpsc::Sender<GameEvent>;
pub type EventReceiver = mpsc::Receiver<GameEvent>;

pub struct EventSubscription {
    bus: EventBus,
    session_id: SessionId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.session_id, self.subscriber_id);
    }
}

/// Fan-out of session events to every subscriber of that session.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

type SubscriberMap = HashMap<SessionId, Vec<(usize, EventSender)>>;

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<SubscriberMap>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: SessionId) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(session_id.clone());
        EventSubscription {
            bus: self.clone(),
            session_id,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, session_id: SessionId) -> (usize, EventReceiver) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        {
            // The map holds only senders; a panic elsewhere cannot leave it inconsistent.
            let mut guard = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            guard.entry(session_id.clone()).or_default().push((id, tx));
        }

        tracing::info!(
            session_id = %session_id,
            subscriber_id = id,
            "client subscribed to game events"
        );

        (id, rx)
    }

    pub fn broadcast(&self, session_id: &SessionId, event: GameEvent) {
        tracing::debug!(
            session_id = %session_id,
            event_type = event.kind(),
            "broadcasting game event"
        );

        let subscribers = {
            let guard = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            guard.get(session_id).cloned()
        };

        let Some(list) = subscribers else {
            tracing::trace!(session_id = %session_id, "no subscribers for session");
            return;
        };

        let mut failed = Vec::new();
        for (id, sender) in list {
            if let Err(e) = sender.try_send(event.clone()) {
                tracing::warn!(
                    session_id = %session_id,
                    subscriber_id = id,
                    error = %e,
                    "dropping subscriber that cannot take events"
                );
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(session_id, &failed);
        }
    }

    pub fn unsubscribe(&self, session_id: &SessionId, subscriber_id: usize) {
        self.remove_subscribers(session_id, &[subscriber_id]);
    }

    pub fn drop_session(&self, session_id: &SessionId) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(session_id);
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.values().map(|list| list.len()).sum()
    }

    fn remove_subscribers(&self, session_id: &SessionId, ids: &[usize]) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(session_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(session_id);
            }
        }
    }
}

/// Outbound messages of a session, serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    PlayerJoined {
        session_id: SessionId,
        player_id: PlayerId,
        is_ai: bool,
    },
    RoundStarted {
        session_id: SessionId,
        game_number: u32,
        engine_value: u8,
        players: Vec<PlayerId>,
    },
    /// Public view of the table; hands appear as counts only
    StateSnapshot {
        session_id: SessionId,
        game_number: u32,
        cumulative_scores: BTreeMap<PlayerId, u32>,
        round: Box<RoundSnapshot>,
    },
    MoveResult {
        session_id: SessionId,
        player_id: PlayerId,
        success: bool,
        #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
        played: Option<ValidMove>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ValidMoves {
        session_id: SessionId,
        player_id: PlayerId,
        moves: Vec<ValidMove>,
        must_draw: bool,
    },
    /// `tile` is absent when the boneyard was empty and the turn passed
    DrawResult {
        session_id: SessionId,
        player_id: PlayerId,
        tile: Option<Tile>,
        can_play_drawn: bool,
        turn_passed: bool,
    },
    TurnPassed {
        session_id: SessionId,
        player_id: PlayerId,
        automatic: bool,
    },
    RoundEnded {
        session_id: SessionId,
        game_number: u32,
        winner: Option<PlayerId>,
        reason: RoundEndReason,
        scores: BTreeMap<PlayerId, u32>,
    },
    MatchEnded {
        session_id: SessionId,
        winner: PlayerId,
        cumulative_scores: BTreeMap<PlayerId, u32>,
        history: Vec<RoundRecord>,
    },
    PlayerDisconnected {
        session_id: SessionId,
        player_id: PlayerId,
    },
    PlayerReconnected {
        session_id: SessionId,
        player_id: PlayerId,
    },
    SessionTerminated {
        session_id: SessionId,
        reason: String,
    },
    Error {
        session_id: SessionId,
        message: String,
    },
}

impl GameEvent {
    /// The serialized `type` tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::RoundStarted { .. } => "round_started",
            GameEvent::StateSnapshot { .. } => "state_snapshot",
            GameEvent::MoveResult { .. } => "move_result",
            GameEvent::ValidMoves { .. } => "valid_moves",
            GameEvent::DrawResult { .. } => "draw_result",
            GameEvent::TurnPassed { .. } => "turn_passed",
            GameEvent::RoundEnded { .. } => "round_ended",
            GameEvent::MatchEnded { .. } => "match_ended",
            GameEvent::PlayerDisconnected { .. } => "player_disconnected",
            GameEvent::PlayerReconnected { .. } => "player_reconnected",
            GameEvent::SessionTerminated { .. } => "session_terminated",
            GameEvent::Error { .. } => "error",
        }
    }
}
