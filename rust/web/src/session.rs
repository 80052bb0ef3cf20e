use crate::events::{EventBus, GameEvent};
use crate::history::HistoryStore;
use crate::settings::{AppSettings, SettingsStore};
use mextrain_ai::{self as ai, AIPolicy, AiAction};
use mextrain_engine::config::MatchConfig;
use mextrain_engine::errors::GameError;
use mextrain_engine::game::{MatchOrchestrator, MatchProgress, MatchResult};
use mextrain_engine::round::{RoundEngine, RoundPhase, RoundSnapshot};
use mextrain_engine::tile::{Orientation, Tile};
use mextrain_engine::train::TrainRef;
use mextrain_engine::validator;
use mextrain_engine::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

pub type SessionId = String;

/// Seat names handed to computer players, in order.
const AI_ROSTER: [&str; 8] = [
    "Caboose",
    "Switchman",
    "Signalman",
    "Trainmaster",
    "Locomotive",
    "Freight",
    "Conductor",
    "Brakeman",
];

/// Identifies one turn of one round. Scheduled work only applies while it still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TurnToken {
    game_number: u32,
    turn: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Lobby,
    InProgress,
    Finished,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub is_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<u8>,
    pub connected: bool,
}

/// Everything a client needs to render a session for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub host: PlayerId,
    pub status: SessionStatus,
    pub config: MatchConfig,
    pub players: Vec<PlayerView>,
    pub game_number: u32,
    pub games_to_play: u32,
    pub cumulative_scores: BTreeMap<PlayerId, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_reason: Option<String>,
}

struct Seat {
    id: PlayerId,
    policy: Option<Arc<dyn AIPolicy>>,
    disconnected_at: Option<Instant>,
}

impl Seat {
    fn human(id: PlayerId) -> Self {
        Self {
            id,
            policy: None,
            disconnected_at: None,
        }
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            player_id: self.id.clone(),
            is_ai: self.policy.is_some(),
            skill_level: self.policy.as_ref().map(|p| p.skill_level()),
            connected: self.disconnected_at.is_none(),
        }
    }
}

/// What should happen on the current turn without waiting for a request.
enum Automation {
    Ai {
        player: PlayerId,
        policy: Arc<dyn AIPolicy>,
        token: TurnToken,
    },
    AutoPass {
        player: PlayerId,
    },
    WaitGrace {
        token: TurnToken,
        remaining: Duration,
    },
}

/// Shared collaborators every session needs while driving turns.
#[derive(Debug, Clone)]
struct Services {
    events: Arc<EventBus>,
    history: Option<Arc<HistoryStore>>,
    settings: Arc<SettingsStore>,
}

impl Services {
    fn settings(&self) -> AppSettings {
        self.settings.get().unwrap_or_default()
    }
}

/// Mutable part of a session. Every read and write goes through the session mutex, so
/// moves arriving concurrently are applied one at a time and readers never see half a move.
struct SessionState {
    seats: Vec<Seat>,
    game: Option<MatchOrchestrator>,
    terminated: Option<String>,
    turn_started: Instant,
    scheduled: Option<TurnToken>,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        if self.terminated.is_some() {
            return SessionStatus::Terminated;
        }
        match &self.game {
            None => SessionStatus::Lobby,
            Some(game) if game.is_over() => SessionStatus::Finished,
            Some(_) => SessionStatus::InProgress,
        }
    }

    fn seat(&self, player: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == player)
    }

    fn seat_mut(&mut self, player: &str) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.id == player)
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match &self.terminated {
            Some(reason) => Err(SessionError::Terminated(reason.clone())),
            None => Ok(()),
        }
    }

    /// Checks that `player` holds a human seat, reconnecting them if they had dropped.
    fn ensure_human(
        &mut self,
        session_id: &SessionId,
        player: &str,
        events: &EventBus,
    ) -> Result<(), SessionError> {
        self.ensure_live()?;
        let seat = self
            .seat_mut(player)
            .ok_or_else(|| GameError::PlayerNotInSession(player.to_string()))?;
        if seat.policy.is_some() {
            return Err(SessionError::SeatAutomated(player.to_string()));
        }
        if seat.disconnected_at.take().is_some() {
            tracing::info!(session_id = %session_id, player_id = %player, "player reconnected by acting");
            events.broadcast(
                session_id,
                GameEvent::PlayerReconnected {
                    session_id: session_id.clone(),
                    player_id: player.to_string(),
                },
            );
        }
        Ok(())
    }

    fn game(&self) -> Result<&MatchOrchestrator, GameError> {
        self.game.as_ref().ok_or(GameError::RoundNotStarted)
    }

    fn round_mut(&mut self) -> Result<&mut RoundEngine, GameError> {
        self.game
            .as_mut()
            .ok_or(GameError::RoundNotStarted)?
            .round_mut()
    }

    fn live_round(&self) -> Option<&RoundEngine> {
        let game = self.game.as_ref()?;
        if game.is_over() {
            return None;
        }
        game.round().ok().filter(|r| !r.is_over())
    }

    fn token(&self) -> Option<TurnToken> {
        let game = self.game.as_ref()?;
        let round = self.live_round()?;
        Some(TurnToken {
            game_number: game.current_game_number(),
            turn: round.turn_number(),
        })
    }

    fn play_tile(
        &mut self,
        session_id: &SessionId,
        player: &str,
        tile: Tile,
        train: &TrainRef,
        orientation: Option<Orientation>,
        events: &EventBus,
    ) -> Result<GameEvent, GameError> {
        let attempt = self.round_mut().and_then(|round| {
            let resolved = validator::find_move(round, player, tile, train, orientation).ok();
            round.play(player, tile, train, orientation)?;
            Ok(resolved)
        });
        match attempt {
            Ok(played) => {
                tracing::debug!(
                    session_id = %session_id,
                    player_id = %player,
                    tile = %tile,
                    train = %train,
                    "tile played"
                );
                let event = GameEvent::MoveResult {
                    session_id: session_id.clone(),
                    player_id: player.to_string(),
                    success: true,
                    played,
                    error: None,
                };
                events.broadcast(session_id, event.clone());
                Ok(event)
            }
            Err(err) => {
                tracing::debug!(
                    session_id = %session_id,
                    player_id = %player,
                    error = %err,
                    "move rejected"
                );
                events.broadcast(
                    session_id,
                    GameEvent::MoveResult {
                        session_id: session_id.clone(),
                        player_id: player.to_string(),
                        success: false,
                        played: None,
                        error: Some(err.code().to_string()),
                    },
                );
                Err(err)
            }
        }
    }

    /// Draws for `player`. The returned event carries the tile; subscribers only learn
    /// that a draw happened.
    fn draw_tile(
        &mut self,
        session_id: &SessionId,
        player: &str,
        events: &EventBus,
    ) -> Result<GameEvent, GameError> {
        let result = self.round_mut()?.draw(player);
        let (tile, can_play_drawn, turn_passed) = match &result {
            Ok(outcome) => (Some(outcome.tile), outcome.can_play_drawn, outcome.turn_passed),
            Err(GameError::EmptyBoneyard) => (None, false, true),
            Err(err) => return Err(err.clone()),
        };
        tracing::debug!(
            session_id = %session_id,
            player_id = %player,
            can_play_drawn,
            turn_passed,
            "tile drawn"
        );
        events.broadcast(
            session_id,
            GameEvent::DrawResult {
                session_id: session_id.clone(),
                player_id: player.to_string(),
                tile: None,
                can_play_drawn,
                turn_passed,
            },
        );
        result?;
        Ok(GameEvent::DrawResult {
            session_id: session_id.clone(),
            player_id: player.to_string(),
            tile,
            can_play_drawn,
            turn_passed,
        })
    }

    fn pass_turn(
        &mut self,
        session_id: &SessionId,
        player: &str,
        events: &EventBus,
    ) -> Result<GameEvent, GameError> {
        self.round_mut()?.pass(player)?;
        let event = GameEvent::TurnPassed {
            session_id: session_id.clone(),
            player_id: player.to_string(),
            automatic: false,
        };
        events.broadcast(session_id, event.clone());
        Ok(event)
    }

    /// Draws once if possible and passes on behalf of the current seat.
    fn auto_turn(
        &mut self,
        session_id: &SessionId,
        reason: &str,
        events: &EventBus,
    ) -> Result<PlayerId, GameError> {
        let round = self.round_mut()?;
        let player = round.current_player().clone();
        round.auto_turn(&player)?;
        tracing::warn!(
            session_id = %session_id,
            player_id = %player,
            reason,
            "turn played automatically"
        );
        events.broadcast(
            session_id,
            GameEvent::TurnPassed {
                session_id: session_id.clone(),
                player_id: player.clone(),
                automatic: true,
            },
        );
        Ok(player)
    }

    /// [`Self::auto_turn`] for recovery paths that have no caller to report to.
    fn auto_turn_logged(&mut self, session_id: &SessionId, reason: &str, events: &EventBus) {
        if let Err(err) = self.auto_turn(session_id, reason, events) {
            tracing::warn!(
                session_id = %session_id,
                reason,
                error = %err,
                "automatic turn failed"
            );
        }
    }

    fn apply_ai(
        &mut self,
        session_id: &SessionId,
        player: &str,
        action: &AiAction,
        events: &EventBus,
    ) -> Result<(), GameError> {
        let applied = match action {
            AiAction::Play(mv) => self
                .play_tile(session_id, player, mv.tile, &mv.train, Some(mv.orientation), events)
                .map(|_| ()),
            AiAction::Draw => self.draw_tile(session_id, player, events).map(|_| ()),
            AiAction::Pass => self.pass_turn(session_id, player, events).map(|_| ()),
        };
        match applied {
            Err(GameError::EmptyBoneyard) => Ok(()),
            other => other,
        }
    }

    /// Runs a whole AI turn on the calling thread.
    fn play_ai_inline(
        &mut self,
        session_id: &SessionId,
        player: &str,
        policy: &dyn AIPolicy,
        events: &EventBus,
    ) {
        let token = self.token();
        for _ in 0..2 {
            if self.token() != token {
                return;
            }
            let Some(round) = self.live_round() else {
                return;
            };
            let action = ai::decide(policy, round, player);
            if let Err(err) = self.apply_ai(session_id, player, &action, events) {
                tracing::warn!(
                    session_id = %session_id,
                    player_id = %player,
                    error = %err,
                    "AI action rejected"
                );
                break;
            }
        }
        if token.is_some() && self.token() == token {
            self.auto_turn_logged(session_id, "AI turn did not finish", events);
        }
    }

    /// Folds finished rounds into the match, chaining to the next round or the match end,
    /// then publishes the table.
    fn settle(&mut self, session_id: &SessionId, services: &Services) {
        let events = &services.events;
        loop {
            let Some(game) = self.game.as_mut() else {
                return;
            };
            if game.is_over() {
                return;
            }
            let Some(outcome) = game.round().ok().and_then(|r| r.outcome()).cloned() else {
                break;
            };
            let game_number = game.current_game_number();
            tracing::info!(
                session_id = %session_id,
                game_number,
                winner = ?outcome.winner,
                reason = ?outcome.reason,
                "round ended"
            );
            events.broadcast(
                session_id,
                GameEvent::RoundEnded {
                    session_id: session_id.clone(),
                    game_number,
                    winner: outcome.winner,
                    reason: outcome.reason,
                    scores: outcome.scores,
                },
            );

            match game.advance() {
                Ok(MatchProgress::NextRound {
                    game_number,
                    engine_value,
                }) => {
                    tracing::info!(session_id = %session_id, game_number, engine_value, "round started");
                    events.broadcast(
                        session_id,
                        GameEvent::RoundStarted {
                            session_id: session_id.clone(),
                            game_number,
                            engine_value,
                            players: game.players().to_vec(),
                        },
                    );
                }
                Ok(MatchProgress::Ended(result)) => {
                    tracing::info!(
                        session_id = %session_id,
                        winner = %result.winner,
                        rounds = result.rounds_played,
                        "match ended"
                    );
                    events.broadcast(
                        session_id,
                        GameEvent::MatchEnded {
                            session_id: session_id.clone(),
                            winner: result.winner.clone(),
                            cumulative_scores: result.cumulative_scores.clone(),
                            history: game.rounds().to_vec(),
                        },
                    );
                    if let (Some(history), Some(record)) =
                        (&services.history, game.to_record(session_id.clone()))
                    {
                        if let Err(err) = history.add_match(record) {
                            tracing::error!(session_id = %session_id, error = %err, "failed to record match");
                        }
                    }
                    return;
                }
                Err(err) => {
                    tracing::error!(session_id = %session_id, error = %err, "failed to advance match");
                    events.broadcast(
                        session_id,
                        GameEvent::Error {
                            session_id: session_id.clone(),
                            message: err.to_string(),
                        },
                    );
                    return;
                }
            }
        }

        self.turn_started = Instant::now();
        if let Some(event) = self.snapshot_event(session_id) {
            events.broadcast(session_id, event);
        }
    }

    fn snapshot_event(&self, session_id: &SessionId) -> Option<GameEvent> {
        let game = self.game.as_ref()?;
        let round = game.round().ok()?;
        Some(GameEvent::StateSnapshot {
            session_id: session_id.clone(),
            game_number: game.current_game_number(),
            cumulative_scores: game.cumulative_scores().clone(),
            round: Box::new(round.snapshot(None)),
        })
    }

    fn next_automation(&self, grace: Duration, now: Instant) -> Option<Automation> {
        if self.terminated.is_some() {
            return None;
        }
        let token = self.token()?;
        let player = self.live_round()?.current_player().clone();
        let seat = self.seat(&player)?;
        if let Some(policy) = &seat.policy {
            return Some(Automation::Ai {
                player,
                policy: Arc::clone(policy),
                token,
            });
        }
        let elapsed = now.saturating_duration_since(seat.disconnected_at?);
        if elapsed >= grace {
            Some(Automation::AutoPass { player })
        } else {
            Some(Automation::WaitGrace {
                token,
                remaining: grace - elapsed,
            })
        }
    }

    fn view(&self, session: &GameSession, viewer: Option<&str>) -> SessionView {
        let game = self.game.as_ref();
        SessionView {
            session_id: session.id.clone(),
            host: session.host.clone(),
            status: self.status(),
            config: session.config.clone(),
            players: self.seats.iter().map(Seat::view).collect(),
            game_number: game.map(|g| g.current_game_number()).unwrap_or(0),
            games_to_play: session.config.games_to_play,
            cumulative_scores: game
                .map(|g| g.cumulative_scores().clone())
                .unwrap_or_default(),
            round: game
                .and_then(|g| g.round().ok())
                .map(|r| r.snapshot(viewer)),
            result: game.and_then(|g| g.result().cloned()),
            terminated_reason: self.terminated.clone(),
        }
    }
}

/// One match and its lobby.
pub struct GameSession {
    id: SessionId,
    host: PlayerId,
    config: MatchConfig,
    state: Mutex<SessionState>,
    last_active: Mutex<Instant>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    fn new(id: SessionId, host: PlayerId, config: MatchConfig) -> Self {
        Self {
            id,
            config,
            state: Mutex::new(SessionState {
                seats: vec![Seat::human(host.clone())],
                game: None,
                terminated: None,
                turn_started: Instant::now(),
                scheduled: None,
            }),
            host,
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn host(&self) -> &PlayerId {
        &self.host
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.state.lock().map_err(|_| SessionError::StoragePoisoned)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.last_active
            .lock()
            .map(|last| now.saturating_duration_since(*last) > ttl)
            .unwrap_or(false)
    }

    /// Publishes the settled table and keeps automated seats moving until a human has to act.
    ///
    /// Inside a tokio runtime AI turns and grace-period timers run as tasks; without one
    /// they run inline on the caller's thread.
    fn drive(self: &Arc<Self>, state: &mut SessionState, services: &Services) {
        let settings = services.settings();
        let runtime = tokio::runtime::Handle::try_current().ok();
        loop {
            state.settle(&self.id, services);
            let Some(next) = state.next_automation(settings.disconnect_grace(), Instant::now())
            else {
                return;
            };
            match next {
                Automation::AutoPass { .. } => {
                    if let Err(err) = state.auto_turn(&self.id, "player disconnected", &services.events)
                    {
                        tracing::error!(session_id = %self.id, error = %err, "auto turn failed");
                        return;
                    }
                }
                Automation::Ai { player, policy, token } => match &runtime {
                    Some(handle) => {
                        if state.scheduled != Some(token) {
                            state.scheduled = Some(token);
                            handle.spawn(run_ai_turn(
                                Arc::clone(self),
                                services.clone(),
                                token,
                                player,
                                policy,
                            ));
                        }
                        return;
                    }
                    None => {
                        state.play_ai_inline(&self.id, &player, policy.as_ref(), &services.events);
                        if state.token() == Some(token) {
                            tracing::error!(session_id = %self.id, player_id = %player, "AI turn made no progress");
                            return;
                        }
                    }
                },
                Automation::WaitGrace { token, remaining } => {
                    if let Some(handle) = &runtime {
                        if state.scheduled != Some(token) {
                            state.scheduled = Some(token);
                            handle.spawn(wake_after_grace(
                                Arc::clone(self),
                                services.clone(),
                                token,
                                remaining,
                            ));
                        }
                    }
                    return;
                }
            }
        }
    }
}

/// Claims a scheduled turn. `None` when the turn has moved on since scheduling.
fn claim_turn<'a>(
    session: &'a GameSession,
    token: TurnToken,
) -> Option<MutexGuard<'a, SessionState>> {
    let state = session.lock().ok()?;
    if state.terminated.is_some() || state.token() != Some(token) {
        return None;
    }
    Some(state)
}

fn snapshot_round(session: &GameSession, token: TurnToken) -> Option<RoundEngine> {
    let state = claim_turn(session, token)?;
    state.live_round().cloned()
}

/// Applies a decision made off the lock. Returns whether the AI may act again this turn.
fn finish_ai_step(
    session: &GameSession,
    services: &Services,
    token: TurnToken,
    player: &str,
    decision: Result<AiAction, &str>,
) -> bool {
    let Some(mut state) = claim_turn(session, token) else {
        return false;
    };
    let events = &services.events;
    match decision {
        Ok(action) => match state.apply_ai(&session.id, player, &action, events) {
            Ok(()) => state.token() == Some(token),
            Err(err) => {
                tracing::warn!(
                    session_id = %session.id,
                    player_id = %player,
                    error = %err,
                    "AI action rejected"
                );
                state.auto_turn_logged(&session.id, "AI action rejected", events);
                false
            }
        },
        Err(reason) => {
            tracing::warn!(
                session_id = %session.id,
                player_id = %player,
                reason,
                "AI stalled, auto-playing its turn"
            );
            state.auto_turn_logged(&session.id, reason, events);
            false
        }
    }
}

fn resume(session: &Arc<GameSession>, services: &Services, token: TurnToken) {
    let Ok(mut state) = session.lock() else {
        return;
    };
    if state.scheduled == Some(token) {
        state.scheduled = None;
    }
    session.drive(&mut state, services);
}

async fn run_ai_turn(
    session: Arc<GameSession>,
    services: Services,
    token: TurnToken,
    player: PlayerId,
    policy: Arc<dyn AIPolicy>,
) {
    let settings = services.settings();
    tokio::time::sleep(settings.think_delay()).await;

    // At most a draw followed by a play or pass.
    for _ in 0..2 {
        let Some(round) = snapshot_round(&session, token) else {
            break;
        };
        let policy = Arc::clone(&policy);
        let seat = player.clone();
        let decision = tokio::time::timeout(
            settings.decision_timeout(),
            tokio::task::spawn_blocking(move || ai::decide(policy.as_ref(), &round, &seat)),
        )
        .await;
        let decision = match decision {
            Ok(Ok(action)) => Ok(action),
            Ok(Err(_)) => Err("AI decision task failed"),
            Err(_) => Err("AI decision timed out"),
        };
        if !finish_ai_step(&session, &services, token, &player, decision) {
            break;
        }
    }

    if let Some(mut state) = claim_turn(&session, token) {
        state.auto_turn_logged(&session.id, "AI turn did not finish", &services.events);
    }
    resume(&session, &services, token);
}

async fn wake_after_grace(
    session: Arc<GameSession>,
    services: Services,
    token: TurnToken,
    remaining: Duration,
) {
    tokio::time::sleep(remaining).await;
    resume(&session, &services, token);
}

/// Owns every live session.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<GameSession>>>,
    services: Services,
}

impl SessionManager {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_settings(event_bus, None, Arc::new(SettingsStore::new()))
    }

    pub fn with_history(event_bus: Arc<EventBus>, history: Arc<HistoryStore>) -> Self {
        Self::with_settings(event_bus, Some(history), Arc::new(SettingsStore::new()))
    }

    pub fn with_settings(
        event_bus: Arc<EventBus>,
        history: Option<Arc<HistoryStore>>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            services: Services {
                events: event_bus,
                history,
                settings,
            },
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.services.events)
    }

    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.services.settings)
    }

    /// Opens a lobby with `host` seated.
    pub fn create_session(
        &self,
        config: MatchConfig,
        host: &str,
    ) -> Result<SessionId, SessionError> {
        config.validate()?;
        let host = valid_player_id(host)?;
        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(GameSession::new(session_id.clone(), host.clone(), config));

        {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| SessionError::StoragePoisoned)?;
            sessions.insert(session_id.clone(), Arc::clone(&session));
        }

        tracing::info!(
            session_id = %session_id,
            host = %host,
            max_players = session.config.max_players,
            games_to_play = session.config.games_to_play,
            "session created"
        );
        self.services.events.broadcast(
            &session_id,
            GameEvent::PlayerJoined {
                session_id: session_id.clone(),
                player_id: host,
                is_ai: false,
            },
        );
        Ok(session_id)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<Arc<GameSession>, SessionError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SessionError::StoragePoisoned)?;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))
    }

    /// Looks a session up for a request, rejecting it once idle past the TTL.
    fn active(&self, session_id: &SessionId) -> Result<Arc<GameSession>, SessionError> {
        self.active_at(session_id, Instant::now())
    }

    fn active_at(
        &self,
        session_id: &SessionId,
        now: Instant,
    ) -> Result<Arc<GameSession>, SessionError> {
        let session = self.get_session(session_id)?;
        if session.is_expired(self.services.settings().session_ttl(), now) {
            return Err(SessionError::Expired(session_id.clone()));
        }
        session.touch();
        Ok(session)
    }

    /// Seats `player` in the lobby. A player who already holds a seat is reconnected.
    pub fn join(&self, session_id: &SessionId, player: &str) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let player = valid_player_id(player)?;
        let mut state = session.lock()?;
        state.ensure_live()?;

        if let Some(seat) = state.seat(&player) {
            if seat.policy.is_some() {
                return Err(SessionError::SeatAutomated(player));
            }
            drop(state);
            return self.reconnect(session_id, &player);
        }
        if state.game.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        if state.seats.len() >= session.config.max_players {
            return Err(SessionError::LobbyFull(session.config.max_players));
        }
        state.seats.push(Seat::human(player.clone()));

        tracing::info!(
            session_id = %session_id,
            player_id = %player,
            seats = state.seats.len(),
            "player joined"
        );
        let event = GameEvent::PlayerJoined {
            session_id: session_id.clone(),
            player_id: player,
            is_ai: false,
        };
        self.services.events.broadcast(session_id, event.clone());
        Ok(event)
    }

    /// Starts the match, filling empty seats with computer players when enabled.
    ///
    /// Without `force` the table needs `min_players` seats after filling.
    pub fn start(&self, session_id: &SessionId, force: bool) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let mut state = session.lock()?;
        state.ensure_live()?;
        if state.game.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let config = &session.config;
        let mut added = Vec::new();
        if config.ai_enabled {
            let target = if config.ai_fill_to_max {
                config.max_players
            } else {
                config.min_players
            };
            let mut roster = AI_ROSTER.iter();
            while state.seats.len() < target {
                let Some(name) = roster.find(|n| state.seat(n).is_none()) else {
                    break;
                };
                let seed = config
                    .seed
                    .map(|s| s.wrapping_add(state.seats.len() as u64));
                let policy: Arc<dyn AIPolicy> = Arc::from(ai::create_ai(config.ai_skill_level, seed));
                state.seats.push(Seat {
                    id: name.to_string(),
                    policy: Some(policy),
                    disconnected_at: None,
                });
                added.push(name.to_string());
            }
        }

        if state.seats.len() < config.min_players && !force {
            let have = state.seats.len() - added.len();
            state.seats.truncate(have);
            return Err(SessionError::NotEnoughPlayers {
                needed: config.min_players,
                have,
            });
        }

        let players: Vec<PlayerId> = state.seats.iter().map(|s| s.id.clone()).collect();
        let mut game = match MatchOrchestrator::new(players.clone(), config.clone()) {
            Ok(game) => game,
            Err(err) => {
                let keep = state.seats.len() - added.len();
                state.seats.truncate(keep);
                return Err(err.into());
            }
        };
        let engine_value = match game.start() {
            Ok(round) => round.engine_value(),
            Err(err) => {
                let keep = state.seats.len() - added.len();
                state.seats.truncate(keep);
                return Err(err.into());
            }
        };
        state.game = Some(game);

        tracing::info!(
            session_id = %session_id,
            players = ?players,
            ai_seats = added.len(),
            engine_value,
            forced = force,
            "match started"
        );
        let events = &self.services.events;
        for name in added {
            events.broadcast(
                session_id,
                GameEvent::PlayerJoined {
                    session_id: session_id.clone(),
                    player_id: name,
                    is_ai: true,
                },
            );
        }
        let started = GameEvent::RoundStarted {
            session_id: session_id.clone(),
            game_number: 1,
            engine_value,
            players,
        };
        events.broadcast(session_id, started.clone());
        session.drive(&mut state, &self.services);
        Ok(started)
    }

    pub fn play(
        &self,
        session_id: &SessionId,
        player: &str,
        tile: Tile,
        train: &TrainRef,
        orientation: Option<Orientation>,
    ) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let mut state = session.lock()?;
        state.ensure_human(session_id, player, &self.services.events)?;
        let event = state.play_tile(
            session_id,
            player,
            tile,
            train,
            orientation,
            &self.services.events,
        )?;
        session.drive(&mut state, &self.services);
        Ok(event)
    }

    /// Draws for a human player. On an empty boneyard the turn still passes and the
    /// caller gets `EmptyBoneyard`.
    pub fn draw(&self, session_id: &SessionId, player: &str) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let mut state = session.lock()?;
        state.ensure_human(session_id, player, &self.services.events)?;
        let result = state.draw_tile(session_id, player, &self.services.events);
        if matches!(result, Ok(_) | Err(GameError::EmptyBoneyard)) {
            session.drive(&mut state, &self.services);
        }
        Ok(result?)
    }

    pub fn pass(&self, session_id: &SessionId, player: &str) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let mut state = session.lock()?;
        state.ensure_human(session_id, player, &self.services.events)?;
        let event = state.pass_turn(session_id, player, &self.services.events)?;
        session.drive(&mut state, &self.services);
        Ok(event)
    }

    /// Legal placements for `player`, optionally for one tile only. Answers any seated
    /// player; `must_draw` is only set for the player whose turn it is.
    pub fn valid_moves(
        &self,
        session_id: &SessionId,
        player: &str,
        tile: Option<Tile>,
    ) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let state = session.lock()?;
        if state.seat(player).is_none() {
            return Err(GameError::PlayerNotInSession(player.to_string()).into());
        }
        let round = state.game()?.round()?;
        let moves = match tile {
            Some(tile) => validator::valid_moves_for_tile(round, player, tile),
            None => validator::valid_moves(round, player),
        };
        let must_draw = !round.is_over()
            && round.current_player() == player
            && round.phase() == RoundPhase::AwaitingMove
            && !validator::has_valid_move(round, player);
        Ok(GameEvent::ValidMoves {
            session_id: session_id.clone(),
            player_id: player.to_string(),
            moves,
            must_draw,
        })
    }

    /// Session view for `viewer`; only the viewer's own hand is shown tile by tile.
    pub fn state(
        &self,
        session_id: &SessionId,
        viewer: Option<&str>,
    ) -> Result<SessionView, SessionError> {
        let session = self.active(session_id)?;
        let state = session.lock()?;
        Ok(state.view(&session, viewer))
    }

    pub fn disconnect(
        &self,
        session_id: &SessionId,
        player: &str,
    ) -> Result<GameEvent, SessionError> {
        let session = self.get_session(session_id)?;
        let mut state = session.lock()?;
        state.ensure_live()?;
        let seat = state
            .seat_mut(player)
            .ok_or_else(|| GameError::PlayerNotInSession(player.to_string()))?;
        if seat.policy.is_some() {
            return Err(SessionError::SeatAutomated(player.to_string()));
        }
        if seat.disconnected_at.is_none() {
            seat.disconnected_at = Some(Instant::now());
        }

        tracing::info!(session_id = %session_id, player_id = %player, "player disconnected");
        let event = GameEvent::PlayerDisconnected {
            session_id: session_id.clone(),
            player_id: player.to_string(),
        };
        self.services.events.broadcast(session_id, event.clone());
        session.drive(&mut state, &self.services);
        Ok(event)
    }

    pub fn reconnect(
        &self,
        session_id: &SessionId,
        player: &str,
    ) -> Result<GameEvent, SessionError> {
        let session = self.active(session_id)?;
        let mut state = session.lock()?;
        state.ensure_live()?;
        let seat = state
            .seat_mut(player)
            .ok_or_else(|| GameError::PlayerNotInSession(player.to_string()))?;
        if seat.policy.is_some() {
            return Err(SessionError::SeatAutomated(player.to_string()));
        }
        seat.disconnected_at = None;

        tracing::info!(session_id = %session_id, player_id = %player, "player reconnected");
        let event = GameEvent::PlayerReconnected {
            session_id: session_id.clone(),
            player_id: player.to_string(),
        };
        self.services.events.broadcast(session_id, event.clone());
        Ok(event)
    }

    /// Administrative stop. The session stays readable until it expires.
    pub fn terminate(&self, session_id: &SessionId, reason: &str) -> Result<(), SessionError> {
        let session = self.get_session(session_id)?;
        let mut state = session.lock()?;
        state.ensure_live()?;
        state.terminated = Some(reason.to_string());

        tracing::warn!(session_id = %session_id, reason, "session terminated by operator");
        self.services.events.broadcast(
            session_id,
            GameEvent::SessionTerminated {
                session_id: session_id.clone(),
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    /// Administrative escape hatch: plays the current seat's turn as draw-then-pass.
    /// Returns the seat that was moved on.
    pub fn force_next_turn(&self, session_id: &SessionId) -> Result<PlayerId, SessionError> {
        let session = self.get_session(session_id)?;
        let mut state = session.lock()?;
        state.ensure_live()?;
        let player = state.auto_turn(session_id, "forced by operator", &self.services.events)?;
        session.drive(&mut state, &self.services);
        Ok(player)
    }

    /// Auto-plays AI turns that have waited longer than `max_turn_age` and turns of
    /// players disconnected past the grace period. Returns how many turns were moved on.
    pub fn recover_stalled_turns(&self, max_turn_age: Duration) -> usize {
        let grace = self.services.settings().disconnect_grace();
        let mut recovered = 0;
        for session in self.all_sessions() {
            let Ok(mut state) = session.lock() else {
                continue;
            };
            let now = Instant::now();
            let reason = match state.next_automation(grace, now) {
                Some(Automation::Ai { .. })
                    if now.saturating_duration_since(state.turn_started) >= max_turn_age =>
                {
                    "AI turn stalled"
                }
                Some(Automation::AutoPass { .. }) => "player disconnected",
                _ => continue,
            };
            if state.auto_turn(&session.id, reason, &self.services.events).is_ok() {
                recovered += 1;
                session.drive(&mut state, &self.services);
            }
        }
        recovered
    }

    /// Drops sessions idle past the TTL. Returns how many were removed.
    pub fn cleanup_expired_sessions(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    fn cleanup_expired_at(&self, now: Instant) -> usize {
        let ttl = self.services.settings().session_ttl();
        let expired: Vec<SessionId> = match self.sessions.write() {
            Ok(mut sessions) => {
                let ids: Vec<SessionId> = sessions
                    .iter()
                    .filter(|(_, s)| s.is_expired(ttl, now))
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &ids {
                    sessions.remove(id);
                }
                ids
            }
            Err(_) => return 0,
        };

        for session_id in &expired {
            tracing::info!(session_id = %session_id, "session expired");
            self.services.events.broadcast(
                session_id,
                GameEvent::SessionTerminated {
                    session_id: session_id.clone(),
                    reason: "expired".to_string(),
                },
            );
            self.services.events.drop_session(session_id);
        }
        expired.len()
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        match self.sessions.read() {
            Ok(sessions) => sessions.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn all_sessions(&self) -> Vec<Arc<GameSession>> {
        match self.sessions.read() {
            Ok(sessions) => sessions.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    #[cfg(test)]
    fn set_policy(
        &self,
        session_id: &SessionId,
        player: &str,
        policy: Arc<dyn AIPolicy>,
    ) -> Result<(), SessionError> {
        let session = self.get_session(session_id)?;
        let mut state = session.lock()?;
        let seat = state
            .seat_mut(player)
            .ok_or_else(|| GameError::PlayerNotInSession(player.to_string()))?;
        seat.policy = Some(policy);
        Ok(())
    }

    #[cfg(test)]
    fn force_last_active(&self, session_id: &SessionId, when: Instant) {
        if let Ok(session) = self.get_session(session_id) {
            if let Ok(mut last) = session.last_active.lock() {
                *last = when;
            }
        }
    }
}

fn valid_player_id(player: &str) -> Result<PlayerId, SessionError> {
    let trimmed = player.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(SessionError::InvalidPlayer(player.to_string()));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session expired: {0}")]
    Expired(SessionId),
    #[error("Session terminated: {0}")]
    Terminated(String),
    #[error("Lobby is full ({0} seats)")]
    LobbyFull(usize),
    #[error("Not enough players: need {needed}, have {have}")]
    NotEnoughPlayers { needed: usize, have: usize },
    #[error("Match has already started")]
    AlreadyStarted,
    #[error("Seat {0} is played by the computer")]
    SeatAutomated(PlayerId),
    #[error("Invalid player id: {0:?}")]
    InvalidPlayer(String),
    #[error("Session storage poisoned")]
    StoragePoisoned,
}

impl crate::errors::IntoErrorResponse for SessionError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            SessionError::Game(err) => err.status_code(),
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Expired(_) | SessionError::Terminated(_) => StatusCode::GONE,
            SessionError::LobbyFull(_)
            | SessionError::NotEnoughPlayers { .. }
            | SessionError::AlreadyStarted => StatusCode::CONFLICT,
            SessionError::SeatAutomated(_) => StatusCode::FORBIDDEN,
            SessionError::InvalidPlayer(_) => StatusCode::BAD_REQUEST,
            SessionError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SessionError::Game(err) => err.code(),
            SessionError::NotFound(_) => "session_not_found",
            SessionError::Expired(_) => "session_expired",
            SessionError::Terminated(_) => "session_terminated",
            SessionError::LobbyFull(_) => "lobby_full",
            SessionError::NotEnoughPlayers { .. } => "not_enough_players",
            SessionError::AlreadyStarted => "already_started",
            SessionError::SeatAutomated(_) => "seat_automated",
            SessionError::InvalidPlayer(_) => "invalid_player",
            SessionError::StoragePoisoned => "session_storage_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::Game(err) => err.error_details(),
            SessionError::NotFound(id) => Some(serde_json::json!({ "session_id": id })),
            SessionError::Expired(id) => Some(serde_json::json!({
                "session_id": id,
                "reason": "Session expired due to inactivity"
            })),
            SessionError::Terminated(reason) => Some(serde_json::json!({ "reason": reason })),
            SessionError::NotEnoughPlayers { needed, have } => Some(serde_json::json!({
                "needed": needed,
                "have": have,
            })),
            _ => None,
        }
    }

    fn severity(&self) -> crate::errors::ErrorSeverity {
        use crate::errors::ErrorSeverity;
        match self {
            SessionError::StoragePoisoned => ErrorSeverity::Critical,
            _ => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IntoErrorResponse;
    use crate::logging::TestLogSubscriber;
    use mextrain_engine::hand::Hand;
    use mextrain_engine::validator::ValidMove;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn manager_with(settings: AppSettings) -> SessionManager {
        SessionManager::with_settings(
            Arc::new(EventBus::new()),
            Some(Arc::new(HistoryStore::new())),
            Arc::new(SettingsStore::with_settings(settings).expect("valid settings")),
        )
    }

    fn manager() -> SessionManager {
        manager_with(AppSettings {
            ai_think_delay_ms: 0,
            ..AppSettings::default()
        })
    }

    fn two_humans(seed: u64) -> MatchConfig {
        MatchConfig {
            max_players: 2,
            ai_enabled: false,
            seed: Some(seed),
            ..MatchConfig::default()
        }
    }

    fn current(mgr: &SessionManager, id: &SessionId) -> PlayerId {
        mgr.state(id, None)
            .expect("state")
            .round
            .expect("round")
            .current_player
    }

    /// Draws for `player` and passes if the drawn tile could have been played.
    fn draw_and_pass(mgr: &SessionManager, id: &SessionId, player: &str) {
        match mgr.draw(id, player).expect("draw") {
            GameEvent::DrawResult { can_play_drawn: true, .. } => {
                mgr.pass(id, player).expect("pass");
            }
            GameEvent::DrawResult { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lobby_enforces_capacity_and_start_once() {
        let mgr = manager();
        let id = mgr
            .create_session(
                MatchConfig {
                    max_players: 2,
                    ai_enabled: false,
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");

        assert!(matches!(
            mgr.join(&id, "bob").expect("join"),
            GameEvent::PlayerJoined { is_ai: false, .. }
        ));
        assert!(matches!(
            mgr.join(&id, "bob").expect("rejoin"),
            GameEvent::PlayerReconnected { .. }
        ));
        assert!(matches!(mgr.join(&id, "carol"), Err(SessionError::LobbyFull(2))));
        assert!(matches!(mgr.join(&id, "  "), Err(SessionError::InvalidPlayer(_))));

        mgr.start(&id, false).expect("start");
        assert!(matches!(mgr.start(&id, false), Err(SessionError::AlreadyStarted)));
        assert_eq!(
            mgr.state(&id, None).expect("state").status,
            SessionStatus::InProgress
        );
    }

    #[test]
    fn start_requires_min_players_unless_forced() {
        let mgr = manager();
        let config = MatchConfig {
            min_players: 2,
            ai_enabled: false,
            ..MatchConfig::default()
        };
        let id = mgr.create_session(config, "alice").expect("create");
        let err = mgr.start(&id, false).expect_err("too few");
        assert!(matches!(
            err,
            SessionError::NotEnoughPlayers { needed: 2, have: 1 }
        ));
        assert_eq!(err.status_code(), warp::http::StatusCode::CONFLICT);

        mgr.start(&id, true).expect("forced start");
        let view = mgr.state(&id, Some("alice")).expect("state");
        assert_eq!(view.players.len(), 1);
    }

    #[test]
    fn ai_fills_seats_from_the_roster() {
        let mgr = manager();
        let id = mgr
            .create_session(
                MatchConfig {
                    min_players: 2,
                    max_players: 4,
                    ai_fill_to_max: true,
                    ai_skill_level: 3,
                    seed: Some(3),
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");
        mgr.start(&id, false).expect("start");

        let view = mgr.state(&id, Some("alice")).expect("state");
        let names: Vec<&str> = view.players.iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(names, vec!["alice", "Caboose", "Switchman", "Signalman"]);
        assert!(view.players[1..]
            .iter()
            .all(|p| p.is_ai && p.skill_level == Some(3)));
        assert!(matches!(mgr.join(&id, "bob"), Err(SessionError::AlreadyStarted)));
        assert!(matches!(
            mgr.draw(&id, "Caboose"),
            Err(SessionError::SeatAutomated(_))
        ));
    }

    #[test]
    fn snapshots_hide_other_hands() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(9), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        mgr.start(&id, false).expect("start");

        let view = mgr.state(&id, Some("alice")).expect("state");
        let round = view.round.expect("round");
        let alice = round.seats.iter().find(|s| s.player_id == "alice").expect("alice");
        let bob = round.seats.iter().find(|s| s.player_id == "bob").expect("bob");
        assert_eq!(alice.tiles.as_ref().map(Vec::len), Some(alice.tile_count));
        assert!(bob.tiles.is_none());
        assert_eq!(bob.tile_count, 16);
    }

    #[test]
    fn turn_order_is_enforced_and_failed_moves_change_nothing() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(4), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        mgr.start(&id, false).expect("start");
        let before = mgr.state(&id, None).expect("state");

        let err = mgr.draw(&id, "bob").expect_err("not bob's turn");
        assert!(matches!(
            err,
            SessionError::Game(GameError::NotYourTurn { .. })
        ));
        assert!(matches!(
            mgr.pass(&id, "alice"),
            Err(SessionError::Game(GameError::IllegalMove(_)))
        ));
        assert!(matches!(
            mgr.play(&id, "mallory", Tile::new(1, 2), &TrainRef::Mexican, None),
            Err(SessionError::Game(GameError::PlayerNotInSession(_)))
        ));
        assert_eq!(mgr.state(&id, None).expect("state"), before);
    }

    #[test]
    fn valid_moves_match_the_validator_and_flag_forced_draws() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(21), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        mgr.start(&id, false).expect("start");

        let GameEvent::ValidMoves { moves, must_draw, .. } =
            mgr.valid_moves(&id, "alice", None).expect("moves")
        else {
            panic!("expected valid moves");
        };
        assert_eq!(must_draw, moves.is_empty());
        for mv in &moves {
            let GameEvent::ValidMoves { moves: for_tile, .. } = mgr
                .valid_moves(&id, "alice", Some(mv.tile))
                .expect("moves for tile")
            else {
                panic!("expected valid moves");
            };
            assert!(for_tile.contains(mv));
        }
        let GameEvent::ValidMoves { must_draw, .. } =
            mgr.valid_moves(&id, "bob", None).expect("moves")
        else {
            panic!("expected valid moves");
        };
        assert!(!must_draw);
    }

    #[test]
    fn inline_ai_plays_a_whole_match() {
        let mgr = manager();
        let history = Arc::clone(mgr.services.history.as_ref().expect("history"));
        let id = mgr
            .create_session(
                MatchConfig {
                    max_players: 3,
                    ai_fill_to_max: true,
                    ai_skill_level: 4,
                    games_to_play: 2,
                    seed: Some(77),
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");
        let mut sub = mgr.event_bus().subscribe(id.clone());
        mgr.start(&id, false).expect("start");

        let mut kinds = Vec::new();
        let mut guard = 0;
        while mgr.state(&id, None).expect("state").status == SessionStatus::InProgress {
            while let Ok(event) = sub.receiver.try_recv() {
                kinds.push(event.kind());
            }
            assert_eq!(current(&mgr, &id), "alice");
            let GameEvent::ValidMoves { moves, .. } =
                mgr.valid_moves(&id, "alice", None).expect("moves")
            else {
                panic!("expected valid moves");
            };
            match moves.first() {
                Some(mv) => {
                    mgr.play(&id, "alice", mv.tile, &mv.train, Some(mv.orientation))
                        .expect("play");
                }
                None => match mgr.draw(&id, "alice") {
                    Ok(GameEvent::DrawResult { can_play_drawn: true, tile: Some(tile), .. }) => {
                        let GameEvent::ValidMoves { moves, .. } =
                            mgr.valid_moves(&id, "alice", Some(tile)).expect("moves")
                        else {
                            panic!("expected valid moves");
                        };
                        let mv = &moves[0];
                        mgr.play(&id, "alice", mv.tile, &mv.train, Some(mv.orientation))
                            .expect("play drawn");
                    }
                    Ok(_) | Err(SessionError::Game(GameError::EmptyBoneyard)) => {}
                    Err(err) => panic!("draw failed: {err}"),
                },
            }
            guard += 1;
            assert!(guard < 500, "match did not finish");
        }

        let view = mgr.state(&id, Some("alice")).expect("state");
        assert_eq!(view.status, SessionStatus::Finished);
        let result = view.result.expect("result");
        assert_eq!(result.rounds_played, 2);
        assert_eq!(history.get(&id).expect("recorded").winner, result.winner);

        while let Ok(event) = sub.receiver.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.iter().filter(|k| **k == "round_ended").count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == "round_started").count(), 2);
        assert_eq!(kinds.last(), Some(&"match_ended"));
    }

    #[test]
    fn disconnected_player_is_auto_passed_after_grace() {
        let mgr = manager_with(AppSettings {
            ai_think_delay_ms: 0,
            disconnect_grace_secs: 0,
            ..AppSettings::default()
        });
        let id = mgr.create_session(two_humans(12), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        mgr.start(&id, false).expect("start");
        let alice_before = mgr.state(&id, Some("alice")).expect("state").round.expect("round");

        mgr.disconnect(&id, "alice").expect("disconnect");
        assert_eq!(current(&mgr, &id), "bob");
        let view = mgr.state(&id, None).expect("state");
        assert!(!view.players[0].connected);
        let round = view.round.expect("round");
        assert_eq!(round.boneyard_count + 1, alice_before.boneyard_count);
        assert!(round.trains.iter().any(|t| {
            t.train == TrainRef::Personal("alice".into()) && t.is_open
        }));

        draw_and_pass(&mgr, &id, "bob");
        assert_eq!(current(&mgr, &id), "bob");

        mgr.reconnect(&id, "alice").expect("reconnect");
        draw_and_pass(&mgr, &id, "bob");
        assert_eq!(current(&mgr, &id), "alice");
    }

    #[test]
    fn force_next_turn_moves_the_current_seat_on() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(5), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        assert!(matches!(
            mgr.force_next_turn(&id),
            Err(SessionError::Game(GameError::RoundNotStarted))
        ));
        mgr.start(&id, false).expect("start");

        assert_eq!(mgr.force_next_turn(&id).expect("force"), "alice");
        assert_eq!(current(&mgr, &id), "bob");
    }

    #[test]
    fn terminated_sessions_reject_actions_but_stay_readable() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(6), "alice").expect("create");
        mgr.join(&id, "bob").expect("join");
        mgr.start(&id, false).expect("start");
        let mut sub = mgr.event_bus().subscribe(id.clone());

        mgr.terminate(&id, "cheating").expect("terminate");
        assert!(matches!(
            mgr.draw(&id, "alice"),
            Err(SessionError::Terminated(reason)) if reason == "cheating"
        ));
        let view = mgr.state(&id, None).expect("state");
        assert_eq!(view.status, SessionStatus::Terminated);
        assert_eq!(view.terminated_reason.as_deref(), Some("cheating"));
        assert!(matches!(
            sub.receiver.try_recv(),
            Ok(GameEvent::SessionTerminated { reason, .. }) if reason == "cheating"
        ));
    }

    #[test]
    fn idle_sessions_expire_and_are_cleaned_up() {
        let mgr = manager();
        let id = mgr.create_session(two_humans(1), "alice").expect("create");
        let keep = mgr.create_session(two_humans(2), "bob").expect("create");
        let mut sub = mgr.event_bus().subscribe(id.clone());

        let later = Instant::now() + Duration::from_secs(31 * 60);
        mgr.force_last_active(&keep, Instant::now() + Duration::from_secs(20 * 60));
        assert!(matches!(mgr.active_at(&id, later), Err(SessionError::Expired(_))));

        assert_eq!(mgr.cleanup_expired_at(later), 1);
        assert_eq!(mgr.active_sessions(), vec![keep]);
        assert!(matches!(mgr.state(&id, None), Err(SessionError::NotFound(_))));
        assert!(matches!(
            sub.receiver.try_recv(),
            Ok(GameEvent::SessionTerminated { reason, .. }) if reason == "expired"
        ));
    }

    /// Never answers in time.
    struct Stalled;

    impl AIPolicy for Stalled {
        fn choose(&self, _: &RoundEngine, _: &str, moves: &[ValidMove], _: &Hand) -> AiAction {
            std::thread::sleep(Duration::from_millis(400));
            AiAction::Play(moves[0].clone())
        }
        fn name(&self) -> &str {
            "stalled"
        }
        fn skill_level(&self) -> u8 {
            1
        }
    }

    async fn wait_for_turn(mgr: &SessionManager, id: &SessionId, player: &str) {
        for _ in 0..200 {
            if current(mgr, id) == player {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("turn never came back to {player}");
    }

    #[tokio::test]
    async fn scheduled_ai_takes_its_turn() {
        let mgr = manager();
        let id = mgr
            .create_session(
                MatchConfig {
                    max_players: 2,
                    seed: Some(8),
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");
        mgr.start(&id, false).expect("start");

        draw_and_pass(&mgr, &id, "alice");
        wait_for_turn(&mgr, &id, "alice").await;
        let round = mgr.state(&id, None).expect("state").round.expect("round");
        assert!(round.turn >= 3);
    }

    #[test]
    fn failed_automatic_turn_is_logged() {
        let logs = TestLogSubscriber::new();
        let registry = Registry::default().with(logs.clone().into_layer());
        let mut state = SessionState {
            seats: Vec::new(),
            game: None,
            terminated: None,
            turn_started: Instant::now(),
            scheduled: None,
        };
        let events = EventBus::new();
        tracing::subscriber::with_default(registry, || {
            state.auto_turn_logged(&"s-1".to_string(), "AI turn did not finish", &events);
        });

        let entries = logs.entries();
        let failed = entries
            .iter()
            .find(|e| e.message.contains("automatic turn failed"))
            .expect("warning logged");
        assert_eq!(failed.level, tracing::Level::WARN);
        assert!(failed
            .fields
            .iter()
            .any(|(k, v)| k == "error" && v.contains(&GameError::RoundNotStarted.to_string())));
        assert!(failed
            .fields
            .iter()
            .any(|(k, v)| k == "reason" && v.contains("AI turn did not finish")));
    }

    #[tokio::test]
    async fn stalled_ai_is_logged_and_auto_played() {
        let logs = TestLogSubscriber::new();
        let _guard =
            tracing::subscriber::set_default(Registry::default().with(logs.clone().into_layer()));

        let mgr = manager_with(AppSettings {
            ai_think_delay_ms: 0,
            ai_decision_timeout_ms: 30,
            ..AppSettings::default()
        });
        let id = mgr
            .create_session(
                MatchConfig {
                    max_players: 2,
                    seed: Some(8),
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");
        mgr.start(&id, false).expect("start");
        mgr.set_policy(&id, "Caboose", Arc::new(Stalled)).expect("policy");

        let timed_out = || {
            logs.entries().iter().any(|e| {
                e.level == tracing::Level::WARN
                    && e.fields
                        .iter()
                        .any(|(k, v)| k == "reason" && v.contains("timed out"))
            })
        };
        // The policy is only consulted once the seat holds a playable tile.
        for _ in 0..20 {
            draw_and_pass(&mgr, &id, "alice");
            wait_for_turn(&mgr, &id, "alice").await;
            if timed_out() {
                break;
            }
        }
        assert!(timed_out());
    }

    #[tokio::test]
    async fn sweeper_recovers_a_slow_ai_turn() {
        let mgr = manager_with(AppSettings {
            ai_think_delay_ms: 60_000,
            ..AppSettings::default()
        });
        let id = mgr
            .create_session(
                MatchConfig {
                    max_players: 2,
                    seed: Some(8),
                    ..MatchConfig::default()
                },
                "alice",
            )
            .expect("create");
        mgr.start(&id, false).expect("start");
        draw_and_pass(&mgr, &id, "alice");
        assert_eq!(current(&mgr, &id), "Caboose");

        assert_eq!(mgr.recover_stalled_turns(Duration::from_secs(3600)), 0);
        assert_eq!(mgr.recover_stalled_turns(Duration::ZERO), 1);
        assert_eq!(current(&mgr, &id), "alice");
    }
}
