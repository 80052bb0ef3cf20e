use crate::events::EventBus;
use crate::handlers;
use crate::history::HistoryStore;
use crate::session::{SessionError, SessionManager};
use crate::settings::SettingsStore;
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::reply::{Reply, Response};
use warp::Filter;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
    sweep_interval: Duration,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            sweep_interval: Duration::from_secs(10),
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    /// How often the sweeper expires idle sessions and unsticks stalled turns.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

#[derive(Debug, Clone)]
pub struct AppContext {
    config: ServerConfig,
    event_bus: Arc<EventBus>,
    sessions: Arc<SessionManager>,
    history: Arc<HistoryStore>,
    settings: Arc<SettingsStore>,
}

impl AppContext {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_settings(config, Arc::new(SettingsStore::new()))
    }

    pub fn with_settings(config: ServerConfig, settings: Arc<SettingsStore>) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let history = Arc::new(HistoryStore::new());
        let sessions = Arc::new(SessionManager::with_settings(
            Arc::clone(&event_bus),
            Some(Arc::clone(&history)),
            Arc::clone(&settings),
        ));
        Self {
            config,
            event_bus,
            sessions,
            history,
            settings,
        }
    }

    pub fn new_for_tests() -> Self {
        Self::new(ServerConfig::for_tests())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub fn history(&self) -> Arc<HistoryStore> {
        Arc::clone(&self.history)
    }

    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            context: AppContext::new(config),
        }
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let config = context.config().clone();
        let bind_addr = Self::bind_addr(&config)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(address = %addr, "web server listening");

        let sweeper = tokio::spawn(Self::sweep(context.sessions(), config.sweep_interval()));
        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, sweeper, context))
    }

    /// Periodic housekeeping: drops idle sessions and moves on turns nobody is taking.
    async fn sweep(sessions: Arc<SessionManager>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = sessions.cleanup_expired_sessions();
            let max_turn_age = sessions
                .settings()
                .get()
                .map(|s| s.think_delay() + s.decision_timeout() * 2)
                .unwrap_or(Duration::from_secs(30));
            let recovered = sessions.recover_stalled_turns(max_turn_age);
            if expired > 0 || recovered > 0 {
                tracing::info!(expired, recovered, "sweeper pass");
            }
        }
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }

    /// Every HTTP route of the server, also used directly by `warp::test` in tests.
    pub fn routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let health = Self::health_route(context);
        let session_routes = Self::session_routes(context);
        let turn_routes = Self::turn_routes(context);
        let admin_routes = Self::admin_routes(context);
        let history_routes = Self::history_routes(context);
        let settings_routes = Self::settings_routes(context);
        let sse_routes = Self::sse_routes(context);

        health
            .or(session_routes)
            .unify()
            .or(turn_routes)
            .unify()
            .or(admin_routes)
            .unify()
            .or(history_routes)
            .unify()
            .or(settings_routes)
            .unify()
            .or(sse_routes)
            .unify()
            .boxed()
    }

    fn health_route(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .map(move || handlers::health(sessions.active_sessions().len()).into_response())
            .boxed()
    }

    fn session_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();

        let create = warp::path!("api" / "sessions")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |sessions: Arc<SessionManager>,
                 request: handlers::CreateSessionRequest| async move {
                    let response = handlers::create_session(sessions, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let join = warp::path!("api" / "sessions" / String / "join")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayerRequest| async move {
                    let response = handlers::join_session(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let start = warp::path!("api" / "sessions" / String / "start")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::query::<handlers::StartQuery>())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 query: handlers::StartQuery| async move {
                    let response = handlers::start_match(sessions, session_id, query).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let state = warp::path!("api" / "sessions" / String / "state")
            .and(warp::get())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::query::<handlers::StateQuery>())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 query: handlers::StateQuery| async move {
                    let response = handlers::get_session_state(sessions, session_id, query).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let disconnect = warp::path!("api" / "sessions" / String / "disconnect")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayerRequest| async move {
                    let response =
                        handlers::disconnect_player(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let reconnect = warp::path!("api" / "sessions" / String / "reconnect")
            .and(warp::post())
            .and(Self::with_session_manager(sessions))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayerRequest| async move {
                    let response = handlers::reconnect_player(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        create
            .or(join)
            .unify()
            .or(start)
            .unify()
            .or(state)
            .unify()
            .or(disconnect)
            .unify()
            .or(reconnect)
            .unify()
            .boxed()
    }

    fn turn_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();

        let moves = warp::path!("api" / "sessions" / String / "moves")
            .and(warp::get())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::query::<handlers::MovesQuery>())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 query: handlers::MovesQuery| async move {
                    let response = handlers::valid_moves(sessions, session_id, query).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let play = warp::path!("api" / "sessions" / String / "play")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayRequest| async move {
                    let response = handlers::play_tile(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let draw = warp::path!("api" / "sessions" / String / "draw")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayerRequest| async move {
                    let response = handlers::draw_tile(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let pass = warp::path!("api" / "sessions" / String / "pass")
            .and(warp::post())
            .and(Self::with_session_manager(sessions))
            .and(warp::body::json())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::PlayerRequest| async move {
                    let response = handlers::pass_turn(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        moves
            .or(play)
            .unify()
            .or(draw)
            .unify()
            .or(pass)
            .unify()
            .boxed()
    }

    fn admin_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();

        let terminate = warp::path!("api" / "admin" / "sessions" / String / "terminate")
            .and(warp::post())
            .and(Self::with_session_manager(sessions.clone()))
            .and(warp::query::<handlers::TerminateRequest>())
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 request: handlers::TerminateRequest| async move {
                    let response =
                        handlers::terminate_session(sessions, session_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let force_turn = warp::path!("api" / "admin" / "sessions" / String / "force-turn")
            .and(warp::post())
            .and(Self::with_session_manager(sessions))
            .and_then(
                |session_id: String, sessions: Arc<SessionManager>| async move {
                    let response = handlers::force_turn(sessions, session_id).await;
                    Ok::<_, Infallible>(response)
                },
            );

        terminate.or(force_turn).unify().boxed()
    }

    fn sse_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let sessions = context.sessions();
        let event_bus = context.event_bus();

        warp::path!("api" / "sessions" / String / "events")
            .and(warp::get())
            .and(Self::with_session_manager(sessions))
            .and(Self::with_event_bus(event_bus))
            .and_then(
                |session_id: String,
                 sessions: Arc<SessionManager>,
                 event_bus: Arc<EventBus>| async move {
                    let response =
                        handlers::sse::stream_events(session_id, sessions, event_bus).await;
                    Ok::<_, Infallible>(response)
                },
            )
            .boxed()
    }

    fn history_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let history = context.history();

        let recent = warp::path!("api" / "history")
            .and(warp::get())
            .and(warp::query::<handlers::GetHistoryQuery>())
            .and(Self::with_history_store(history.clone()))
            .and_then(
                |query: handlers::GetHistoryQuery, history: Arc<HistoryStore>| async move {
                    let response = handlers::get_recent_matches(history, query).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let stats = warp::path!("api" / "history" / "stats")
            .and(warp::get())
            .and(Self::with_history_store(history.clone()))
            .and_then(|history: Arc<HistoryStore>| async move {
                let response = handlers::get_statistics(history).await;
                Ok::<_, Infallible>(response)
            });

        let by_id = warp::path!("api" / "history" / String)
            .and(warp::get())
            .and(Self::with_history_store(history))
            .and_then(|match_id: String, history: Arc<HistoryStore>| async move {
                let response = handlers::get_match_by_id(history, match_id).await;
                Ok::<_, Infallible>(response)
            });

        recent
            .or(stats)
            .unify()
            .or(by_id)
            .unify()
            .boxed()
    }

    fn settings_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let settings = context.settings();

        let get = warp::path!("api" / "settings")
            .and(warp::get())
            .and(Self::with_settings_store(settings.clone()))
            .and_then(|store: Arc<SettingsStore>| async move {
                let response = handlers::get_settings(store).await;
                Ok::<_, Infallible>(response)
            });

        let put = warp::path!("api" / "settings")
            .and(warp::put())
            .and(Self::with_settings_store(settings.clone()))
            .and(warp::body::json())
            .and_then(
                |store: Arc<SettingsStore>, request: handlers::UpdateSettingsRequest| async move {
                    let response = handlers::update_settings(store, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let field = warp::path!("api" / "settings" / "field")
            .and(warp::patch())
            .and(Self::with_settings_store(settings.clone()))
            .and(warp::body::json())
            .and_then(
                |store: Arc<SettingsStore>, request: handlers::UpdateFieldRequest| async move {
                    let response = handlers::update_field(store, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let reset = warp::path!("api" / "settings" / "reset")
            .and(warp::post())
            .and(Self::with_settings_store(settings))
            .and_then(|store: Arc<SettingsStore>| async move {
                let response = handlers::reset_settings(store).await;
                Ok::<_, Infallible>(response)
            });

        get.or(put)
            .unify()
            .or(field)
            .unify()
            .or(reset)
            .unify()
            .boxed()
    }

    fn with_session_manager(
        sessions: Arc<SessionManager>,
    ) -> impl Filter<Extract = (Arc<SessionManager>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&sessions))
    }

    fn with_event_bus(
        event_bus: Arc<EventBus>,
    ) -> impl Filter<Extract = (Arc<EventBus>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&event_bus))
    }

    fn with_history_store(
        history: Arc<HistoryStore>,
    ) -> impl Filter<Extract = (Arc<HistoryStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&history))
    }

    fn with_settings_store(
        settings: Arc<SettingsStore>,
    ) -> impl Filter<Extract = (Arc<SettingsStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&settings))
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    sweeper: Option<JoinHandle<()>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        sweeper: JoinHandle<()>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            sweeper: Some(sweeper),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        tracing::info!(address = %self.addr, "web server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
