use crate::errors::IntoErrorResponse;
use crate::events::{EventBus, EventSubscription, GameEvent};
use crate::session::{SessionId, SessionManager};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use warp::http;
use warp::reply::{self, Response};
use warp::sse;
use warp::Reply;

/// Streams a session's events as `game_event` server-sent events.
///
/// The subscription lives as long as the stream; dropping the connection unsubscribes.
pub async fn stream_events(
    session_id: SessionId,
    sessions: Arc<SessionManager>,
    event_bus: Arc<EventBus>,
) -> Response {
    if let Err(err) = sessions.get_session(&session_id) {
        return err.into_http_response();
    }

    let subscription = event_bus.subscribe(session_id);
    let stream = subscription_stream(subscription);
    let keep_alive = sse::keep_alive()
        .interval(Duration::from_secs(15))
        .text(":keep-alive\n");

    let reply = sse::reply(keep_alive.stream(stream));
    reply::with_header(reply, http::header::CACHE_CONTROL, "no-cache").into_response()
}

fn subscription_stream(
    subscription: EventSubscription,
) -> impl tokio_stream::Stream<Item = Result<sse::Event, Infallible>> {
    let mut subscription = subscription;
    let (_, placeholder_rx) = mpsc::channel(1);
    let receiver = std::mem::replace(&mut subscription.receiver, placeholder_rx);
    let subscription = Arc::new(subscription);

    ReceiverStream::new(receiver).map(move |event| {
        let _keep_alive = Arc::clone(&subscription);
        Ok(render_event(event))
    })
}

fn render_event(event: GameEvent) -> sse::Event {
    match serde_json::to_string(&event) {
        Ok(json) => sse::Event::default().event("game_event").data(json),
        Err(err) => {
            let fallback = serde_json::json!({
                "type": "error",
                "message": format!("failed to serialize game event: {err}")
            })
            .to_string();
            sse::Event::default().event("game_event").data(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_forwards_bus_events() {
        let bus = EventBus::new();
        let session = "s1".to_string();
        let mut stream = Box::pin(subscription_stream(bus.subscribe(session.clone())));
        assert_eq!(bus.subscriber_count(), 1);

        bus.broadcast(
            &session,
            GameEvent::SessionTerminated {
                session_id: session.clone(),
                reason: "maintenance".into(),
            },
        );
        assert!(matches!(stream.next().await, Some(Ok(_))));

        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let bus = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionManager::new(Arc::clone(&bus)));
        let response = stream_events("missing".into(), sessions, bus).await;
        assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);
    }
}
