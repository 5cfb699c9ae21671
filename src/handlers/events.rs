//! Server-sent events endpoint for overlay pages.
//!
//! Each connection registers with the broadcaster and drains its channel
//! into the response. The stream emits `connected` once on open, a named
//! `ping` every 15 seconds so proxies keep the connection alive, and
//! `purchase` events as they are published. Disconnect is detected by the
//! stream being dropped, which deregisters the subscriber.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, interval_at};
use uuid::Uuid;

use crate::services::broadcast::{Broadcaster, OutboundEvent};
use crate::state::AppState;

const PING_PERIOD: Duration = Duration::from_secs(15);

/// Handle `GET /{tenant}/events`.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Sse<EventStream> {
    let (id, rx) = state.broadcaster.subscribe(&tenant);

    tracing::info!(tenant, subscriber = %id, "overlay connected");

    Sse::new(EventStream {
        broadcaster: state.broadcaster.clone(),
        tenant,
        id,
        rx,
        ping: interval_at(Instant::now() + PING_PERIOD, PING_PERIOD),
        sent_connected: false,
    })
}

/// Event stream for one overlay connection.
///
/// Deregisters itself from the broadcaster on drop, so a closed connection
/// stops consuming fan-out work immediately rather than waiting for the
/// next failed publish.
pub struct EventStream {
    broadcaster: Broadcaster,
    tenant: String,
    id: Uuid,
    rx: mpsc::UnboundedReceiver<OutboundEvent>,
    ping: Interval,
    sent_connected: bool,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.sent_connected {
            this.sent_connected = true;
            let event = Event::default().event("connected").data("{}");
            return Poll::Ready(Some(Ok(event)));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(outbound)) => {
                let event = Event::default().event(outbound.name).data(outbound.data);
                return Poll::Ready(Some(Ok(event)));
            }
            // Sender side gone: the broadcaster dropped this subscriber
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        match this.ping.poll_tick(cx) {
            Poll::Ready(_) => {
                let event = Event::default().event("ping").data("{}");
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(&self.tenant, self.id);
        tracing::info!(tenant = %self.tenant, subscriber = %self.id, "overlay disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn stream_for(broadcaster: &Broadcaster, tenant: &str) -> EventStream {
        let (id, rx) = broadcaster.subscribe(tenant);
        EventStream {
            broadcaster: broadcaster.clone(),
            tenant: tenant.to_string(),
            id,
            rx,
            ping: interval_at(Instant::now() + PING_PERIOD, PING_PERIOD),
            sent_connected: false,
        }
    }

    #[tokio::test]
    async fn first_event_is_connected_then_published_events_follow() {
        let broadcaster = Broadcaster::new();
        let mut stream = stream_for(&broadcaster, "alice");

        // Opening handshake
        assert!(stream.next().await.is_some());

        broadcaster.publish("alice", "purchase", &serde_json::json!({"username": "Maria"}));
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn dropping_the_stream_deregisters_the_subscriber() {
        let broadcaster = Broadcaster::new();
        let stream = stream_for(&broadcaster, "alice");
        assert_eq!(broadcaster.subscriber_count("alice"), 1);

        drop(stream);
        assert_eq!(broadcaster.subscriber_count("alice"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pings_flow_while_no_events_are_published() {
        let broadcaster = Broadcaster::new();
        let mut stream = stream_for(&broadcaster, "alice");

        // connected
        assert!(stream.next().await.is_some());
        // ping after the period elapses under the paused clock
        assert!(stream.next().await.is_some());
    }
}
