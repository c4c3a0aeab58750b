//! Server-sent event stream of worker events.
//!
//! Each SSE event is named after the worker event's kind and carries its
//! JSON encoding. Closing the connection drops the stream, which drops the
//! subscription and deregisters it from the worker.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::AppState;
use crate::worker::WorkerEvent;

/// Interval between keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Encodes `event` as an SSE event, or `None` if it cannot be serialised.
#[must_use]
pub fn to_sse_event(event: &WorkerEvent) -> Option<Event> {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(encoded) => Some(encoded),
        Err(error) => {
            warn!(kind = event.kind(), %error, "dropping unencodable event");
            None
        }
    }
}

/// Streams worker events, starting with a snapshot of the current set.
pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let worker = app_state.worker();
    worker.ensure_started();
    let subscription = worker.subscribe();
    debug!(subscribers = worker.subscriber_count(), "stream opened");

    let events = subscription.filter_map(|event| async move { to_sse_event(&event).map(Ok) });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
