//! Server-sent events stream.
//!
//! `GET /api/solar/stream` keeps the response open and writes each
//! [`StreamEvent`] as one `data:` line of JSON. The subscriber is
//! unregistered when the client disconnects and Axum drops the stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use solar_twin_core::Subscription;
use solar_twin_types::StreamEvent;
use tracing::{debug, warn};

use crate::state::AppState;

/// Open an SSE stream.
///
/// # Route
///
/// `GET /api/solar/stream`
pub async fn sse_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.engine.subscribe().await;
    debug!(subscriber = %subscription.id(), "SSE client connected");

    Sse::new(events(subscription)).keep_alive(KeepAlive::default())
}

/// Adapt a subscription into an SSE event stream. Ends once the
/// broadcaster drops the subscriber.
fn events(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((Ok(to_sse(&event)), subscription))
    })
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!(kind = event.kind(), "Failed to serialize stream event: {e}");
        Event::default().comment("serialization error")
    })
}
