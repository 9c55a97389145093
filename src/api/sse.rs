//! Server-Sent Events support
//!
//! One SSE message per stream event; the SSE event name is the event's type.

use crate::runtime::StreamEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Convert a cycle's event channel into an SSE response.
///
/// Dropping the response (client gone) drops the receiver, which the cycle
/// observes as a disconnect.
pub fn sse_stream(
    events: UnboundedReceiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(events).map(|event| Ok(stream_event_to_axum(&event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn stream_event_to_axum(event: &StreamEvent) -> Event {
    let data = match serde_json::to_string(event) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, event = event.event_type(), "Failed to encode stream event");
            format!(r#"{{"type":"{}"}}"#, event.event_type())
        }
    };
    Event::default().event(event.event_type()).data(data)
}
