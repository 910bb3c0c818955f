//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE streams for the inspection service: a general stream for
//! connection status and workplace events, and a per-session stream that
//! forwards the progress of one inspection and closes once the inspection
//! reaches a terminal event.

use crate::events::EventBus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// General event stream: connection status, heartbeats and workplace events
///
/// Forwards events that do not belong to an inspection session (model
/// activation, dataset changes). Inspection progress has its own stream.
pub fn create_general_sse_stream(
    event_bus: &EventBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(event) if event.session_id().is_none() => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                yield Ok(Event::default().event(event.event_type()).data(json));
                            }
                            Err(e) => {
                                warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE: general subscriber lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}

/// Stream the events of one inspection session
///
/// The subscription is taken before the stream is returned so events emitted
/// right after the client connects are not lost. The stream ends after the
/// first terminal event (completed, privacy blocked, failed) of the session.
pub fn create_session_sse_stream(
    event_bus: &EventBus,
    session_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = %session_id, "SSE client subscribed to inspection progress");

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.session_id() != Some(session_id.as_str()) {
                        continue;
                    }
                    let terminal = event.is_terminal();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            yield Ok(Event::default().event(event.event_type()).data(json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
                        }
                    }
                    if terminal {
                        debug!(session_id = %session_id, "SSE: inspection finished, closing stream");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped, "SSE: subscriber lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}
