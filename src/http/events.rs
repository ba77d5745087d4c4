//! `GET /events`: the fan-out channel as a server-sent event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use crossbeam_channel::RecvTimeoutError;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::error::ApiError;
use super::AppState;
use crate::channel::{ChannelEvent, Delivery, ObserverHandle};
use crate::store::RecordStore;
use crate::types::Sequence;

/// How often the bridge thread checks whether the client went away.
const CLIENT_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub(crate) struct EventsQuery {
    /// Snapshot sequence the client already holds.
    since: Option<u64>,
}

pub(crate) async fn events_handler<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Query(query) = query?;
    let channel = state.service.channel();
    let handle = match query.since {
        Some(since) => channel.connect_from(Sequence(since), state.observer.clone()),
        None => channel.connect(state.observer.clone()),
    };
    tracing::info!(observer = handle.id.0, since = ?query.since, "event stream opened");

    let (tx, rx) = mpsc::channel(state.observer.buffer_size.max(1));
    let bridge_state = state.clone();
    tokio::task::spawn_blocking(move || forward(bridge_state, handle, tx));

    let stream = ReceiverStream::new(rx).map(|delivery| Ok(to_sse(delivery)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Move deliveries from the observer queue onto the async stream until
/// either side closes.
fn forward<S: RecordStore>(
    state: Arc<AppState<S>>,
    handle: ObserverHandle,
    tx: mpsc::Sender<Delivery>,
) {
    loop {
        let delivery = match handle.recv_timeout(CLIENT_CHECK_INTERVAL) {
            Ok(delivery) => delivery,
            Err(RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let last = matches!(delivery, Delivery::Dropped { .. });
        if tx.blocking_send(delivery).is_err() || last {
            break;
        }
    }

    state.service.channel().disconnect(handle.id);
    tracing::info!(observer = handle.id.0, "event stream closed");
}

fn to_sse(delivery: Delivery) -> Event {
    match delivery {
        Delivery::Event { envelope } => {
            let event = Event::default()
                .event(envelope.event.name())
                .id(envelope.sequence.to_string());
            let data = match envelope.event {
                ChannelEvent::ProductAdded(product) | ChannelEvent::ProductUpdated(product) => {
                    serde_json::to_string(&product)
                }
                ChannelEvent::ProductDeleted(id) => serde_json::to_string(&id),
            };
            match data {
                Ok(data) => event.data(data),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode event");
                    event.comment("encoding failed")
                }
            }
        }
        Delivery::CaughtUp => Event::default().event("caughtUp").data("{}"),
        Delivery::ResyncRequired => Event::default().event("resyncRequired").data("{}"),
        Delivery::Dropped { reason } => Event::default()
            .event("dropped")
            .data(json!({ "reason": reason }).to_string()),
    }
}

