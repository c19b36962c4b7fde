// ── Server-sent event stream ──
//
// One SSE response per client connection. The hub's `ConnectionHandle`
// is owned by the response stream, so a dropped HTTP connection (or
// shutdown) unregisters the client.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::info;

use syncdesk_core::{Frame, SubscriptionFilter, SubscriptionParams};

use crate::error::ApiError;
use crate::state::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(flatten)]
    subscription: SubscriptionParams,
}

pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut actor = state.auth.authenticate(&headers, query.token.as_deref())?;
    if query.session_id.is_some() {
        actor.session_id = query.session_id;
    }

    let filters = if query.subscription == SubscriptionParams::default() {
        Vec::new()
    } else {
        vec![SubscriptionFilter::from_params(&query.subscription)?]
    };

    let handle = state.hub().connect(&actor, filters);
    info!(
        connection_id = handle.id(),
        user_id = actor.user_id.as_deref().unwrap_or("-"),
        "event stream opened"
    );

    let frames = handle
        .take_until(state.shutdown.cancelled_owned())
        .map(|frame| Ok(to_event(&frame)));

    Ok(Sse::new(frames).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

fn to_event(frame: &Frame) -> Event {
    let event = Event::default()
        .event(frame.event.as_ref())
        .data(frame.data_json());
    match &frame.id {
        Some(id) => event.id(id),
        None => event,
    }
}
