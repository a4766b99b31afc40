//! Server-sent event feeds: one event with the full state per change.
//! Each stream owns a store subscription; the client disconnecting drops the
//! stream and with it the subscription.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use std::sync::Arc;

use super::handlers::{storage_error, ApiError, AppState, Caller, TotalResponse};
use crate::models::CommentView;

/// Live visit total
pub async fn visits_stream(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let totals = state
        .visits
        .total_visits()
        .await
        .map_err(|e| storage_error("subscribe to visits", e))?;

    let events = stream::unfold(totals, |mut totals| async move {
        let total = totals.next().await?;
        let event = Event::default()
            .event("visits")
            .json_data(TotalResponse { total });
        Some((event, totals))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Live comment list as seen by the caller
pub async fn comments_stream(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let feed = state
        .board
        .list_comments()
        .await
        .map_err(|e| storage_error("subscribe to comments", e))?;

    let events = stream::unfold((feed, caller), |(mut feed, caller)| async move {
        let comments = feed.next().await?;
        let views: Vec<CommentView> = comments
            .iter()
            .map(|c| c.view_for(caller.as_ref()))
            .collect();
        let event = Event::default().event("comments").json_data(views);
        Some((event, (feed, caller)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
