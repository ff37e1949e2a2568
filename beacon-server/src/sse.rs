use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::{Stream, StreamExt};

use crate::{context::ServerContext, Router};

/// Subscribes the caller to the presence feed. The first event is always an
/// `initial` snapshot of current state; dropping the connection unregisters
/// the observer.
#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of presence notifications",
            body = crate::serialized::PresenceNotification
        )
    )
)]
pub(crate) async fn event_stream(
    State(context): State<ServerContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let handle = context.beacon.subscribe();

    let stream = handle.map(|payload| {
        let data = serde_json::to_string(&payload).expect("payload serializes");
        Ok(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}
