use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json,
};
use serde::Deserialize;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{ConnectSchema, UpdateSchema, ValidatedJson},
    serialized::{DisconnectResult, PopularVersion, PresenceList, SessionInfo, ToSerialized},
    Router,
};

const DEFAULT_VERSION_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub(crate) struct VersionsQuery {
    limit: Option<usize>,
}

#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "sessions",
    request_body = ConnectSchema,
    responses(
        (status = 201, body = SessionInfo),
        (status = 400, description = "The username is missing or invalid")
    )
)]
pub(crate) async fn create_session(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<ConnectSchema>,
) -> ServerResult<(StatusCode, Json<SessionInfo>)> {
    let session = context.beacon.create_session(body.into()).await?;

    Ok((StatusCode::CREATED, Json(session.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/sessions/{token}",
    tag = "sessions",
    request_body = UpdateSchema,
    responses(
        (status = 200, body = SessionInfo),
        (status = 404, description = "The session is gone; reconnect with a fresh one")
    )
)]
pub(crate) async fn update_session(
    State(context): State<ServerContext>,
    Path(token): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateSchema>,
) -> ServerResult<Json<SessionInfo>> {
    let session = context.beacon.update_session(&token, &body.into())?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{token}",
    tag = "sessions",
    responses(
        (status = 200, body = DisconnectResult),
        (status = 404, description = "The session is already gone")
    )
)]
pub(crate) async fn disconnect_session(
    State(context): State<ServerContext>,
    Path(token): Path<String>,
) -> ServerResult<Json<DisconnectResult>> {
    let duration = context.beacon.end_session(&token).await?;

    Ok(Json(duration.into()))
}

#[utoipa::path(
    get,
    path = "/v1/presence",
    tag = "presence",
    responses(
        (status = 200, body = PresenceList)
    )
)]
pub(crate) async fn list_presence(State(context): State<ServerContext>) -> Json<PresenceList> {
    Json(context.beacon.live_presence().to_serialized())
}

#[utoipa::path(
    get,
    path = "/v1/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Lifetime counters keyed by metric name")
    )
)]
pub(crate) async fn statistics(State(context): State<ServerContext>) -> Json<BTreeMap<String, i64>> {
    Json(context.beacon.statistics())
}

#[utoipa::path(
    get,
    path = "/v1/stats/versions",
    tag = "stats",
    params(
        ("limit" = Option<usize>, Query, description = "How many versions to return")
    ),
    responses(
        (status = 200, body = Vec<PopularVersion>)
    )
)]
pub(crate) async fn popular_versions(
    State(context): State<ServerContext>,
    Query(query): Query<VersionsQuery>,
) -> Json<Vec<PopularVersion>> {
    let limit = query.limit.unwrap_or(DEFAULT_VERSION_LIMIT);

    Json(context.beacon.popular_versions(limit).to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route(
            "/sessions/:token",
            patch(update_session).delete(disconnect_session),
        )
        .route("/presence", get(list_presence))
        .route("/stats", get(statistics))
        .route("/stats/versions", get(popular_versions))
}
