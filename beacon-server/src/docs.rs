use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::schemas::{ConnectSchema, PrivacySchema, UpdateSchema};
use crate::serialized::{
    DisconnectResult, PopularVersion, Presence, PresenceList, PresenceNotification, SessionInfo,
};

#[derive(OpenApi)]
#[openapi(
    info(
        description = "beacon-server exposes endpoints to publish and observe launcher presence"
    ),
    paths(
        crate::sessions::create_session,
        crate::sessions::update_session,
        crate::sessions::disconnect_session,
        crate::sessions::list_presence,
        crate::sessions::statistics,
        crate::sessions::popular_versions,
        crate::sse::event_stream,
    ),
    components(schemas(
        ConnectSchema,
        PrivacySchema,
        UpdateSchema,
        SessionInfo,
        Presence,
        PresenceList,
        DisconnectResult,
        PopularVersion,
        PresenceNotification,
    ))
)]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
