use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use beacon_core::{NewSession, Privacy, PrivacyPatch, SessionPatch};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    /// A stable identity for cross-session playtime. Without one, every
    /// connect counts as a brand-new player.
    #[validate(length(min = 1, max = 128))]
    pub identity: Option<String>,
    #[serde(default)]
    pub privacy: Option<PrivacySchema>,
}

#[derive(Debug, Default, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivacySchema {
    pub show_username: Option<bool>,
    pub show_version: Option<bool>,
    pub show_world: Option<bool>,
    pub show_server: Option<bool>,
}

/// A sparse session patch. Omitted fields stay untouched, explicit nulls
/// clear the nullable ones, and an empty body is a heartbeat.
#[derive(Debug, Default, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateSchema {
    #[validate(length(max = 64))]
    pub status: Option<String>,
    #[validate(length(max = 64))]
    pub game_mode: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub minecraft_version: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub world_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub server_address: Option<Option<String>>,
    #[serde(default)]
    pub privacy: Option<PrivacySchema>,
}

/// Keeps an explicit `null` apart from an absent field during
/// deserialization
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl PrivacySchema {
    fn into_privacy(self) -> Privacy {
        Privacy {
            show_username: self.show_username.unwrap_or(true),
            show_version: self.show_version.unwrap_or(true),
            show_world: self.show_world.unwrap_or(true),
            show_server: self.show_server.unwrap_or(true),
        }
    }
}

impl From<PrivacySchema> for PrivacyPatch {
    fn from(schema: PrivacySchema) -> Self {
        Self {
            show_username: schema.show_username,
            show_version: schema.show_version,
            show_world: schema.show_world,
            show_server: schema.show_server,
        }
    }
}

impl From<ConnectSchema> for NewSession {
    fn from(schema: ConnectSchema) -> Self {
        Self {
            display_name: schema.username,
            identity_hint: schema.identity,
            privacy: schema.privacy.unwrap_or_default().into_privacy(),
        }
    }
}

impl From<UpdateSchema> for SessionPatch {
    fn from(schema: UpdateSchema) -> Self {
        Self {
            status: schema.status,
            game_mode: schema.game_mode,
            minecraft_version: schema.minecraft_version,
            world_name: schema.world_name,
            server_address: schema.server_address,
            privacy: schema.privacy.map(Into::into),
        }
    }
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
