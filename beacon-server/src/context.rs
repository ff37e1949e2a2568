use std::sync::Arc;

use axum::extract::FromRef;
use beacon_core::Beacon;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub beacon: Arc<Beacon>,
}
