mod context;
mod docs;
mod errors;
mod logging;
mod schemas;
mod serialized;
mod sessions;
mod sse;

use std::{
    env,
    future::Future,
    net::{Ipv6Addr, SocketAddr},
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use logging::init_logger;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 5840;

pub type Router = axum::Router<ServerContext>;

/// Starts the beacon server. Resolves once the shutdown future does and all
/// in-flight requests have drained.
pub async fn run_server<F>(context: ServerContext, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = env::var("BEACON_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(sessions::router())
        .nest("/events", sse::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, root_router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server runs");
}
