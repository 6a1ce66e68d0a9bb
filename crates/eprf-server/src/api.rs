use std::sync::Arc;

use axum::{
    extract::State,
    http::Method,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use eprf_collab::Collab;

use crate::config::ServerConfig;
use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub collab: Collab,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/access",
            get(handlers::access::resolve),
        )
        .route(
            "/api/can-transfer",
            get(handlers::access::can_transfer),
        )
        .route(
            "/api/records",
            post(handlers::records::create)
                .get(handlers::records::list)
                .put(handlers::records::update_status)
                .delete(handlers::records::delete),
        )
        .route("/api/records/transfer", post(handlers::records::transfer))
        .route(
            "/api/collaborators",
            get(handlers::collaborators::list)
                .post(handlers::collaborators::add)
                .put(handlers::collaborators::update)
                .delete(handlers::collaborators::remove),
        )
        .route("/api/share-links", post(handlers::collaborators::create_share_link))
        .route(
            "/api/realtime-event",
            post(handlers::realtime::post_event).get(handlers::realtime::chat_history),
        )
        .route("/api/realtime-event/poll", get(handlers::realtime::poll))
        .route(
            "/api/notifications",
            get(handlers::notifications::list)
                .post(handlers::notifications::create)
                .put(handlers::notifications::update)
                .delete(handlers::notifications::delete),
        )
        .route(
            "/api/version-history",
            get(handlers::versions::query)
                .post(handlers::versions::record)
                .put(handlers::versions::restore),
        )
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
