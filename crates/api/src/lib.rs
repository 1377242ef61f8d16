pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod ws;

use axum::{
    Router,
    routing::{get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Call lifecycle routes (under workspace)
    let call_routes = Router::new()
        .route("/", post(routes::call::start))
        .route("/active", get(routes::call::active))
        .route("/{call_id}", get(routes::call::get))
        .route("/{call_id}/join", post(routes::call::join))
        .route("/{call_id}/leave", post(routes::call::leave))
        .route("/{call_id}/end", post(routes::call::end))
        .route("/{call_id}/settings", put(routes::call::update_settings))
        .route("/{call_id}/media", put(routes::call::toggle_media))
        .route(
            "/{call_id}/screen-share",
            post(routes::call::start_screen_share).delete(routes::call::stop_screen_share),
        )
        .route("/{call_id}/consent", post(routes::call::record_consent))
        .route("/{call_id}/metrics", post(routes::call::update_metrics));

    let api = Router::new().nest("/workspace/{workspace_id}/call", call_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
