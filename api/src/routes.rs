use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let onyx_routes = Router::new()
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route(
            "/groups/:group/jobs",
            post(handlers::jobs::create_job).get(handlers::jobs::list_group_jobs),
        )
        .route(
            "/groups/:group/jobs/:name",
            get(handlers::jobs::get_job).delete(handlers::jobs::delete_job),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/onyx", onyx_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
