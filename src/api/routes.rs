use axum::{
    http::{Method, Uri},
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{
    add_comment, begin_edit, caller_ip, commit_edit, delete_comment, health_check, list_comments,
    profile, record_visit, total_visits, AppState,
};
use super::static_files::serve_static;
use super::stream::{comments_stream, visits_stream};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.frontend.static_dir.clone();

    // Other origins may read, never write
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    let api_routes = Router::new()
        .route("/ip", get(caller_ip))
        .route("/profile", get(profile))
        .route("/visits", get(total_visits).post(record_visit))
        .route("/visits/stream", get(visits_stream))
        .route("/comments", get(list_comments).post(add_comment))
        .route("/comments/stream", get(comments_stream))
        .route("/comments/{id}", put(commit_edit).delete(delete_comment))
        .route("/comments/{id}/edit", get(begin_edit))
        .layer(cors);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .fallback(move |uri: Uri| {
            let static_dir = static_dir.clone();
            async move { serve_static(uri, static_dir).await }
        })
        .with_state(state)
}
