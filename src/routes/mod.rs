pub mod chat_routes;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::chat_service::ChatService;
use chat_routes::{get_chat_handler, post_chat_handler};

pub fn router(svc: ChatService) -> Router {
    Router::new()
        .route("/chat/", get(get_chat_handler).post(post_chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(svc)
}
