pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod review;
pub mod services;
pub mod totals;

use crate::state::AppState;
use axum::Router;

pub fn router(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::review_routes())
        .merge(handlers::analyze_routes(max_image_bytes))
}
