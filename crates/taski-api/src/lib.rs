pub mod auth;
pub mod boards;
pub mod cards;
pub mod error;
pub mod lists;
pub mod middleware;
pub mod realtime;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};
use uuid::Uuid;

use taski_db::{Database, EntityKind};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::require_auth;

/// All REST and realtime routes. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/ws/boards/{board_id}", get(realtime::board_socket));

    let protected_routes = Router::new()
        .route("/boards", get(boards::list_boards).post(boards::create_board))
        .route(
            "/boards/{board_id}",
            get(boards::get_board).patch(boards::update_board).delete(boards::delete_board),
        )
        .route("/boards/{board_id}/members", post(boards::add_member))
        .route("/lists", get(lists::list_lists).post(lists::create_list))
        .route(
            "/lists/{list_id}",
            get(lists::get_list).patch(lists::update_list).delete(lists::delete_list),
        )
        .route("/cards", get(cards::list_cards).post(cards::create_card))
        .route(
            "/cards/{card_id}",
            get(cards::get_card).patch(cards::update_card).delete(cards::delete_card),
        )
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Entities on boards the user cannot see are reported as missing.
pub(crate) fn ensure_visible(
    db: &Database,
    user_id: Uuid,
    kind: EntityKind,
    id: i64,
    what: &'static str,
) -> Result<(), ApiError> {
    if db.can_access(user_id, kind, id)? {
        Ok(())
    } else {
        Err(ApiError::NotFound(what))
    }
}
