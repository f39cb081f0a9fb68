use std::sync::Arc;

use axum::{
    extract::{
        Path, Query, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use taski_gateway::connection::run_connection;
use taski_gateway::{AccessOracle, Rejected, Session};
use taski_types::models::BoardId;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::resolve_identity;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// `GET /ws/boards/{board_id}`. The session is authorized and joined to the
/// board before the upgrade is accepted; a rejected client never gets a
/// socket.
pub async fn board_socket(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = resolve_identity(&state.jwt_secret, query.token.as_deref(), &headers);
    let oracle: Arc<dyn AccessOracle> = state.db.clone();

    let session = match Session::connect(&state.registry, oracle, board_id, identity).await {
        Ok(session) => session,
        Err(rejected) => {
            warn!("Rejected realtime connection to board {}: {}", board_id, rejected);
            return rejection_response(rejected).into_response();
        }
    };

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| run_connection(socket, session)),
        // Dropping the session here leaves the board topic again.
        Err(e) => ApiError::Handshake {
            status: e.status(),
            reason: e.body_text(),
        }
        .into_response(),
    }
}

fn rejection_response(rejected: Rejected) -> ApiError {
    match rejected {
        Rejected::Unauthenticated => ApiError::Unauthorized,
        Rejected::Forbidden { .. } => ApiError::Forbidden,
        Rejected::Lookup(e) => ApiError::Internal(e),
    }
}
