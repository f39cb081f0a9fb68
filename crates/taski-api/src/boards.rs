use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use taski_db::EntityKind;
use taski_types::api::{AddMemberRequest, BoardDetail, CreateBoardRequest, ListDetail, UpdateBoardRequest};
use taski_types::models::{BoardId, Identity};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::ensure_visible;

pub async fn list_boards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let boards = blocking(move || Ok(state.db.boards_for_user(identity.user_id)?)).await?;
    Ok(Json(boards))
}

pub async fn create_board(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }

    let owner = identity.user_id;
    let board = blocking(move || {
        Ok(state
            .db
            .create_board(owner, &title, &req.description, &state.broadcaster)?)
    })
    .await?;

    info!("{} created board {}", identity.username, board.id);
    Ok((StatusCode::CREATED, Json(board)))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::Board, board_id, "board")?;
        let board = state.db.get_board(board_id)?.ok_or(ApiError::NotFound("board"))?;

        let mut lists = Vec::new();
        for list in state.db.lists_for_board(board_id)? {
            let cards = state.db.cards_for_list(list.id)?;
            lists.push(ListDetail { list, cards });
        }
        Ok(BoardDetail { board, lists })
    })
    .await?;

    Ok(Json(detail))
}

pub async fn update_board(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.map(|t| t.trim().to_string());
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }

    let board = blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::Board, board_id, "board")?;
        state
            .db
            .update_board(board_id, title.as_deref(), req.description.as_deref(), &state.broadcaster)?
            .ok_or(ApiError::NotFound("board"))
    })
    .await?;

    Ok(Json(board))
}

/// Only the owner may delete a board. Everything on it goes with it.
pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    blocking(move || {
        ensure_visible(&state.db, user_id, EntityKind::Board, board_id, "board")?;
        if !state.db.is_board_owner(user_id, board_id)? {
            return Err(ApiError::Forbidden);
        }
        if !state.db.delete_board(board_id, &state.broadcaster)? {
            return Err(ApiError::NotFound("board"));
        }
        Ok(())
    })
    .await?;

    info!("{} deleted board {}", identity.username, board_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(board_id): Path<BoardId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = req.user_id;
    blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::Board, board_id, "board")?;
        if state.db.get_user(member)?.is_none() {
            return Err(ApiError::NotFound("user"));
        }
        state
            .db
            .add_member(board_id, member, &state.broadcaster)?
            .ok_or(ApiError::NotFound("board"))
    })
    .await?;

    info!("Added {} to board {}", member, board_id);
    Ok(Json(json!({ "status": "member added" })))
}
