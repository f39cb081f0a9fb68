use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use taski_db::EntityKind;
use taski_types::api::{CreateListRequest, ListDetail, UpdateListRequest};
use taski_types::models::{Identity, ListId};

use crate::auth::AppState;
use crate::ensure_visible;
use crate::error::{ApiError, blocking};

pub async fn list_lists(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let lists = blocking(move || Ok(state.db.lists_for_user(identity.user_id)?)).await?;
    Ok(Json(lists))
}

pub async fn create_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if req.position.is_some_and(|p| p < 0) {
        return Err(ApiError::BadRequest("position must be positive".into()));
    }

    let list = blocking(move || {
        if state.db.get_board(req.board)?.is_none() {
            return Err(ApiError::NotFound("board"));
        }
        if !state.db.can_access(identity.user_id, EntityKind::Board, req.board)? {
            return Err(ApiError::Forbidden);
        }
        state
            .db
            .create_list(req.board, &title, req.position, &state.broadcaster)?
            .ok_or(ApiError::NotFound("board"))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<ListId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::List, list_id, "list")?;
        let list = state.db.get_list(list_id)?.ok_or(ApiError::NotFound("list"))?;
        let cards = state.db.cards_for_list(list_id)?;
        Ok(ListDetail { list, cards })
    })
    .await?;

    Ok(Json(detail))
}

pub async fn update_list(
    State(state): State<AppState>,
    Path(list_id): Path<ListId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.map(|t| t.trim().to_string());
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    if req.position.is_some_and(|p| p < 0) {
        return Err(ApiError::BadRequest("position must be positive".into()));
    }

    let list = blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::List, list_id, "list")?;
        state
            .db
            .update_list(list_id, title.as_deref(), req.position, &state.broadcaster)?
            .ok_or(ApiError::NotFound("list"))
    })
    .await?;

    Ok(Json(list))
}

pub async fn delete_list(
    State(state): State<AppState>,
    Path(list_id): Path<ListId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::List, list_id, "list")?;
        if !state.db.delete_list(list_id, &state.broadcaster)? {
            return Err(ApiError::NotFound("list"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
