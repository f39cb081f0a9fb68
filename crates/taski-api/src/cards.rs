use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use taski_db::EntityKind;
use taski_db::models::{CardChanges, NewCard};
use taski_types::api::{CreateCardRequest, UpdateCardRequest};
use taski_types::models::{CardId, Identity};

use crate::auth::AppState;
use crate::ensure_visible;
use crate::error::{ApiError, blocking};

pub async fn list_cards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let cards = blocking(move || Ok(state.db.cards_for_user(identity.user_id)?)).await?;
    Ok(Json(cards))
}

pub async fn create_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if req.position.is_some_and(|p| p < 0) {
        return Err(ApiError::BadRequest("position must be positive".into()));
    }

    let user_id = identity.user_id;
    let card = blocking(move || {
        if state.db.get_list(req.list)?.is_none() {
            return Err(ApiError::NotFound("list"));
        }
        if !state.db.can_access(user_id, EntityKind::List, req.list)? {
            return Err(ApiError::Forbidden);
        }
        if let Some(assignee) = req.assigned_to {
            if state.db.get_user(assignee)?.is_none() {
                return Err(ApiError::BadRequest("assigned user does not exist".into()));
            }
        }

        let new = NewCard {
            list_id: req.list,
            title,
            description: req.description,
            position: req.position,
            due_date: req.due_date,
            priority: req.priority,
            assigned_to: req.assigned_to,
            created_by: user_id,
        };
        state
            .db
            .create_card(new, &state.broadcaster)?
            .ok_or(ApiError::NotFound("list"))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<CardId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let card = blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::Card, card_id, "card")?;
        state.db.get_card(card_id)?.ok_or(ApiError::NotFound("card"))
    })
    .await?;

    Ok(Json(card))
}

/// Partial update. `"list"` moves the card; the destination must be on a
/// board the caller can see as well.
pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<CardId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.map(|t| t.trim().to_string());
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    if req.position.is_some_and(|p| p < 0) {
        return Err(ApiError::BadRequest("position must be positive".into()));
    }

    let user_id = identity.user_id;
    let card = blocking(move || {
        ensure_visible(&state.db, user_id, EntityKind::Card, card_id, "card")?;
        if let Some(list_id) = req.list {
            ensure_visible(&state.db, user_id, EntityKind::List, list_id, "list")?;
        }
        if let Some(Some(assignee)) = req.assigned_to {
            if state.db.get_user(assignee)?.is_none() {
                return Err(ApiError::BadRequest("assigned user does not exist".into()));
            }
        }

        let changes = CardChanges {
            title,
            description: req.description,
            list_id: req.list,
            position: req.position,
            due_date: req.due_date,
            priority: req.priority,
            assigned_to: req.assigned_to,
        };
        state
            .db
            .update_card(card_id, changes, &state.broadcaster)?
            .ok_or(ApiError::NotFound("card"))
    })
    .await?;

    Ok(Json(card))
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<CardId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        ensure_visible(&state.db, identity.user_id, EntityKind::Card, card_id, "card")?;
        if !state.db.delete_card(card_id, &state.broadcaster)? {
            return Err(ApiError::NotFound("card"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
