use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use taski_types::api::Claims;
use taski_types::models::Identity;

use crate::auth::AppState;
use crate::error::ApiError;

/// Validate a JWT and turn its claims into an identity.
pub fn decode_token(secret: &str, token: &str) -> Option<Identity> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    Some(Identity {
        user_id: token_data.claims.sub,
        username: token_data.claims.username,
    })
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve an identity from a `?token=` query value, falling back to the
/// Authorization header. WebSocket clients in browsers cannot set headers.
pub fn resolve_identity(secret: &str, query_token: Option<&str>, headers: &HeaderMap) -> Option<Identity> {
    query_token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(headers))
        .and_then(|token| decode_token(secret, token))
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let identity = decode_token(&state.jwt_secret, token).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use uuid::Uuid;

    use super::*;
    use crate::auth::create_token;

    #[test]
    fn token_round_trips_to_identity() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", 1, user_id, "alice").unwrap();

        let identity = decode_token("secret", &token).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");
        assert!(decode_token("other-secret", &token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token("secret", -2, Uuid::new_v4(), "alice").unwrap();
        assert!(decode_token("secret", &token).is_none());
    }

    #[test]
    fn query_token_wins_over_header() {
        let query_user = Uuid::new_v4();
        let header_user = Uuid::new_v4();
        let query = create_token("s", 1, query_user, "q").unwrap();
        let header = create_token("s", 1, header_user, "h").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", header)).unwrap(),
        );

        assert_eq!(resolve_identity("s", Some(&query), &headers).unwrap().user_id, query_user);
        assert_eq!(resolve_identity("s", None, &headers).unwrap().user_id, header_user);
        assert_eq!(resolve_identity("s", Some(""), &headers).unwrap().user_id, header_user);
        assert!(resolve_identity("s", None, &HeaderMap::new()).is_none());
        assert!(resolve_identity("s", Some("garbage"), &headers).is_none());
    }
}
