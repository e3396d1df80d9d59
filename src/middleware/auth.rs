use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::domain::actor::Actor;
use crate::error::AppError;

/// Claims of the HS256 tokens this service accepts. Tokens are issued elsewhere.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    /// Informational only; the stored role is authoritative.
    pub role: String,
    /// Expiration (unix seconds).
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i32, AppError> {
        self.sub
            .parse::<i32>()
            .map_err(|_| AppError::Unauthorized("Invalid user ID format in token".to_string()))
    }
}

/// Actors keyed by user id, dropped after the configured TTL or on approval changes.
pub type ActorCache = Arc<Cache<i32, Actor>>;

pub fn create_actor_cache(ttl: Duration) -> ActorCache {
    Arc::new(Cache::builder().time_to_live(ttl).max_capacity(10_000).build())
}

/// The only route an unapproved account may call.
fn open_to_unapproved(req: &Request<Body>) -> bool {
    req.method() == Method::GET && req.uri().path() == "/accounts/me"
}

/// Verifies the bearer token and attaches the stored [`Actor`] to the request.
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized("Invalid token format (missing 'Bearer ' prefix)".to_string())
        })?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!(error = %e, "JWT decoding failed");
        AppError::Unauthorized("Invalid token".to_string())
    })?
    .claims;
    let user_id = claims.user_id()?;

    let actor = match state.actor_cache.get(&user_id) {
        Some(actor) => actor,
        None => {
            let user = state
                .store
                .get_user(user_id)
                .await?
                .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
            let actor = Actor::from(&user);
            state.actor_cache.insert(user_id, actor.clone());
            actor
        }
    };

    if !actor.is_approved && !open_to_unapproved(&req) {
        debug!(user_id, "unapproved account blocked");
        return Err(AppError::forbidden("Your account is awaiting approval"));
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
