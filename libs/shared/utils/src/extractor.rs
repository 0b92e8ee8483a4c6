use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{typed_header::TypedHeaderRejection, TypedHeader};
use headers::{authorization::Bearer, Authorization};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the caller in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth.map_err(|e| {
        if e.is_missing() {
            AppError::Auth("Missing authorization header".to_string())
        } else {
            AppError::Auth("Invalid authorization header format".to_string())
        }
    })?;

    let user = validate_token(auth.token(), &config.jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// The authenticated caller as the scheduling engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Caller {
    pub fn from_user(user: &User) -> Result<Self, AppError> {
        let id = user
            .user_id()
            .ok_or_else(|| AppError::Auth("Subject is not a valid identifier".to_string()))?;
        let role = user
            .actor_role()
            .ok_or_else(|| AppError::Auth("Unrecognised role".to_string()))?;
        Ok(Self { id, role })
    }

    pub fn require_privileged(&self) -> Result<(), AppError> {
        if self.role.is_privileged() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} may not perform this operation",
                self.role
            )))
        }
    }
}
