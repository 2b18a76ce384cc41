//! Authentication middleware
//!
//! Validates the bearer JWT issued by the session service and turns its claims
//! into an [`AuthContext`] that every protected handler receives explicitly.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Permission names checked by the services
pub mod permissions {
    pub const DOCUMENT_READ: &str = "document:read";
    pub const DOCUMENT_WRITE: &str = "document:write";
    pub const OPNAME_WRITE: &str = "opname:write";
    pub const OPNAME_CONFIRM: &str = "opname:confirm";
    pub const TRANSMISSION_READ: &str = "transmission:read";
    pub const TRANSMISSION_SEND: &str = "transmission:send";
    pub const REPORT_READ: &str = "report:read";
}

/// Role that is granted every permission
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated caller, scoped to one company
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub company_code: String,
    pub role: String,
    pub permissions: Vec<String>,
}

impl AuthContext {
    /// Check if the caller has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role == ADMIN_ROLE || self.permissions.iter().any(|p| p == permission)
    }

    /// Fail with an authorization error unless the permission is held
    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions(permission.to_string()))
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub company_code: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        AuthContext {
            user_id: claims.sub,
            company_code: claims.company_code,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response();
        }
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    if claims.company_code.trim().is_empty() {
        return AppError::Unauthorized("Token carries no company".to_string()).into_response();
    }

    request.extensions_mut().insert(AuthContext::from(claims));

    next.run(request).await
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".to_string()),
        _ => AppError::Unauthorized(format!("Invalid token: {}", e)),
    })
}

/// Extractor for the authenticated caller
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthContext);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
