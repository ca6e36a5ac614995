use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use forum_crypto::TokenIssuer;
use forum_db::UserRepo;
use forum_types::models::PublicUser;

use crate::AppState;
use crate::error::ApiError;

/// Who is making the current request, if anyone. Always present as a request
/// extension once `soft_auth` has run.
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<PublicUser>);

impl Identity {
    /// The authenticated user, or 401 for operations that need one.
    pub fn require(&self) -> Result<&PublicUser, ApiError> {
        self.0.as_ref().ok_or(ApiError::Unauthorized)
    }
}

/// Resolve the caller from an Authorization header value. Accepts
/// `Bearer <token>` or a bare token. Every failure resolves to anonymous.
pub async fn resolve_identity(
    header: Option<&str>,
    tokens: &TokenIssuer,
    users: &dyn UserRepo,
) -> Option<PublicUser> {
    let Some(raw) = header else {
        debug!("No Authorization header, continuing anonymously");
        return None;
    };
    let raw = raw.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        debug!("Empty Authorization header, continuing anonymously");
        return None;
    }

    let user_id = match tokens.verify(token) {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!("Ignoring token: {}", e);
            return None;
        }
    };

    match users.get_user_by_id(user_id).await {
        Ok(user) => Some(user),
        Err(e) => {
            debug!("Token user {} could not be resolved: {}", user_id, e);
            None
        }
    }
}

/// Attach an [`Identity`] to every request. Never rejects; handlers decide
/// whether anonymity is acceptable.
pub async fn soft_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let lookup = resolve_identity(
        header.as_deref(),
        &state.tokens,
        state.storage.users.as_ref(),
    );
    let user = match tokio::time::timeout(state.storage_timeout, lookup).await {
        Ok(user) => user,
        Err(_) => {
            warn!("Identity lookup exceeded {:?}, continuing anonymously", state.storage_timeout);
            None
        }
    };

    req.extensions_mut().insert(Identity(user));
    next.run(req).await
}
