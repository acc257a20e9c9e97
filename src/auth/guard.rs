use serde::Serialize;
use std::sync::Arc;

use crate::auth::credentials::CredentialStore;
use crate::auth::token::{TokenCodec, TokenError};
use crate::db::models::User;
use crate::error::{AppError, AppResult, AuthFailure};

/// The identity bound to a request once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub public_id: String,
    pub name: String,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            public_id: user.public_id,
            name: user.name,
        }
    }
}

/// Single choke point turning a presented token into an identity.
#[derive(Clone)]
pub struct AuthGuard {
    tokens: Arc<TokenCodec>,
    credentials: CredentialStore,
}

impl AuthGuard {
    pub fn new(tokens: Arc<TokenCodec>, credentials: CredentialStore) -> Self {
        Self {
            tokens,
            credentials,
        }
    }

    /// Resolve `token` to a user or fail with `Unauthenticated`.
    pub fn authenticate(&self, token: Option<&str>) -> AppResult<CurrentUser> {
        let token = token.ok_or(AppError::Unauthenticated(AuthFailure::MissingToken))?;

        let public_id = self.tokens.verify(token).map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            AppError::Unauthenticated(match e {
                TokenError::Expired => AuthFailure::ExpiredToken,
                TokenError::Malformed => AuthFailure::InvalidToken,
            })
        })?;

        match self.credentials.find_by_public_id(&public_id)? {
            Some(user) => Ok(user.into()),
            None => {
                tracing::debug!("Session token for unknown user {}", public_id);
                Err(AppError::Unauthenticated(AuthFailure::UnknownUser))
            }
        }
    }

    /// Like `authenticate`, but any authentication failure means "anonymous".
    /// Storage failures still propagate.
    pub fn identify(&self, token: Option<&str>) -> AppResult<Option<CurrentUser>> {
        match self.authenticate(token) {
            Ok(user) => Ok(Some(user)),
            Err(AppError::Unauthenticated(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
