use std::future::{ready, Ready};

use actix_identity::IdentityExt;
use actix_web::{dev::Payload, FromRequest, HttpRequest};

use crate::{errors::AppError, structs::UserId};

/// The authenticated caller. Extracting it fails with `Unauthorized` when no
/// identity is attached to the request.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub user_id: UserId,
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Not authenticated".to_owned())
}

fn session_from(req: &HttpRequest) -> Result<Session, AppError> {
    let identity = req.get_identity().map_err(|_| unauthorized())?;
    let id = identity.id().map_err(|e| {
        log::warn!("Unreadable identity: {}", e);
        unauthorized()
    })?;
    let user_id = id.parse().map_err(|_| {
        log::warn!("Identity is not a user id: {}", id);
        unauthorized()
    })?;
    Ok(Session { user_id })
}

impl FromRequest for Session {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_from(req))
    }
}
