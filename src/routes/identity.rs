//! Caller identification for game routes.
//!
//! Players are identified by a `x-user-id` header carrying a UUID. There is
//! no credential check behind it; the header only names who is acting.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// Header naming the acting user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a game route runs.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::Unauthorized(format!("{USER_ID_HEADER} is not a UUID")))?;

        Ok(Self(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AuthenticatedUser, AppError> {
        let (mut parts, ()) = request.into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn header_with_a_uuid_is_accepted() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(USER_ID_HEADER, id.to_string())
            .body(())
            .unwrap();

        let user = extract(request).await.unwrap();
        assert_eq!(user.0, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_rejected() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(
            extract(request).await.unwrap_err(),
            AppError::Unauthorized(_)
        ));

        let request = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await.unwrap_err(),
            AppError::Unauthorized(_)
        ));
    }
}
