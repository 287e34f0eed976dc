//! Caller identity as forwarded by the upstream auth service.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use storage::models::VoteRole;

use crate::error::{WebError, WebResult};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Authenticated caller. The headers are trusted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
    pub role: Option<VoteRole>,
}

impl Caller {
    pub fn require_role(&self) -> WebResult<VoteRole> {
        self.role.ok_or_else(|| {
            WebError::BadRequest(format!("{} header is required", USER_ROLE_HEADER))
        })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER).ok_or(WebError::Unauthorized)?;
        let role = header_value(parts, USER_ROLE_HEADER)
            .map(str::parse::<VoteRole>)
            .transpose()?;

        Ok(Self {
            user_id: user_id.to_string(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Caller, WebError> {
        let (mut parts, _) = request.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_headers_are_read() {
        let request = Request::builder()
            .header("X-User-Id", "judge-7")
            .header("X-User-Role", "Judge")
            .body(())
            .unwrap();

        let caller = extract(request).await.unwrap();
        assert_eq!(caller.user_id, "judge-7");
        assert_eq!(caller.role, Some(VoteRole::Judge));
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(extract(request).await, Err(WebError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let request = Request::builder()
            .header("X-User-Id", "u1")
            .header("X-User-Role", "speaker")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(WebError::Storage(_))));
    }
}
