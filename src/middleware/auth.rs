use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Session, User},
    state::AppState,
};

pub const SESSION_HEADER: &str = "x-session-token";

/// A credential as presented by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Signed JWT carrying the session id in its `sid` claim.
    Bearer(String),
    /// Opaque session token.
    Session(String),
}

impl Credential {
    /// `Authorization: Bearer <jwt>`, `Authorization: Session <token>` or
    /// `X-Session-Token: <token>`, in that order.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if let Some(token) = strip_scheme(value, "Bearer") {
                return Some(Credential::Bearer(token.to_string()));
            }
            if let Some(token) = strip_scheme(value, "Session") {
                return Some(Credential::Session(token.to_string()));
            }
        }

        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Credential::Session(token.to_string()))
    }

    /// Query-string tokens (used by the socket endpoint) may be either kind;
    /// JWTs are recognised by their three dot-separated segments.
    pub fn from_query(token: &str) -> Self {
        if token.split('.').count() == 3 {
            Credential::Bearer(token.to_string())
        } else {
            Credential::Session(token.to_string())
        }
    }
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (given, rest) = value.split_once(' ')?;
    let token = rest.trim();
    (given.eq_ignore_ascii_case(scheme) && !token.is_empty()).then_some(token)
}

/// The signed-in caller. Extracting it rejects the request with 401 when the
/// credential is missing, invalid, expired, or belongs to an inactive or
/// locked account.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: Session,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = Credential::from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        authenticate(state, credential).await
    }
}

pub async fn authenticate(state: &AppState, credential: Credential) -> Result<AuthUser, ApiError> {
    let session = match credential {
        Credential::Bearer(token) => {
            let claims = state.tokens.verify_token(&token)?;
            let (user_id, session_id) = claims
                .user_id()
                .zip(claims.session_id())
                .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
            state
                .store
                .find_session(session_id)
                .await?
                .filter(|session| session.user_id == user_id)
        }
        Credential::Session(token) => state.store.find_session_by_token(&token).await?,
    };

    let session = match session {
        Some(session) if !session.is_expired() => session,
        _ => return Err(ApiError::unauthorized("Session expired or revoked")),
    };

    let user = match state.store.get_user(session.user_id).await {
        Ok(user) => user,
        Err(crate::store::StoreError::NotFound(_)) => {
            return Err(ApiError::unauthorized("Session expired or revoked"))
        }
        Err(err) => return Err(err.into()),
    };
    if !user.can_sign_in() {
        return Err(ApiError::unauthorized("Account is inactive or locked"));
    }

    Ok(AuthUser { user, session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    #[case(&[("authorization", "Bearer abc.def.ghi")], Some(Credential::Bearer("abc.def.ghi".into())))]
    #[case(&[("authorization", "bearer abc.def.ghi")], Some(Credential::Bearer("abc.def.ghi".into())))]
    #[case(&[("authorization", "Session tok")], Some(Credential::Session("tok".into())))]
    #[case(&[("x-session-token", " tok ")], Some(Credential::Session("tok".into())))]
    #[case(&[("authorization", "Basic dXNlcg=="), ("x-session-token", "tok")], Some(Credential::Session("tok".into())))]
    #[case(&[("authorization", "Bearer ")], None)]
    #[case(&[], None)]
    fn credentials_from_headers(
        #[case] pairs: &[(&'static str, &'static str)],
        #[case] expected: Option<Credential>,
    ) {
        assert_eq!(Credential::from_headers(&headers(pairs)), expected);
    }

    #[test]
    fn query_tokens_are_classified_by_shape() {
        assert_eq!(Credential::from_query("a.b.c"), Credential::Bearer("a.b.c".into()));
        assert_eq!(Credential::from_query("deadbeef"), Credential::Session("deadbeef".into()));
    }
}
