use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use keeper_kernel::{KeeperError, RequestContext};
use tracing::debug;

/// Cookie that carries the session token.
pub(crate) const TOKEN_COOKIE: &str = "jwt";

/// Resolves the caller from the `jwt` cookie or a bearer token and stores the
/// [`Principal`](keeper_domain::identity::Principal) in the request extensions.
pub(crate) async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, KeeperError> {
    let Some(token) = cookie_token(request.headers()).or_else(|| bearer_token(request.headers())) else {
        debug!(path = %request.uri().path(), "Request without token");
        return Err(KeeperError::unauthorized("authentication required"));
    };

    let mut ctx = RequestContext::anonymous();
    let principal = state.sessions.parse_token(&mut ctx, &token).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// `Set-Cookie` value for a freshly issued token.
pub(crate) fn token_cookie(token: &str) -> Result<HeaderValue, KeeperError> {
    HeaderValue::from_str(&format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"))
        .map_err(|_| KeeperError::internal("token is not a valid header value"))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_owned())
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_owned())
}
