use crate::auth::token_cookie;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use keeper_domain::identity::{LoginRequest, TokenResponse};
use keeper_kernel::{KeeperError, RequestContext};

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/signup", post(signup)).route("/signin", post(signin))
}

/// Registers the user and signs them in right away.
async fn signup(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<LoginRequest>,
) -> Result<Response, KeeperError> {
    state.sessions.create_user(&mut ctx, &request).await?;
    let token = state.sessions.create_token(&mut ctx, &request).await?;
    issued(token)
}

async fn signin(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Json(request): Json<LoginRequest>,
) -> Result<Response, KeeperError> {
    let token = state.sessions.create_token(&mut ctx, &request).await?;
    issued(token)
}

fn issued(token: String) -> Result<Response, KeeperError> {
    let cookie = token_cookie(&token)?;
    Ok(([(SET_COOKIE, cookie)], Json(TokenResponse { token })).into_response())
}
