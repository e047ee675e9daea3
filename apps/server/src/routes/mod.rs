mod files;
mod identity;
mod secrets;

use crate::auth;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use keeper_kernel::server::system_router;
use tower_http::trace::TraceLayer;

pub(crate) fn init(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/credential", secrets::router(state.vault.credentials.clone()))
        .nest("/card", secrets::router(state.vault.cards.clone()))
        .nest("/text", secrets::router(state.vault.texts.clone()))
        .nest("/file", files::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .nest("/api", identity::router().merge(protected))
        .merge(system_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
