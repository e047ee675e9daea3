use crate::state::AppState;
use crate::ws::SocketTransport;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use keeper_domain::file::{BinaryFile, FileId};
use keeper_kernel::{KeeperError, RequestContext};
use tracing::debug;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/upload", get(upload))
        .route("/download", get(download))
        .route("/{id}", get(fetch).delete(remove))
}

async fn list(State(state): State<AppState>, mut ctx: RequestContext) -> Result<Json<Vec<BinaryFile>>, KeeperError> {
    Ok(Json(state.files.list(&mut ctx).await?))
}

async fn fetch(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(id): Path<FileId>,
) -> Result<Json<BinaryFile>, KeeperError> {
    Ok(Json(state.files.get(&mut ctx, id).await?))
}

async fn remove(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(id): Path<FileId>,
) -> Result<StatusCode, KeeperError> {
    state.files.delete(&mut ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// The engine closes the socket with the failure reason and logs server faults.
async fn upload(State(state): State<AppState>, ctx: RequestContext, socket: WebSocketUpgrade) -> Response {
    socket.on_upgrade(move |socket| async move {
        let mut ctx = ctx;
        let mut transport = SocketTransport::new(socket);
        if let Err(err) = state.transfers.upload(&mut ctx, &mut transport).await {
            debug!(error = %err, "Upload socket closed with an error");
        }
    })
}

async fn download(State(state): State<AppState>, ctx: RequestContext, socket: WebSocketUpgrade) -> Response {
    socket.on_upgrade(move |socket| async move {
        let mut ctx = ctx;
        let mut transport = SocketTransport::new(socket);
        if let Err(err) = state.transfers.download(&mut ctx, &mut transport).await {
            debug!(error = %err, "Download socket closed with an error");
        }
    })
}
