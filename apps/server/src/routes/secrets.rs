//! One route set for every secret kind.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use keeper_domain::secret::{Revision, Secret, SecretId};
use keeper_kernel::{KeeperError, RequestContext};
use keeper_vault::{SecretKind, VaultService};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(super) fn router<K, S>(service: VaultService<K>) -> Router<S>
where
    K: SecretKind,
    K::Payload: Serialize + DeserializeOwned,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list::<K>).post(create::<K>).put(update::<K>))
        .route("/{id}", get(fetch::<K>).put(update_at::<K>).delete(remove::<K>))
        .with_state(service)
}

async fn list<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
) -> Result<Json<Vec<Secret<K::Payload>>>, KeeperError>
where
    K::Payload: Serialize,
{
    Ok(Json(service.list(&mut ctx).await?))
}

async fn create<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
    Json(payload): Json<K::Payload>,
) -> Result<(StatusCode, Json<Secret<K::Payload>>), KeeperError>
where
    K::Payload: Serialize + DeserializeOwned,
{
    Ok((StatusCode::CREATED, Json(service.create(&mut ctx, payload).await?)))
}

async fn fetch<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
    Path(id): Path<SecretId>,
) -> Result<Json<Secret<K::Payload>>, KeeperError>
where
    K::Payload: Serialize,
{
    Ok(Json(service.get(&mut ctx, id).await?))
}

async fn update<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
    Json(revision): Json<Revision<K::Payload>>,
) -> Result<Json<Secret<K::Payload>>, KeeperError>
where
    K::Payload: Serialize + DeserializeOwned,
{
    Ok(Json(service.update(&mut ctx, revision).await?))
}

/// `PUT /{id}`: the path id wins over any id in the body.
async fn update_at<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
    Path(id): Path<SecretId>,
    Json(mut revision): Json<Revision<K::Payload>>,
) -> Result<Json<Secret<K::Payload>>, KeeperError>
where
    K::Payload: Serialize + DeserializeOwned,
{
    revision.id = id;
    Ok(Json(service.update(&mut ctx, revision).await?))
}

async fn remove<K: SecretKind>(
    State(service): State<VaultService<K>>,
    mut ctx: RequestContext,
    Path(id): Path<SecretId>,
) -> Result<StatusCode, KeeperError> {
    service.delete(&mut ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
