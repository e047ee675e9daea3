use crate::context::RequestContext;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keeper_domain::identity::Principal;
use std::convert::Infallible;

/// Builds the request scope from the [`Principal`] the auth layer stored in
/// the request extensions. Without one the context is anonymous and services
/// reject it themselves.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Principal>().cloned().map_or_else(Self::anonymous, Self::authenticated))
    }
}
