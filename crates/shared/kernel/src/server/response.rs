use crate::error::{ErrorKind, KeeperError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keeper_domain::file::ErrorMessage;
use tracing::error;

const GENERIC_FAILURE: &str = "internal server error";

impl ErrorKind {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Validation | Self::Transport => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateLogin | Self::Conflict => StatusCode::CONFLICT,
            Self::Crypto | Self::Storage | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KeeperError {
    fn into_response(self) -> Response {
        let status = self.kind().status();
        let message = if self.is_client_error() {
            self.message().to_owned()
        } else {
            error!(error = %self, "Request failed");
            GENERIC_FAILURE.to_owned()
        };

        (status, Json(ErrorMessage { message, status_code: status.as_u16() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: KeeperError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 4096).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn conflict_keeps_its_message() {
        let (status, body) =
            body_of(KeeperError::conflict("the versions on the server and client do not match")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status_code"], 409);
        assert_eq!(body["message"], "the versions on the server and client do not match");
    }

    #[tokio::test]
    async fn server_failures_are_generic() {
        let (status, body) = body_of(KeeperError::crypto("aead tag mismatch for key 0xdeadbeef")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], GENERIC_FAILURE);
    }

    #[test]
    fn status_table() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::DuplicateLogin.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::Storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
