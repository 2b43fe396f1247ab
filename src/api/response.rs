use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::books::RecordError;

// ============================================================================
// JSend status enum
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
}

// ============================================================================
// JSend fail envelope (client errors, 4xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
}

impl JSendFail {
    pub fn response(
        status_code: StatusCode,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendFail>) {
        (
            status_code,
            Json(JSendFail {
                data: FailData {
                    message: message.into(),
                },
                status: JSendStatus::Fail,
            }),
        )
    }
}

// ============================================================================
// JSend error envelope (server errors, 5xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

impl JSendError {
    pub fn response(
        status_code: StatusCode,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendError>) {
        (
            status_code,
            Json(JSendError {
                message: message.into(),
                status: JSendStatus::Error,
            }),
        )
    }
}

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A JSend-compatible error that can be either a fail (4xx) or error (5xx).
/// Used as the error type in handler Result returns.
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
    /// 401 with a `WWW-Authenticate: Bearer` challenge
    Unauthorized(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, msg) => JSendFail::response(code, msg).into_response(),
            ApiError::Error(code, msg) => JSendError::response(code, msg).into_response(),
            ApiError::Unauthorized(msg) => {
                let (status, json) = JSendFail::response(StatusCode::UNAUTHORIZED, msg);
                (status, [(header::WWW_AUTHENTICATE, "Bearer")], json).into_response()
            }
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        if status.is_client_error() {
            ApiError::Fail(status, message.into())
        } else {
            ApiError::Error(status, message.into())
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                ApiError::unauthorized(e.to_string())
            }
            AuthError::UsernameTaken
            | AuthError::EmailTaken
            | AuthError::InactiveAccount
            | AuthError::Validation(_) => ApiError::bad_request(e.to_string()),
            AuthError::Internal(cause) => {
                tracing::error!(error = %cause, "Auth operation failed");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NotFound(_) => ApiError::not_found(e.to_string()),
            RecordError::BackendUnavailable(cause) => {
                tracing::error!(error = %cause, "Book service call failed");
                ApiError::internal("Book service error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::from_status(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::from_status(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::from_status(rejection.status(), rejection.body_text())
    }
}

// ============================================================================
// Extractors that reject with a JSend body
// ============================================================================

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct AppForm<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_fail_envelope() {
        let response = ApiError::not_found("Book with ID 7 not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "fail", "data": {"message": "Book with ID 7 not found"}})
        );
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError::internal("Book service error").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "error", "message": "Book service error"})
        );
    }

    #[tokio::test]
    async fn test_unauthorized_carries_challenge() {
        let response = ApiError::from(AuthError::Unauthenticated).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(
            body_json(response).await["data"]["message"],
            "Could not validate credentials"
        );
    }

    #[test]
    fn test_auth_error_mapping() {
        assert!(matches!(
            ApiError::from(AuthError::InvalidCredentials),
            ApiError::Unauthorized(ref m) if m == "Incorrect username or password"
        ));
        assert!(matches!(
            ApiError::from(AuthError::InactiveAccount),
            ApiError::Fail(StatusCode::BAD_REQUEST, ref m) if m == "Inactive user"
        ));
        assert!(matches!(
            ApiError::from(AuthError::UsernameTaken),
            ApiError::Fail(StatusCode::BAD_REQUEST, ref m) if m == "Username already registered"
        ));
        assert!(matches!(
            ApiError::from(AuthError::Internal("disk on fire".to_string())),
            ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, ref m) if m == "Internal server error"
        ));
    }

    #[test]
    fn test_record_error_mapping_hides_cause() {
        assert!(matches!(
            ApiError::from(RecordError::NotFound(999999)),
            ApiError::Fail(StatusCode::NOT_FOUND, ref m) if m == "Book with ID 999999 not found"
        ));
        assert!(matches!(
            ApiError::from(RecordError::BackendUnavailable("connection refused".to_string())),
            ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, ref m) if m == "Book service error"
        ));
    }
}
