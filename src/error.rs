use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No provider available for {0}")]
    NoProviderAvailable(String),

    #[error("Provider communication error: {0}")]
    ProviderCommunication(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Reconciliation anomaly: {0}")]
    ReconciliationAnomaly(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoProviderAvailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderCommunication(_) => StatusCode::BAD_GATEWAY,
            AppError::SignatureVerification(_) => StatusCode::UNAUTHORIZED,
            AppError::ReconciliationAnomaly(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(e: crate::store::StoreError) -> Self {
        match e {
            crate::store::StoreError::NotFound(r) => AppError::NotFound(r),
            crate::store::StoreError::DuplicateTxRef(r) => {
                AppError::Validation(format!("duplicate attempt: {}", r))
            }
            other => AppError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("amount must be positive".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_provider_status_code() {
        let error = AppError::NoProviderAvailable("CI/XOF/card".to_string());
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_signature_error_status_code() {
        let error = AppError::SignatureVerification("bad hmac".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_provider_communication_status_code() {
        let error = AppError::ProviderCommunication("timeout".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_not_found_status_code() {
        let error = AppError::NotFound("tx".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = AppError::Validation("bad currency".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
