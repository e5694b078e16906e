use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledger::{LedgerError, LoanError, PolicyError, ReceiptError, ReplayError, ScheduleError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] JsonRejection),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MalformedPayload(rejection) => rejection.status(),
            AppError::Ledger(error) => ledger_status(error),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Policy(PolicyError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        LedgerError::Policy(PolicyError::Document(_)) | LedgerError::Replay(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LedgerError::Policy(_) | LedgerError::Loan(_) | LedgerError::Schedule(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::Receipt(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

macro_rules! from_ledger {
    ($($error:ty),+) => {
        $(impl From<$error> for AppError {
            fn from(error: $error) -> Self {
                AppError::Ledger(error.into())
            }
        })+
    };
}

from_ledger!(PolicyError, ReplayError, ScheduleError, LoanError, ReceiptError);

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON: {error}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized("Could not validate credentials")
    }
}

#[cfg(test)]
mod tests {
    use ledger::PolicyStatus;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let transition = AppError::from(PolicyError::InvalidTransition {
            action: "submit",
            status: PolicyStatus::Active,
        });
        assert_eq!(transition.status(), StatusCode::CONFLICT);

        let invalid = AppError::from(PolicyError::Invalid("bad".into()));
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(AppError::NotFound("Policy").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound("Policy").to_string(), "Policy not found");
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = AppError::Internal("secret path".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
