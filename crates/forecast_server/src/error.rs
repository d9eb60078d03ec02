//! HTTP-facing error taxonomy.
//!
//! Every [`forecast_core`] error type and every server-local failure mode
//! (task lookup, queue backpressure, persistence) funnels through
//! [`ApiError`], whose single [`IntoResponse`] impl is the one place that
//! maps an error kind to a status code, with the rule that database
//! errors never leak their detail to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use forecast_core::error::{ForecastError, OptimizeError, PortfolioError, SequencingError};

use crate::tasks::TaskError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid simulation configuration")]
    ConfigInvalid(Vec<(String, String)>),

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("task queue is over capacity ({pending} pending, high-water mark {high_water})")]
    Overloaded { pending: usize, high_water: usize },

    #[error("n_simulations {n} exceeds the synchronous cap of {cap}; use the async endpoint")]
    PayloadTooLarge { n: usize, cap: usize },

    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("portfolio not found: {0}")]
    PortfolioNotFound(i64),

    #[error("project not found: {0}")]
    ProjectNotFound(i64),

    #[error("forecast not found: {0}")]
    ForecastNotFound(i64),

    #[error("dependency cycle detected among portfolio projects")]
    DependencyCycle,

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error")]
    Internal,
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::ConfigInvalid(violations) => ApiError::ConfigInvalid(
                violations
                    .into_iter()
                    .map(|v| (v.field.to_string(), v.reason))
                    .collect(),
            ),
            ForecastError::Sampler(e) => ApiError::ConfigInvalid(vec![("tp_samples".into(), e.to_string())]),
            ForecastError::Cancelled => ApiError::Internal,
        }
    }
}

impl From<SequencingError> for ApiError {
    fn from(err: SequencingError) -> Self {
        match err {
            SequencingError::NoSequenceableProjects => {
                ApiError::ConfigInvalid(vec![("portfolio_projects".into(), err.to_string())])
            }
            SequencingError::DependencyCycle(_) => ApiError::DependencyCycle,
        }
    }
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::NoProjects => {
                ApiError::ConfigInvalid(vec![("projects".into(), err.to_string())])
            }
            PortfolioError::Forecast(e) => e.into(),
            PortfolioError::Sequencing(e) => e.into(),
        }
    }
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        match err {
            OptimizeError::NoCandidates => {
                ApiError::ConfigInvalid(vec![("candidates".into(), err.to_string())])
            }
            OptimizeError::Infeasible { binding_constraint } => {
                ApiError::Infeasible(binding_constraint)
            }
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(id) => ApiError::TaskNotFound(id),
            TaskError::Overloaded { pending, high_water } => {
                ApiError::Overloaded { pending, high_water }
            }
            TaskError::WorkerPanic(msg) => {
                tracing::error!(error = %msg, "task worker panicked");
                ApiError::Internal
            }
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        tracing::error!(error = %err, "database error");
        match err {
            rusqlite::Error::QueryReturnedNoRows => ApiError::Internal,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ApiError::ConfigInvalid(vec![("_".into(), "violates a uniqueness or foreign-key constraint".into())])
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ApiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::ConfigInvalid(details) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error_kind": "ConfigInvalid",
                    "message": self.to_string(),
                    "details": details.iter().map(|(field, reason)| json!({"field": field, "reason": reason})).collect::<Vec<_>>(),
                }),
            ),
            ApiError::TaskNotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({"error_kind": "TaskNotFound", "message": self.to_string(), "details": []}),
            ),
            ApiError::Overloaded { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error_kind": "Overloaded", "message": self.to_string(), "details": []}),
            ),
            ApiError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({"error_kind": "PayloadTooLarge", "message": self.to_string(), "details": []}),
            ),
            ApiError::Infeasible(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error_kind": "Infeasible", "message": self.to_string(), "details": []}),
            ),
            ApiError::PortfolioNotFound(_) | ApiError::ProjectNotFound(_) | ApiError::ForecastNotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({"error_kind": "NotFound", "message": self.to_string(), "details": []}),
            ),
            ApiError::DependencyCycle => (
                StatusCode::BAD_REQUEST,
                json!({"error_kind": "ConfigInvalid", "message": self.to_string(), "details": []}),
            ),
            ApiError::Database(_) | ApiError::Serialization(_) | ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error_kind": "InternalError", "message": "internal server error", "details": []}),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
