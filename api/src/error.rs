use application::{ApplicationError, SearchBackendError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
};
use domain::ENTITY_NAME;
use serde::Serialize;
use tracing::{error, warn};

use crate::alerts::AlertHeaders;

/// JSON body of every error response.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub title: String,
    pub status: u16,
    pub entity_name: &'static str,
    pub error_key: &'static str,
    pub message: String,
}

/// Helper function to map ApplicationError enum to HTTP status codes, alert
/// headers and response body.
pub fn map_application_error_to_response(alerts: &AlertHeaders, err: ApplicationError) -> Response {
    let key = err.error_key();
    let (status, title) = match &err {
        ApplicationError::IdAlreadySet
        | ApplicationError::IdMissing
        | ApplicationError::IdMismatch { .. }
        | ApplicationError::UpdateTargetNotFound(_)
        | ApplicationError::InvalidInput(_) => {
            warn!("Rejected request: {}", err);
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            (StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        ApplicationError::Search(SearchBackendError::MalformedQuery(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        ApplicationError::Search(SearchBackendError::Unavailable(msg)) => {
            error!("Search backend unavailable: {}", msg);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "The search index is unavailable".to_string(),
            )
        }
        ApplicationError::IndexError { target, source } => {
            error!(index_target = %target, "Indexing error: {}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Updating the search index failed".to_string(),
            )
        }
        ApplicationError::InfrastructureError(msg) => {
            error!("Underlying infrastructure error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
    };

    let body = ErrorBody {
        title,
        status: status.as_u16(),
        entity_name: ENTITY_NAME,
        error_key: key,
        message: format!("error.{}", key),
    };
    (status, alerts.failure(key), JsonResponse(body)).into_response()
}
