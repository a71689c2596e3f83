use application::{ApplicationError, MirrorStatus, MirroredWrite};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Json as JsonResponse, Response},
};
use domain::{OperationId, OperationPayload};
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::map_application_error_to_response;
use crate::pagination::{PageParams, pagination_headers};

pub const OPERATIONS_PATH: &str = "/api/operations";

// --- Operation Handlers ---

/// Handler for creating an operation (POST /api/operations).
pub async fn create_operation_handler(
    State(state): State<AppState>,
    payload: Result<Json<OperationPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject(&state, rejection.body_text()),
    };
    info!("Received request to create operation");
    match state.operation_service.create(payload).await {
        Ok(written) => {
            let id = written.operation.id();
            info!(id = %id, "Operation created successfully via handler");
            let mut headers = state.alerts.created(id);
            if let Ok(location) = HeaderValue::from_str(&format!("{}/{}", OPERATIONS_PATH, id)) {
                headers.insert(header::LOCATION, location);
            }
            written_response(&state, StatusCode::CREATED, headers, written)
        }
        Err(e) => {
            error!("Failed to create operation via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for replacing an operation (PUT /api/operations/:id).
pub async fn update_operation_handler(
    State(state): State<AppState>,
    id: Result<Path<OperationId>, PathRejection>,
    payload: Result<Json<OperationPayload>, JsonRejection>,
) -> Response {
    let (id, payload) = match (id, payload) {
        (Ok(Path(id)), Ok(Json(payload))) => (id, payload),
        (Err(rejection), _) => return reject(&state, rejection.body_text()),
        (_, Err(rejection)) => return reject(&state, rejection.body_text()),
    };
    info!(id = %id, "Received request to update operation");
    match state.operation_service.update(id, payload).await {
        Ok(written) => {
            info!(id = %id, "Operation updated successfully via handler");
            let headers = state.alerts.updated(id);
            written_response(&state, StatusCode::OK, headers, written)
        }
        Err(e) => {
            error!(id = %id, "Failed to update operation via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for merging fields into an operation (PATCH /api/operations/:id).
/// Accepts `application/json` and `application/merge-patch+json` bodies.
pub async fn partial_update_operation_handler(
    State(state): State<AppState>,
    id: Result<Path<OperationId>, PathRejection>,
    patch: Result<Json<OperationPayload>, JsonRejection>,
) -> Response {
    let (id, patch) = match (id, patch) {
        (Ok(Path(id)), Ok(Json(patch))) => (id, patch),
        (Err(rejection), _) => return reject(&state, rejection.body_text()),
        (_, Err(rejection)) => return reject(&state, rejection.body_text()),
    };
    info!(id = %id, "Received request to partially update operation");
    match state.operation_service.partial_update(id, patch).await {
        Ok(written) => {
            info!(id = %id, "Operation patched successfully via handler");
            let headers = state.alerts.updated(id);
            written_response(&state, StatusCode::OK, headers, written)
        }
        Err(e) => {
            error!(id = %id, "Failed to partially update operation via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for listing operations (GET /api/operations?page=&size=&sort=&eagerload=).
pub async fn list_operations_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let params = match PageParams::from_query(uri.query(), &state.config) {
        Ok(params) => params,
        Err(e) => return map_application_error_to_response(&state.alerts, e),
    };
    info!(
        page = params.page.page(),
        size = params.page.size(),
        relations = ?params.relations,
        "Received request to list operations"
    );
    match state
        .operation_service
        .list(params.page, params.sort, params.relations)
        .await
    {
        Ok(page) => {
            let headers = pagination_headers(&uri, &page);
            (StatusCode::OK, headers, JsonResponse(page.content)).into_response()
        }
        Err(e) => {
            error!("Failed to list operations via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for reading one operation (GET /api/operations/:id).
pub async fn get_operation_handler(
    State(state): State<AppState>,
    id: Result<Path<OperationId>, PathRejection>,
) -> Response {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => return reject(&state, rejection.body_text()),
    };
    info!(id = %id, "Received request to get operation");
    match state.operation_service.get(id).await {
        Ok(operation) => (StatusCode::OK, JsonResponse(operation)).into_response(),
        Err(e) => {
            warn!(id = %id, "Failed to get operation via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for deleting an operation (DELETE /api/operations/:id).
/// Answers 204 whether or not the record existed.
pub async fn delete_operation_handler(
    State(state): State<AppState>,
    id: Result<Path<OperationId>, PathRejection>,
) -> Response {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => return reject(&state, rejection.body_text()),
    };
    info!(id = %id, "Received request to delete operation");
    match state.operation_service.delete(id).await {
        Ok(mirror) => {
            info!(id = %id, "Operation deleted successfully via handler");
            let mut headers = state.alerts.deleted(id);
            add_mirror_warning(&state, &mut headers, &mirror);
            (StatusCode::NO_CONTENT, headers).into_response()
        }
        Err(e) => {
            error!(id = %id, "Failed to delete operation via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

// --- Search Handler ---

/// Handler for searching operations (GET /api/operations/_search?query=...).
pub async fn search_operations_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let params = match PageParams::from_query(uri.query(), &state.config) {
        Ok(params) => params,
        Err(e) => return map_application_error_to_response(&state.alerts, e),
    };
    let Some(query) = params.query.filter(|q| !q.trim().is_empty()) else {
        return map_application_error_to_response(
            &state.alerts,
            ApplicationError::InvalidInput("query parameter is required".to_string()),
        );
    };
    info!(
        query = %query,
        page = params.page.page(),
        size = params.page.size(),
        "Received search request"
    );

    match state
        .search_service
        .search(&query, params.page, Some(params.sort))
        .await
    {
        Ok(page) => {
            info!(query = %query, "Search completed successfully via handler, {} total hits", page.total_elements);
            let headers = pagination_headers(&uri, &page);
            (StatusCode::OK, headers, JsonResponse(page.content)).into_response()
        }
        Err(e) => {
            error!(query = %query, "Failed to search operations via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

// --- Search Index Maintenance Handlers ---

/// Handler for comparing store and index counts (GET /management/search-index).
pub async fn index_stats_handler(State(state): State<AppState>) -> Response {
    info!("Received request to get search index statistics");
    match state.admin_service.stats().await {
        Ok(stats) => (StatusCode::OK, JsonResponse(stats)).into_response(),
        Err(e) => {
            error!("Failed to get search index statistics via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for comparing one stored record with its indexed copy (GET /management/search-index/:id).
pub async fn compare_index_handler(
    State(state): State<AppState>,
    id: Result<Path<OperationId>, PathRejection>,
) -> Response {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => return reject(&state, rejection.body_text()),
    };
    info!(id = %id, "Received request to compare stored and indexed copies");
    match state.admin_service.compare(id).await {
        Ok(comparison) => (StatusCode::OK, JsonResponse(comparison)).into_response(),
        Err(e) => {
            error!(id = %id, "Failed to compare indexed copy via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for rebuilding the index from the store (POST /management/search-index/reindex).
pub async fn reindex_handler(State(state): State<AppState>) -> Response {
    info!("Received request to rebuild search index");
    match state.admin_service.reindex().await {
        Ok(report) => {
            info!(indexed = report.indexed, "Search index rebuilt via handler");
            (StatusCode::OK, JsonResponse(report)).into_response()
        }
        Err(e) => {
            error!("Failed to rebuild search index via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

/// Handler for emptying the index (DELETE /management/search-index).
pub async fn clear_index_handler(State(state): State<AppState>) -> Response {
    info!("Received request to clear search index");
    match state.admin_service.clear().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to clear search index via handler: {}", e);
            map_application_error_to_response(&state.alerts, e)
        }
    }
}

pub async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

// --- Helpers ---

fn reject(state: &AppState, reason: String) -> Response {
    warn!("Rejected malformed request: {}", reason);
    map_application_error_to_response(&state.alerts, ApplicationError::InvalidInput(reason))
}

fn written_response(
    state: &AppState,
    status: StatusCode,
    mut headers: HeaderMap,
    written: MirroredWrite,
) -> Response {
    add_mirror_warning(state, &mut headers, &written.mirror);
    (status, headers, JsonResponse(written.operation)).into_response()
}

fn add_mirror_warning(state: &AppState, headers: &mut HeaderMap, mirror: &MirrorStatus) {
    if let Some(reason) = mirror.warning() {
        warn!("Responding with stale search index warning");
        state
            .alerts
            .add_warning(headers, &format!("Search index not updated: {}", reason));
    }
}
