use application::{
    IndexAdminService, OperationIndex, OperationRepository, OperationService, SearchService,
};
use axum::{
    Router,
    routing::{get, post},
};
use infrastructure::{InMemoryOperationIndex, InMemoryOperationRepository};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod alerts;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pagination;

use alerts::AlertHeaders;
use config::{ApiConfig, DEFAULT_APP_NAME};
use handlers::*;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    operation_service: Arc<OperationService>,
    search_service: Arc<SearchService>,
    admin_service: Arc<IndexAdminService>,
    config: Arc<ApiConfig>,
    alerts: Arc<AlertHeaders>,
}

impl AppState {
    /// Wires the application services onto a record store and its search index.
    pub fn new(
        repository: Arc<dyn OperationRepository>,
        index: Arc<dyn OperationIndex>,
        config: ApiConfig,
    ) -> Self {
        let alerts = match AlertHeaders::new(&config.app_name) {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("{}. Falling back to {}.", e, DEFAULT_APP_NAME);
                AlertHeaders::fallback()
            }
        };

        Self {
            operation_service: Arc::new(OperationService::new(repository.clone(), index.clone())),
            search_service: Arc::new(SearchService::new(index.clone())),
            admin_service: Arc::new(IndexAdminService::new(repository, index)),
            config: Arc::new(config),
            alerts: Arc::new(alerts),
        }
    }

    /// State backed by the in-memory store and index.
    pub fn in_memory(config: ApiConfig) -> Self {
        let repository = Arc::new(InMemoryOperationRepository::new());
        let index = Arc::new(InMemoryOperationIndex::new());
        info!("In-memory infrastructure components initialized.");
        Self::new(repository, index, config)
    }
}

// --- API Router Definition ---
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Operation Endpoints
        .route(
            handlers::OPERATIONS_PATH,
            post(create_operation_handler).get(list_operations_handler),
        )
        .route("/api/operations/_search", get(search_operations_handler))
        .route(
            "/api/operations/:id",
            get(get_operation_handler)
                .put(update_operation_handler)
                .patch(partial_update_operation_handler)
                .delete(delete_operation_handler),
        )
        // Search Index Maintenance Endpoints
        .route(
            "/management/search-index",
            get(index_stats_handler).delete(clear_index_handler),
        )
        .route("/management/search-index/reindex", post(reindex_handler))
        .route("/management/search-index/:id", get(compare_index_handler))
        .layer(TraceLayer::new_for_http())
        // Provide the application state to the handlers
        .with_state(state)
}
