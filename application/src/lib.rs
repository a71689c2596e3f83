use async_trait::async_trait;
use domain::{
    DomainError, NewOperation, Operation, OperationId, OperationPayload, Page, PageRequest,
    SearchQuery, Sort,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Application Errors ---

/// Failures of the search backend, kept apart so they can be mapped to a
/// status that reflects the backend fault.
#[derive(Error, Debug, PartialEq)]
pub enum SearchBackendError {
    #[error("Malformed search query: {0}")]
    MalformedQuery(String),
    #[error("Search index unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("A new operation cannot already have an ID")]
    IdAlreadySet,
    #[error("Invalid id")]
    IdMissing,
    #[error("Invalid ID: path id {path} does not match body id {body}")]
    IdMismatch {
        path: OperationId,
        body: OperationId,
    },
    #[error("Entity not found: {0}")]
    UpdateTargetNotFound(OperationId),
    #[error("Operation not found: {0}")]
    NotFound(OperationId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error(transparent)]
    Search(#[from] SearchBackendError),
    #[error("Search index write failed for {target}: {source}")]
    IndexError {
        target: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
}

impl ApplicationError {
    /// Stable machine-readable key sent to clients alongside 4xx errors.
    pub fn error_key(&self) -> &'static str {
        match self {
            ApplicationError::IdAlreadySet => "idexists",
            ApplicationError::IdMissing => "idnull",
            ApplicationError::IdMismatch { .. } => "idinvalid",
            ApplicationError::UpdateTargetNotFound(_) => "idnotfound",
            ApplicationError::NotFound(_) => "notfound",
            ApplicationError::InvalidInput(_) => "invalidinput",
            ApplicationError::DomainError(DomainError::MissingField(_)) => "fieldrequired",
            ApplicationError::DomainError(_) => "validation",
            ApplicationError::Search(SearchBackendError::MalformedQuery(_)) => "querymalformed",
            ApplicationError::Search(SearchBackendError::Unavailable(_)) => "searchunavailable",
            ApplicationError::IndexError { .. } => "indexfailure",
            ApplicationError::InfrastructureError(_) => "internal",
        }
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// Which related collections a read should materialize. Replaces an implicit
/// lazy/eager toggle with an explicit argument on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relations {
    #[default]
    Eager,
    Lazy,
}

/// Interface for the authoritative record store.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Persists a new record under a freshly assigned id.
    async fn insert(&self, operation: NewOperation) -> Result<Operation, ApplicationError>;
    /// Replaces the full record stored under `operation.id()`.
    async fn save(&self, operation: &Operation) -> Result<Operation, ApplicationError>;
    async fn exists(&self, id: OperationId) -> Result<bool, ApplicationError>;
    async fn get(
        &self,
        id: OperationId,
        relations: Relations,
    ) -> Result<Option<Operation>, ApplicationError>;
    /// Deletes a record. Returns true if it existed.
    async fn delete(&self, id: OperationId) -> Result<bool, ApplicationError>;
    /// Returns one page ordered by `sort`, ties broken by ascending id.
    async fn find_page(
        &self,
        page: &PageRequest,
        sort: &Sort,
        relations: Relations,
    ) -> Result<Page<Operation>, ApplicationError>;
    async fn find_all(&self) -> Result<Vec<Operation>, ApplicationError>;
    async fn count(&self) -> Result<usize, ApplicationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub operation: Operation,
    pub score: f32,
}

#[derive(Debug)]
pub struct SearchResult {
    /// Hits for the requested page, already ranked.
    pub hits: Vec<SearchHit>,
    /// Total number of matching documents before pagination.
    pub total_hits: usize,
}

/// Interface for the search index mirror.
#[async_trait]
pub trait OperationIndex: Send + Sync {
    /// Adds or replaces the indexed copy of an operation.
    async fn index(&self, operation: &Operation) -> Result<(), ApplicationError>;
    /// Removes an operation from the index. Absent ids are not an error.
    async fn delete_by_id(&self, id: OperationId) -> Result<(), ApplicationError>;
    /// Returns the indexed copy of an operation, used to check the mirror against the store.
    async fn get(&self, id: OperationId) -> Result<Option<Operation>, ApplicationError>;
    /// Ranked search. Without a sort, hits are ordered by score descending
    /// then id ascending.
    async fn search(
        &self,
        query: &SearchQuery,
        sort: Option<&Sort>,
        page: &PageRequest,
    ) -> Result<SearchResult, ApplicationError>;
    async fn delete_all(&self) -> Result<(), ApplicationError>;
    async fn count(&self) -> Result<usize, ApplicationError>;
    /// Indexes multiple operations efficiently.
    #[instrument(skip(self, operations))]
    async fn index_batch(&self, operations: &[Operation]) -> Result<(), ApplicationError> {
        debug!(count = operations.len(), "Indexing batch via default iteration");
        for operation in operations {
            self.index(operation).await?;
        }
        Ok(())
    }
}

// --- Request/Response Models ---

/// Outcome of the mirror half of a dual write.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorStatus {
    Synced,
    /// The store write committed but the index was not updated.
    Stale(String),
}

impl MirrorStatus {
    pub fn warning(&self) -> Option<&str> {
        match self {
            MirrorStatus::Synced => None,
            MirrorStatus::Stale(reason) => Some(reason),
        }
    }
}

/// A committed store write together with the result of mirroring it.
#[derive(Debug, Clone)]
pub struct MirroredWrite {
    pub operation: Operation,
    pub mirror: MirrorStatus,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub stored_records: usize,
    pub indexed_documents: usize,
    pub counts_match: bool,
}

/// Store and index copies of one record, for diagnosing a stale mirror.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MirrorComparison {
    pub id: OperationId,
    pub stored: Option<Operation>,
    pub indexed: Option<Operation>,
    pub in_sync: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReindexResponse {
    pub indexed: usize,
}

// --- Application Services (Use Cases) ---

/// Record store gateway: CRUD on operations, mirroring every write into the
/// search index within the same call.
pub struct OperationService {
    repository: Arc<dyn OperationRepository>,
    index: Arc<dyn OperationIndex>,
}

impl OperationService {
    pub fn new(repository: Arc<dyn OperationRepository>, index: Arc<dyn OperationIndex>) -> Self {
        Self { repository, index }
    }

    #[instrument(skip(self, payload))]
    pub async fn create(&self, payload: OperationPayload) -> Result<MirroredWrite, ApplicationError> {
        info!("Attempting to create operation");
        if let Some(id) = payload.id {
            warn!(id = %id, "Create rejected: payload already carries an id");
            return Err(ApplicationError::IdAlreadySet);
        }
        let draft = NewOperation::from_payload(payload)?;

        let saved = self.repository.insert(draft).await.inspect_err(|e| {
            error!("Failed to save operation to repository: {}", e);
        })?;
        info!(id = %saved.id(), "Operation saved to repository");

        let mirror = self.mirror_write(&saved).await;
        Ok(MirroredWrite {
            operation: saved,
            mirror,
        })
    }

    #[instrument(skip(self, payload))]
    pub async fn update(
        &self,
        id: OperationId,
        payload: OperationPayload,
    ) -> Result<MirroredWrite, ApplicationError> {
        info!("Attempting to update operation");
        let body_id = payload.id;
        let draft = NewOperation::from_payload(payload)?;
        check_identity(id, body_id)?;
        self.ensure_exists(id).await?;

        let saved = self
            .repository
            .save(&draft.with_id(id))
            .await
            .inspect_err(|e| error!("Failed to replace operation in repository: {}", e))?;
        info!("Operation replaced in repository");

        let mirror = self.mirror_write(&saved).await;
        Ok(MirroredWrite {
            operation: saved,
            mirror,
        })
    }

    #[instrument(skip(self, patch))]
    pub async fn partial_update(
        &self,
        id: OperationId,
        patch: OperationPayload,
    ) -> Result<MirroredWrite, ApplicationError> {
        info!("Attempting to partially update operation");
        check_identity(id, patch.id)?;
        self.ensure_exists(id).await?;

        // The record may disappear between the existence check and the load
        let mut existing = self
            .repository
            .get(id, Relations::Lazy)
            .await?
            .ok_or_else(|| {
                warn!("Operation vanished before it could be patched");
                ApplicationError::NotFound(id)
            })?;
        existing.merge(patch);

        let saved = self
            .repository
            .save(&existing)
            .await
            .inspect_err(|e| error!("Failed to save patched operation: {}", e))?;
        info!("Patched operation saved to repository");

        let mirror = self.mirror_write(&saved).await;
        Ok(MirroredWrite {
            operation: saved,
            mirror,
        })
    }

    /// Deletes from the store, then from the index. Succeeds whether or not
    /// the record existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: OperationId) -> Result<MirrorStatus, ApplicationError> {
        info!("Attempting to delete operation");
        let removed = self
            .repository
            .delete(id)
            .await
            .inspect_err(|e| error!("Failed to delete operation from repository: {}", e))?;
        if removed {
            info!("Operation deleted from repository");
        } else {
            info!("Operation not found in repository for deletion (already deleted or never existed)");
        }

        match self.index.delete_by_id(id).await {
            Ok(()) => {
                debug!("Operation removed from search index");
                Ok(MirrorStatus::Synced)
            }
            Err(e) => {
                warn!("Search index delete failed; index is stale until the next reindex: {}", e);
                Ok(MirrorStatus::Stale(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: OperationId) -> Result<Operation, ApplicationError> {
        debug!("Fetching operation");
        self.repository
            .get(id, Relations::Eager)
            .await?
            .ok_or(ApplicationError::NotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: PageRequest,
        sort: Sort,
        relations: Relations,
    ) -> Result<Page<Operation>, ApplicationError> {
        debug!("Listing page of operations");
        self.repository.find_page(&page, &sort, relations).await
    }

    async fn ensure_exists(&self, id: OperationId) -> Result<(), ApplicationError> {
        if self.repository.exists(id).await? {
            Ok(())
        } else {
            warn!(id = %id, "Update rejected: operation does not exist");
            Err(ApplicationError::UpdateTargetNotFound(id))
        }
    }

    /// Mirrors a committed write. Failures are reported, never propagated.
    async fn mirror_write(&self, operation: &Operation) -> MirrorStatus {
        match self.index.index(operation).await {
            Ok(()) => {
                debug!(id = %operation.id(), "Operation indexed");
                MirrorStatus::Synced
            }
            Err(e) => {
                warn!(id = %operation.id(), "Search index write failed; record committed but index is stale: {}", e);
                MirrorStatus::Stale(e.to_string())
            }
        }
    }
}

fn check_identity(path: OperationId, body: Option<OperationId>) -> Result<(), ApplicationError> {
    let body = body.ok_or(ApplicationError::IdMissing)?;
    if body != path {
        return Err(ApplicationError::IdMismatch { path, body });
    }
    Ok(())
}

/// Service responsible for search over the index mirror.
pub struct SearchService {
    index: Arc<dyn OperationIndex>,
}

impl SearchService {
    pub fn new(index: Arc<dyn OperationIndex>) -> Self {
        Self { index }
    }

    #[instrument(skip(self, page, sort), fields(page = page.page(), size = page.size()))]
    pub async fn search(
        &self,
        query: &str,
        page: PageRequest,
        sort: Option<Sort>,
    ) -> Result<Page<Operation>, ApplicationError> {
        info!(query = %query, "Attempting to search operations");
        let start_time = Instant::now();

        let parsed = SearchQuery::parse(query).map_err(|e| {
            warn!("Rejected search query: {}", e);
            SearchBackendError::MalformedQuery(e.to_string())
        })?;
        let sort = sort.filter(|s| !s.is_unsorted());

        match self.index.search(&parsed, sort.as_ref(), &page).await {
            Ok(result) => {
                info!(
                    query = %parsed.as_str(),
                    total_hits = result.total_hits,
                    returned_hits = result.hits.len(),
                    time_ms = start_time.elapsed().as_millis(),
                    "Search successful"
                );
                let hits = Page {
                    content: result.hits,
                    number: page.page(),
                    size: page.size(),
                    total_elements: result.total_hits,
                };
                Ok(hits.map(|hit| hit.operation))
            }
            Err(e) => {
                error!(
                    query = %parsed.as_str(),
                    time_ms = start_time.elapsed().as_millis(),
                    "Search failed: {}", e
                );
                Err(match e {
                    ApplicationError::Search(inner) => ApplicationError::Search(inner),
                    other => SearchBackendError::Unavailable(other.to_string()).into(),
                })
            }
        }
    }
}

/// Maintenance operations on the search index, outside the request write path.
pub struct IndexAdminService {
    repository: Arc<dyn OperationRepository>,
    index: Arc<dyn OperationIndex>,
}

impl IndexAdminService {
    pub fn new(repository: Arc<dyn OperationRepository>, index: Arc<dyn OperationIndex>) -> Self {
        Self { repository, index }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<IndexStats, ApplicationError> {
        let (stored, indexed) = tokio::join!(self.repository.count(), self.index.count());
        let stored_records = stored?;
        let indexed_documents = indexed.map_err(|e| {
            error!("Failed to count search index documents: {}", e);
            ApplicationError::from(SearchBackendError::Unavailable(e.to_string()))
        })?;
        Ok(IndexStats {
            stored_records,
            indexed_documents,
            counts_match: stored_records == indexed_documents,
        })
    }

    /// Compares the stored record with its indexed copy.
    #[instrument(skip(self))]
    pub async fn compare(&self, id: OperationId) -> Result<MirrorComparison, ApplicationError> {
        let (stored, indexed) = tokio::join!(
            self.repository.get(id, Relations::Lazy),
            self.index.get(id)
        );
        let stored = stored?;
        let indexed = indexed.map_err(|e| {
            error!("Failed to read indexed copy: {}", e);
            ApplicationError::from(SearchBackendError::Unavailable(e.to_string()))
        })?;
        let in_sync = stored == indexed;
        if !in_sync {
            warn!(id = %id, "Indexed copy differs from the stored record");
        }
        Ok(MirrorComparison {
            id,
            stored,
            indexed,
            in_sync,
        })
    }

    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ApplicationError> {
        info!("Clearing search index");
        self.index.delete_all().await
    }

    /// Rebuilds the index from the record store.
    #[instrument(skip(self))]
    pub async fn reindex(&self) -> Result<ReindexResponse, ApplicationError> {
        info!("Rebuilding search index from repository");
        let operations = self.repository.find_all().await?;
        self.index.delete_all().await?;
        if let Err(e) = self.index.index_batch(&operations).await {
            error!(count = operations.len(), "Reindex batch failed: {}", e);
            return Err(ApplicationError::IndexError {
                target: format!("reindex batch of {}", operations.len()),
                source: Box::new(e),
            });
        }
        info!(count = operations.len(), "Search index rebuilt");
        Ok(ReindexResponse {
            indexed: operations.len(),
        })
    }
}
