// ./infrastructure/src/persistence/in_memory_repository.rs
use application::{ApplicationError, OperationRepository, Relations};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{NewOperation, Operation, OperationId, Page, PageRequest, Sort};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, instrument, trace};

/// In-memory record store keyed by operation id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOperationRepository {
    records: Arc<DashMap<OperationId, Arc<Operation>>>,
    // Last id handed out; ids start at 1
    sequence: Arc<AtomicI64>,
}

impl InMemoryOperationRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicI64::new(0)),
        }
    }

    fn next_id(&self) -> OperationId {
        OperationId::new(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl OperationRepository for InMemoryOperationRepository {
    #[instrument(skip(self, operation))]
    async fn insert(&self, operation: NewOperation) -> Result<Operation, ApplicationError> {
        let stored = operation.with_id(self.next_id());
        debug!(id = %stored.id(), "Inserting operation into in-memory store");
        self.records.insert(stored.id(), Arc::new(stored.clone()));
        Ok(stored)
    }

    #[instrument(skip(self, operation))]
    async fn save(&self, operation: &Operation) -> Result<Operation, ApplicationError> {
        debug!(id = %operation.id(), "Replacing operation in in-memory store");
        self.records
            .insert(operation.id(), Arc::new(operation.clone()));
        Ok(operation.clone())
    }

    #[instrument(skip(self))]
    async fn exists(&self, id: OperationId) -> Result<bool, ApplicationError> {
        Ok(self.records.contains_key(&id))
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        id: OperationId,
        relations: Relations,
    ) -> Result<Option<Operation>, ApplicationError> {
        // Operations carry no related collections yet, so both plans read the same row
        debug!(id = %id, ?relations, "Getting operation from in-memory store");
        Ok(self.records.get(&id).map(|entry| (**entry).clone()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: OperationId) -> Result<bool, ApplicationError> {
        debug!(id = %id, "Deleting operation from in-memory store");
        Ok(self.records.remove(&id).is_some())
    }

    #[instrument(skip(self))]
    async fn find_page(
        &self,
        page: &PageRequest,
        sort: &Sort,
        relations: Relations,
    ) -> Result<Page<Operation>, ApplicationError> {
        debug!(?relations, "Reading page from in-memory store");
        let mut all: Vec<Operation> = self
            .records
            .iter()
            .map(|entry| (**entry.value()).clone())
            .collect();
        all.sort_by(|a, b| sort.compare(a, b));
        trace!(total = all.len(), "Sorted operations before pagination");
        Ok(Page::from_sorted(all, page))
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<Operation>, ApplicationError> {
        let mut all: Vec<Operation> = self
            .records
            .iter()
            .map(|entry| (**entry.value()).clone())
            .collect();
        all.sort_by_key(|operation| operation.id());
        Ok(all)
    }

    async fn count(&self) -> Result<usize, ApplicationError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::{Direction, OperationField};
    use rust_decimal::Decimal;

    fn draft(amount: i64, description: Option<&str>) -> NewOperation {
        NewOperation {
            date: Utc.timestamp_opt(amount * 3600, 0).unwrap(),
            description: description.map(str::to_string),
            amount: Decimal::new(amount, 0),
        }
    }

    #[tokio::test]
    async fn insert_assigns_unique_increasing_ids() {
        let repo = InMemoryOperationRepository::new();
        let first = repo.insert(draft(1, None)).await.unwrap();
        let second = repo.insert(draft(2, None)).await.unwrap();

        assert_eq!(first.id(), OperationId::new(1));
        assert_eq!(second.id(), OperationId::new(2));
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn save_replaces_and_delete_is_idempotent() {
        let repo = InMemoryOperationRepository::new();
        let created = repo.insert(draft(1, Some("before"))).await.unwrap();
        let replacement = draft(9, Some("after")).with_id(created.id());

        repo.save(&replacement).await.unwrap();
        assert_eq!(
            repo.get(created.id(), Relations::Eager).await.unwrap(),
            Some(replacement)
        );

        assert!(repo.delete(created.id()).await.unwrap());
        assert!(!repo.delete(created.id()).await.unwrap());
        assert!(!repo.exists(created.id()).await.unwrap());
    }

    #[tokio::test]
    async fn find_page_sorts_with_id_tie_break() {
        let repo = InMemoryOperationRepository::new();
        for amount in [5, 3, 5, 1, 5] {
            repo.insert(draft(amount, None)).await.unwrap();
        }

        let sort = Sort::by(OperationField::Amount, Direction::Desc);
        let page = repo
            .find_page(&PageRequest::new(0, 4).unwrap(), &sort, Relations::Lazy)
            .await
            .unwrap();

        let ids: Vec<i64> = page.content.iter().map(|o| o.id().value()).collect();
        assert_eq!(ids, vec![1, 3, 5, 2]);
        assert_eq!(page.total_elements, 5);
        assert!(page.has_next());
    }

    #[tokio::test]
    async fn find_page_by_id_desc() {
        let repo = InMemoryOperationRepository::new();
        for amount in 0..4 {
            repo.insert(draft(amount, None)).await.unwrap();
        }
        let sort = Sort::parse_all(["id,desc"]).unwrap();
        let page = repo
            .find_page(&PageRequest::new(0, 20).unwrap(), &sort, Relations::Eager)
            .await
            .unwrap();
        let ids: Vec<i64> = page.content.iter().map(|o| o.id().value()).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }
}
