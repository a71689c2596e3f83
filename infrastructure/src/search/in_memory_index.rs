use application::{ApplicationError, OperationIndex, SearchHit, SearchResult};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{
    DateMatch, FieldTerm, Occur, Operation, OperationId, PageRequest, SearchQuery, Sort, Term,
    TextMatch, analyze,
};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// An indexed operation with its description analyzed once at write time.
#[derive(Debug)]
struct IndexedOperation {
    operation: Operation,
    words: Vec<String>,
}

impl IndexedOperation {
    fn new(operation: &Operation) -> Self {
        Self {
            words: operation.description().map(analyze).unwrap_or_default(),
            operation: operation.clone(),
        }
    }
}

/// In-memory search index mirroring the record store.
/// Scans every document per query; suited to tests and small data sets.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOperationIndex {
    documents: Arc<DashMap<OperationId, Arc<IndexedOperation>>>,
}

impl InMemoryOperationIndex {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl OperationIndex for InMemoryOperationIndex {
    #[instrument(skip(self, operation))]
    async fn index(&self, operation: &Operation) -> Result<(), ApplicationError> {
        debug!(id = %operation.id(), "Indexing operation in-memory");
        self.documents
            .insert(operation.id(), Arc::new(IndexedOperation::new(operation)));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: OperationId) -> Result<(), ApplicationError> {
        debug!(id = %id, "Removing operation from in-memory index");
        // It's okay if the document wasn't present
        self.documents.remove(&id);
        Ok(())
    }

    async fn get(&self, id: OperationId) -> Result<Option<Operation>, ApplicationError> {
        Ok(self
            .documents
            .get(&id)
            .map(|entry| entry.operation.clone()))
    }

    #[instrument(skip(self, query, sort), fields(query = %query.as_str()))]
    async fn search(
        &self,
        query: &SearchQuery,
        sort: Option<&Sort>,
        page: &PageRequest,
    ) -> Result<SearchResult, ApplicationError> {
        // --- Step 1: Score every document ---
        let mut hits: Vec<(f32, Arc<IndexedOperation>)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let doc = entry.value();
                evaluate(query, doc).map(|score| (score, doc.clone()))
            })
            .collect();
        trace!(count = hits.len(), "Documents matching query");

        // --- Step 2: Order ---
        match sort {
            Some(sort) => hits.sort_by(|a, b| sort.compare(&a.1.operation, &b.1.operation)),
            None => hits.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.operation.id().cmp(&b.1.operation.id()))
            }),
        }

        // --- Step 3: Paginate ---
        let total_hits = hits.len();
        let page_hits: Vec<SearchHit> = hits
            .into_iter()
            .skip(page.offset())
            .take(page.size())
            .map(|(score, doc)| SearchHit {
                operation: doc.operation.clone(),
                score,
            })
            .collect();

        debug!(
            total_hits,
            returned_hits = page_hits.len(),
            "In-memory search finished."
        );
        Ok(SearchResult {
            hits: page_hits,
            total_hits,
        })
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> Result<(), ApplicationError> {
        let removed = self.documents.len();
        self.documents.clear();
        info!(removed, "In-memory index cleared");
        Ok(())
    }

    async fn count(&self) -> Result<usize, ApplicationError> {
        Ok(self.documents.len())
    }

    /// Optimized batch index for in-memory store.
    #[instrument(skip(self, operations))]
    async fn index_batch(&self, operations: &[Operation]) -> Result<(), ApplicationError> {
        debug!(count = operations.len(), "Indexing batch directly in in-memory index");
        for operation in operations {
            self.documents
                .insert(operation.id(), Arc::new(IndexedOperation::new(operation)));
        }
        Ok(())
    }
}

/// Returns the relevance score of a document, or `None` if it does not match.
fn evaluate(query: &SearchQuery, doc: &IndexedOperation) -> Option<f32> {
    let mut score = 0.0;
    let mut has_required = false;
    let mut has_optional = false;
    let mut optional_matched = false;

    for clause in query.clauses() {
        let clause_score = score_term(&clause.term, doc);
        match clause.occur {
            Occur::Must => {
                has_required = true;
                score += clause_score?;
            }
            Occur::MustNot => {
                if clause_score.is_some() {
                    return None;
                }
            }
            Occur::Should => {
                has_optional = true;
                if let Some(s) = clause_score {
                    optional_matched = true;
                    score += s;
                }
            }
        }
    }

    if has_required || optional_matched {
        Some(score)
    } else if !has_optional {
        // Only exclusions: everything not excluded matches equally
        Some(1.0)
    } else {
        None
    }
}

fn score_term(term: &Term, doc: &IndexedOperation) -> Option<f32> {
    let operation = &doc.operation;
    let score = match term {
        Term::MatchAll => 1.0,
        Term::FullText(text) => text_score(text, &doc.words),
        Term::Numeric { text, value } => {
            text_score(text, &doc.words)
                + exact(Decimal::from(operation.id().value()) == *value)
                + exact(operation.amount() == *value)
        }
        Term::Field(FieldTerm::Id(id)) => exact(operation.id() == *id),
        Term::Field(FieldTerm::Amount(amount)) => exact(operation.amount() == *amount),
        Term::Field(FieldTerm::Date(DateMatch::Instant(instant))) => {
            exact(operation.date() == *instant)
        }
        Term::Field(FieldTerm::Date(DateMatch::Day(day))) => {
            exact(operation.date().date_naive() == *day)
        }
        Term::Field(FieldTerm::Description(text)) => text_score(text, &doc.words),
    };
    (score > 0.0).then_some(score)
}

fn exact(matches: bool) -> f32 {
    if matches { 1.0 } else { 0.0 }
}

/// Term frequency normalized by description length.
fn text_score(text: &TextMatch, words: &[String]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    let occurrences = match text {
        TextMatch::Word(word) => words.iter().filter(|w| *w == word).count(),
        TextMatch::Prefix(prefix) => words.iter().filter(|w| w.starts_with(prefix.as_str())).count(),
        TextMatch::Phrase(phrase) => {
            // Phrases weigh as much as their word count
            words
                .windows(phrase.len())
                .filter(|window| *window == phrase.as_slice())
                .count()
                * phrase.len()
        }
    };
    occurrences as f32 / (words.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::{Direction, OperationField, OperationPayload};

    fn op(id: i64, description: Option<&str>, amount: i64) -> Operation {
        Operation::from_payload(
            OperationId::new(id),
            OperationPayload {
                id: None,
                date: Some(Utc.with_ymd_and_hms(2024, 1, id as u32, 10, 0, 0).unwrap()),
                description: description.map(str::to_string),
                amount: Some(Decimal::new(amount, 0)),
            },
        )
        .unwrap()
    }

    async fn seeded() -> InMemoryOperationIndex {
        let index = InMemoryOperationIndex::new();
        index
            .index_batch(&[
                op(1, Some("Rent for January"), 900),
                op(2, Some("Groceries"), 45),
                op(3, Some("Rent"), 900),
                op(4, None, 12),
                op(5, Some("Groceries and rent rent"), 45),
            ])
            .await
            .unwrap();
        index
    }

    async fn ids(index: &InMemoryOperationIndex, query: &str, sort: Option<&Sort>) -> Vec<i64> {
        let query = SearchQuery::parse(query).unwrap();
        index
            .search(&query, sort, &PageRequest::new(0, 20).unwrap())
            .await
            .unwrap()
            .hits
            .iter()
            .map(|hit| hit.operation.id().value())
            .collect()
    }

    #[tokio::test]
    async fn id_query_returns_exactly_that_record() {
        let index = seeded().await;
        assert_eq!(ids(&index, "id:3", None).await, vec![3]);
    }

    #[tokio::test]
    async fn full_text_ranks_by_relevance_then_id() {
        let index = seeded().await;
        // "Rent" alone scores 1.0, "...rent rent" 2/2 = 1.0, "Rent for January" 1/sqrt(3)
        assert_eq!(ids(&index, "rent", None).await, vec![3, 5, 1]);
    }

    #[tokio::test]
    async fn explicit_sort_overrides_relevance() {
        let index = seeded().await;
        let sort = Sort::by(OperationField::Id, Direction::Desc);
        assert_eq!(ids(&index, "rent", Some(&sort)).await, vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn required_and_excluded_clauses() {
        let index = seeded().await;
        assert_eq!(ids(&index, "+rent -groceries", None).await, vec![3, 1]);
        assert_eq!(ids(&index, "groceries AND amount:45", None).await, vec![2, 5]);
        assert_eq!(ids(&index, "-amount:900", None).await, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn date_day_prefix_and_phrase_terms() {
        let index = seeded().await;
        assert_eq!(ids(&index, "date:2024-01-02", None).await, vec![2]);
        assert_eq!(ids(&index, "groc*", None).await, vec![2, 5]);
        assert_eq!(ids(&index, "\"rent for\"", None).await, vec![1]);
    }

    #[tokio::test]
    async fn numeric_terms_match_id_and_amount() {
        let index = seeded().await;
        index
            .index(
                &Operation::from_payload(
                    OperationId::new(6),
                    OperationPayload {
                        id: None,
                        date: Some(Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap()),
                        description: Some("Coffee".to_string()),
                        amount: Some(Decimal::new(4510, 2)),
                    },
                )
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(ids(&index, "45.10", None).await, vec![6]);
        assert_eq!(ids(&index, "45.1", None).await, vec![6]);
        assert_eq!(ids(&index, "3", None).await, vec![3]);
        // Whole amounts match every record carrying them
        assert_eq!(ids(&index, "45", None).await, vec![2, 5]);
    }

    #[tokio::test]
    async fn match_all_paginates_by_id() {
        let index = seeded().await;
        let query = SearchQuery::parse("*").unwrap();
        let result = index
            .search(&query, None, &PageRequest::new(1, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(result.total_hits, 5);
        let page: Vec<i64> = result.hits.iter().map(|h| h.operation.id().value()).collect();
        assert_eq!(page, vec![3, 4]);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let index = seeded().await;
        index.delete_by_id(OperationId::new(2)).await.unwrap();
        index.delete_by_id(OperationId::new(42)).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 4);
        assert!(index.get(OperationId::new(2)).await.unwrap().is_none());

        index.delete_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
