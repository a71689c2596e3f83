use crate::{DomainError, Operation, OperationField};
use std::cmp::Ordering;
use std::str::FromStr;

// --- Sorting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(DomainError::InvalidSort(format!(
                "unknown direction '{}'",
                other
            ))),
        }
    }
}

/// A single sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: OperationField,
    pub direction: Direction,
}

impl SortOrder {
    pub fn new(field: OperationField, direction: Direction) -> Self {
        Self { field, direction }
    }

    /// Parses one Spring-style `field[,direction]` value, e.g. `id,desc`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let mut parts = raw.split(',');
        let field = parts
            .next()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| DomainError::InvalidSort(format!("empty sort field in '{}'", raw)))?;
        let field = OperationField::from_str(field)
            .map_err(|_| DomainError::InvalidSort(format!("cannot sort by '{}'", field)))?;
        let direction = match parts.next() {
            Some(d) if !d.trim().is_empty() => d.parse()?,
            _ => Direction::Asc,
        };
        if parts.next().is_some() {
            return Err(DomainError::InvalidSort(format!(
                "too many components in '{}'",
                raw
            )));
        }
        Ok(Self { field, direction })
    }

    fn compare(&self, a: &Operation, b: &Operation) -> Ordering {
        let ordering = match self.field {
            OperationField::Id => a.id().cmp(&b.id()),
            OperationField::Date => a.date().cmp(&b.date()),
            // Missing descriptions sort before present ones
            OperationField::Description => a.description().cmp(&b.description()),
            OperationField::Amount => a.amount().cmp(&b.amount()),
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Ordered list of sort criteria. Comparison always ends with `id asc` unless
/// an `id` criterion is already present, so the resulting order is total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<SortOrder>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(field: OperationField, direction: Direction) -> Self {
        Self {
            orders: vec![SortOrder::new(field, direction)],
        }
    }

    /// Builds a sort from repeated `sort=` parameter values.
    pub fn parse_all<'a, I>(values: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let orders = values
            .into_iter()
            .map(SortOrder::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { orders })
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn compare(&self, a: &Operation, b: &Operation) -> Ordering {
        for order in &self.orders {
            let result = order.compare(a, b);
            if result != Ordering::Equal {
                return result;
            }
        }
        if self.orders.iter().any(|o| o.field == OperationField::Id) {
            Ordering::Equal
        } else {
            a.id().cmp(&b.id())
        }
    }
}

// --- Pagination ---

/// Highest accepted page number, matching the `int` page index of Spring pageables.
pub const MAX_PAGE_NUMBER: usize = i32::MAX as usize;

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Result<Self, DomainError> {
        if size == 0 {
            return Err(DomainError::InvalidPageRequest(
                "page size must be at least 1".to_string(),
            ));
        }
        if page > MAX_PAGE_NUMBER {
            return Err(DomainError::InvalidPageRequest(format!(
                "page number must not exceed {}",
                MAX_PAGE_NUMBER
            )));
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus the metadata needed for pagination links.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: usize,
    pub size: usize,
    pub total_elements: usize,
}

impl<T> Page<T> {
    /// Slices an already ordered, complete result list.
    pub fn from_sorted(items: Vec<T>, request: &PageRequest) -> Self {
        let total_elements = items.len();
        let content = items
            .into_iter()
            .skip(request.offset())
            .take(request.size())
            .collect();
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_elements.div_ceil(self.size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.number.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OperationId, OperationPayload};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn op(id: i64, amount: i64) -> Operation {
        Operation::from_payload(
            OperationId::new(id),
            OperationPayload {
                id: None,
                date: Some(Utc.timestamp_opt(id * 60, 0).unwrap()),
                description: None,
                amount: Some(Decimal::new(amount, 0)),
            },
        )
        .unwrap()
    }

    #[test]
    fn parse_sort_with_and_without_direction() {
        assert_eq!(
            SortOrder::parse("id,desc").unwrap(),
            SortOrder::new(OperationField::Id, Direction::Desc)
        );
        assert_eq!(
            SortOrder::parse("amount").unwrap(),
            SortOrder::new(OperationField::Amount, Direction::Asc)
        );
        assert!(matches!(
            SortOrder::parse("label,asc"),
            Err(DomainError::InvalidSort(_))
        ));
        assert!(matches!(
            SortOrder::parse("id,sideways"),
            Err(DomainError::InvalidSort(_))
        ));
    }

    #[test]
    fn non_id_sort_breaks_ties_by_ascending_id() {
        let mut ops = vec![op(3, 5), op(1, 5), op(2, 9), op(4, 1)];
        let sort = Sort::by(OperationField::Amount, Direction::Desc);
        ops.sort_by(|a, b| sort.compare(a, b));
        let ids: Vec<i64> = ops.iter().map(|o| o.id().value()).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn id_desc_sort_has_no_secondary_key() {
        let mut ops = vec![op(1, 1), op(3, 1), op(2, 1)];
        let sort = Sort::parse_all(["id,desc"]).unwrap();
        ops.sort_by(|a, b| sort.compare(a, b));
        let ids: Vec<i64> = ops.iter().map(|o| o.id().value()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn unsorted_orders_by_id() {
        let sort = Sort::unsorted();
        assert_eq!(sort.compare(&op(2, 0), &op(1, 0)), Ordering::Greater);
    }

    #[test]
    fn page_metadata() {
        let request = PageRequest::new(1, 2).unwrap();
        let page = Page::from_sorted((0..5).collect::<Vec<_>>(), &request);
        assert_eq!(page.content, vec![2, 3]);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_previous());

        let last = Page::from_sorted((0..5).collect::<Vec<_>>(), &PageRequest::new(2, 2).unwrap());
        assert_eq!(last.content, vec![4]);
        assert!(!last.has_next());
    }

    #[test]
    fn empty_page_has_zero_pages() {
        let page: Page<i32> = Page::from_sorted(Vec::new(), &PageRequest::new(0, 20).unwrap());
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next());
        assert!(!page.has_previous());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(matches!(
            PageRequest::new(0, 0),
            Err(DomainError::InvalidPageRequest(_))
        ));
    }

    #[test]
    fn huge_page_numbers_are_rejected() {
        assert!(PageRequest::new(MAX_PAGE_NUMBER, 20).is_ok());
        assert!(matches!(
            PageRequest::new(usize::MAX, 20),
            Err(DomainError::InvalidPageRequest(_))
        ));
    }

    #[test]
    fn last_possible_page_number_has_no_next() {
        let page: Page<i32> = Page {
            content: Vec::new(),
            number: usize::MAX,
            size: 20,
            total_elements: 5,
        };
        assert!(!page.has_next());
        assert!(page.has_previous());
    }
}
