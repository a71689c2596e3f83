use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod paging;
pub mod query;

pub use paging::{Direction, Page, PageRequest, Sort, SortOrder};
pub use query::{Clause, DateMatch, FieldTerm, Occur, SearchQuery, Term, TextMatch, analyze};

/// Entity name used in client-facing alerts and error bodies.
pub const ENTITY_NAME: &str = "operation";

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Invalid sort specification: {0}")]
    InvalidSort(String),
    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),
}

// --- Operation ID ---

/// Store-assigned identifier of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(i64);

impl OperationId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

// --- Field names ---

/// The addressable fields of an Operation, shared by sorting and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationField {
    Id,
    Date,
    Description,
    Amount,
}

impl OperationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationField::Id => "id",
            OperationField::Date => "date",
            OperationField::Description => "description",
            OperationField::Amount => "amount",
        }
    }
}

impl FromStr for OperationField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(OperationField::Id),
            "date" => Ok(OperationField::Date),
            "description" => Ok(OperationField::Description),
            "amount" => Ok(OperationField::Amount),
            other => Err(DomainError::UnknownField(other.to_string())),
        }
    }
}

// --- Request payload ---

/// Wire shape of an Operation in request bodies. Every field is optional so
/// that validation (and partial updates) can tell "absent" from "present".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OperationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OperationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

// --- Operation entity ---

/// An Operation that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub amount: Decimal,
}

impl NewOperation {
    /// Validates required fields. The caller is responsible for rejecting a
    /// payload that already carries an id.
    pub fn from_payload(payload: OperationPayload) -> Result<Self, DomainError> {
        let date = payload.date.ok_or(DomainError::MissingField("date"))?;
        let amount = payload.amount.ok_or(DomainError::MissingField("amount"))?;
        Ok(Self {
            date,
            description: payload.description,
            amount,
        })
    }

    /// Attaches the store-assigned id.
    pub fn with_id(self, id: OperationId) -> Operation {
        Operation {
            id,
            date: self.date,
            description: self.description,
            amount: self.amount,
        }
    }
}

/// A persisted financial operation. Built only through [`NewOperation::with_id`]
/// and [`Operation::from_payload`], so required fields are always validated.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Operation {
    id: OperationId,
    date: DateTime<Utc>,
    description: Option<String>,
    amount: Decimal,
}

impl Operation {
    /// Builds a full replacement for the record `id` from a request payload.
    pub fn from_payload(id: OperationId, payload: OperationPayload) -> Result<Self, DomainError> {
        Ok(NewOperation::from_payload(payload)?.with_id(id))
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Overwrites every field present in `patch`. Absent and `null` fields are
    /// left untouched, and the id never changes.
    pub fn merge(&mut self, patch: OperationPayload) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
    }
}
