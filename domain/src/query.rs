//! Query-string language for the search index.
//!
//! A query is a list of whitespace-separated clauses. Each clause is either a
//! bare full-text term or a `field:value` term, optionally prefixed with `+`
//! (required) or `-` (excluded). Double quotes group a phrase, a trailing `*`
//! turns a word into a prefix match, and `*` alone matches every record.
//! `AND` between two clauses makes both required; `OR` is the default.

use crate::{DomainError, OperationField, OperationId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// How a clause participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

/// Text matching against analyzed description words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Word(String),
    Prefix(String),
    Phrase(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateMatch {
    /// Exact instant.
    Instant(DateTime<Utc>),
    /// Any instant within that UTC day.
    Day(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTerm {
    Id(OperationId),
    Date(DateMatch),
    Description(TextMatch),
    Amount(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    MatchAll,
    /// Unfielded term matched against description words.
    FullText(TextMatch),
    /// Unfielded term that also reads as a number: description words, id and amount.
    Numeric { text: TextMatch, value: Decimal },
    Field(FieldTerm),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occur: Occur,
    pub term: Term,
}

/// A parsed search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    source: String,
    clauses: Vec<Clause>,
}

impl SearchQuery {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(invalid("query cannot be empty"));
        }

        let mut clauses: Vec<Clause> = Vec::new();
        let mut pending_and = false;
        let mut pending_or = false;

        for token in lex(source)? {
            match token.as_str() {
                "AND" => {
                    let previous = clauses
                        .last_mut()
                        .filter(|_| !pending_and && !pending_or)
                        .ok_or_else(|| invalid("AND must follow a clause"))?;
                    if previous.occur == Occur::Should {
                        previous.occur = Occur::Must;
                    }
                    pending_and = true;
                }
                "OR" => {
                    if clauses.is_empty() || pending_and || pending_or {
                        return Err(invalid("OR must follow a clause"));
                    }
                    pending_or = true;
                }
                _ => {
                    let mut clause = parse_clause(&token)?;
                    if pending_and && clause.occur == Occur::Should {
                        clause.occur = Occur::Must;
                    }
                    pending_and = false;
                    pending_or = false;
                    clauses.push(clause);
                }
            }
        }

        if pending_and || pending_or {
            return Err(invalid("query cannot end with an operator"));
        }

        Ok(Self {
            source: source.to_string(),
            clauses,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

/// Lowercases and splits text into alphanumeric words. Used both when parsing
/// query values and when matching stored descriptions.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn invalid(reason: impl Into<String>) -> DomainError {
    DomainError::InvalidQuery(reason.into())
}

/// Splits on whitespace outside double quotes. Quotes are kept in the tokens.
fn lex(input: &str) -> Result<Vec<String>, DomainError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(invalid("unterminated quote"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_clause(token: &str) -> Result<Clause, DomainError> {
    let (occur, body) = match token.strip_prefix('+') {
        Some(rest) => (Occur::Must, rest),
        None => match token.strip_prefix('-') {
            Some(rest) => (Occur::MustNot, rest),
            None => (Occur::Should, token),
        },
    };
    if body.is_empty() {
        return Err(invalid(format!("'{}' has no term", token)));
    }
    if body == "*" || body == "*:*" {
        return Ok(Clause {
            occur,
            term: Term::MatchAll,
        });
    }

    let term = match split_field(body) {
        Some((field, value)) => {
            if field.is_empty() {
                return Err(invalid(format!("'{}' has an empty field name", body)));
            }
            if value.is_empty() {
                return Err(invalid(format!("'{}' has an empty value", body)));
            }
            let field = OperationField::from_str(field)
                .map_err(|_| invalid(format!("unknown field '{}'", field)))?;
            Term::Field(parse_field_term(field, value)?)
        }
        None => {
            let text = parse_text(body)?;
            match Decimal::from_str(body) {
                Ok(value) => Term::Numeric { text, value },
                Err(_) => Term::FullText(text),
            }
        }
    };
    Ok(Clause { occur, term })
}

/// Finds the first `:` outside quotes.
fn split_field(body: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (i, c) in body.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some((&body[..i], &body[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> Result<(&str, bool), DomainError> {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        if inner.contains('"') {
            return Err(invalid(format!("misplaced quote in '{}'", value)));
        }
        return Ok((inner, true));
    }
    if value.contains('"') {
        return Err(invalid(format!("misplaced quote in '{}'", value)));
    }
    Ok((value, false))
}

fn parse_text(value: &str) -> Result<TextMatch, DomainError> {
    let (raw, quoted) = unquote(value)?;

    if !quoted {
        if let Some(stem) = raw.strip_suffix('*') {
            let words = analyze(stem);
            return match words.as_slice() {
                [word] => Ok(TextMatch::Prefix(word.clone())),
                _ => Err(invalid(format!("unsupported wildcard '{}'", raw))),
            };
        }
    }

    let mut words = analyze(raw);
    match words.len() {
        0 => Err(invalid(format!("'{}' contains no searchable text", value))),
        1 => Ok(TextMatch::Word(words.remove(0))),
        _ => Ok(TextMatch::Phrase(words)),
    }
}

fn parse_field_term(field: OperationField, value: &str) -> Result<FieldTerm, DomainError> {
    match field {
        OperationField::Description => Ok(FieldTerm::Description(parse_text(value)?)),
        OperationField::Id => {
            let (raw, _) = unquote(value)?;
            raw.parse::<OperationId>()
                .map(FieldTerm::Id)
                .map_err(|_| invalid(format!("'{}' is not a valid id", raw)))
        }
        OperationField::Amount => {
            let (raw, _) = unquote(value)?;
            Decimal::from_str(raw.trim())
                .map(FieldTerm::Amount)
                .map_err(|_| invalid(format!("'{}' is not a valid amount", raw)))
        }
        OperationField::Date => {
            let (raw, _) = unquote(value)?;
            let raw = raw.trim();
            if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
                return Ok(FieldTerm::Date(DateMatch::Instant(instant.with_timezone(&Utc))));
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|day| FieldTerm::Date(DateMatch::Day(day)))
                .map_err(|_| invalid(format!("'{}' is not a valid date", raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn single(query: &str) -> Clause {
        let parsed = SearchQuery::parse(query).unwrap();
        assert_eq!(parsed.clauses().len(), 1, "expected one clause for {query}");
        parsed.clauses()[0].clone()
    }

    #[test]
    fn parses_id_term() {
        let clause = single("id:42");
        assert_eq!(clause.occur, Occur::Should);
        assert_eq!(clause.term, Term::Field(FieldTerm::Id(OperationId::new(42))));
    }

    #[test]
    fn parses_bare_words_as_full_text() {
        let parsed = SearchQuery::parse("Rent  groceries").unwrap();
        assert_eq!(
            parsed.clauses(),
            &[
                Clause {
                    occur: Occur::Should,
                    term: Term::FullText(TextMatch::Word("rent".to_string())),
                },
                Clause {
                    occur: Occur::Should,
                    term: Term::FullText(TextMatch::Word("groceries".to_string())),
                },
            ]
        );
    }

    #[test]
    fn parses_quoted_phrase_in_field() {
        let clause = single("description:\"monthly Rent\"");
        assert_eq!(
            clause.term,
            Term::Field(FieldTerm::Description(TextMatch::Phrase(vec![
                "monthly".to_string(),
                "rent".to_string()
            ])))
        );
    }

    #[test]
    fn parses_prefix_and_modifiers() {
        let parsed = SearchQuery::parse("+groc* -amount:10.50").unwrap();
        assert_eq!(parsed.clauses()[0].occur, Occur::Must);
        assert_eq!(
            parsed.clauses()[0].term,
            Term::FullText(TextMatch::Prefix("groc".to_string()))
        );
        assert_eq!(parsed.clauses()[1].occur, Occur::MustNot);
        assert_eq!(
            parsed.clauses()[1].term,
            Term::Field(FieldTerm::Amount(Decimal::new(1050, 2)))
        );
    }

    #[test]
    fn and_makes_both_sides_required() {
        let parsed = SearchQuery::parse("rent AND amount:1 OR food").unwrap();
        let occurs: Vec<Occur> = parsed.clauses().iter().map(|c| c.occur).collect();
        assert_eq!(occurs, vec![Occur::Must, Occur::Must, Occur::Should]);
    }

    #[test]
    fn parses_dates() {
        assert_eq!(
            single("date:1970-01-01T00:00:00Z").term,
            Term::Field(FieldTerm::Date(DateMatch::Instant(
                Utc.timestamp_opt(0, 0).unwrap()
            )))
        );
        assert_eq!(
            single("date:2024-02-29").term,
            Term::Field(FieldTerm::Date(DateMatch::Day(
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
            )))
        );
    }

    #[test]
    fn numeric_bare_terms_keep_their_value() {
        assert_eq!(
            single("45.10").term,
            Term::Numeric {
                text: TextMatch::Phrase(vec!["45".to_string(), "10".to_string()]),
                value: Decimal::new(4510, 2),
            }
        );
        assert_eq!(
            single("7").term,
            Term::Numeric {
                text: TextMatch::Word("7".to_string()),
                value: Decimal::new(7, 0),
            }
        );
        assert_eq!(
            single("\"45.10\"").term,
            Term::FullText(TextMatch::Phrase(vec!["45".to_string(), "10".to_string()]))
        );
    }

    #[test]
    fn match_all() {
        assert_eq!(single("*").term, Term::MatchAll);
        assert_eq!(single("*:*").term, Term::MatchAll);
    }

    #[test]
    fn rejects_malformed_queries() {
        for query in [
            "",
            "   ",
            "\"unterminated",
            ":value",
            "id:",
            "label:foo",
            "id:abc",
            "amount:lots",
            "date:yesterday",
            "AND rent",
            "rent AND",
            "rent OR",
            "+",
            "!!!",
        ] {
            assert!(
                matches!(SearchQuery::parse(query), Err(DomainError::InvalidQuery(_))),
                "expected '{query}' to be rejected"
            );
        }
    }

    #[test]
    fn analyzer_lowercases_and_splits() {
        assert_eq!(analyze("Rent, May-2024"), vec!["rent", "may", "2024"]);
    }
}
