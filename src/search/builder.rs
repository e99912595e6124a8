//! Query Builder
//!
//! Translates a [`SearchQuery`] into the boolean query the index evaluates.
//!
//! ## Rules
//! 1. The sentinel document is always excluded.
//! 2. Scalar predicates are ANDed. Several values for one field are ORed within the
//!    field unless the predicate asks for `Quantifier::All`.
//! 3. "Without" predicates negate a field's value or existence.
//! 4. Free text is split on whitespace and every token is ANDed.
//! 5. Sort: publication > modification > creation > relevance (descending).

use super::document::FieldValue;
use super::query::{DateRange, Limit, PageletPredicate, Quantifier, SearchQuery, SortOrder};
use super::schema::*;
use super::tokenizer::tokenize_query;

use chrono::{Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term { field: String, value: FieldValue },
    /// Matches if the field holds any of the values.
    Terms { field: String, values: Vec<FieldValue> },
    /// Inclusive numeric range, open ends allowed.
    Range { field: String, from: Option<i64>, to: Option<i64> },
    Exists { field: String },
    Bool(Box<BoolQuery>),
}

impl Clause {
    pub fn term(field: &str, value: impl Into<FieldValue>) -> Self {
        Clause::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms(field: &str, values: Vec<FieldValue>) -> Self {
        Clause::Terms {
            field: field.to_string(),
            values,
        }
    }

    pub fn exists(field: &str) -> Self {
        Clause::Exists {
            field: field.to_string(),
        }
    }

    pub fn date_range(field: &str, range: &DateRange) -> Self {
        Clause::Range {
            field: field.to_string(),
            from: Some(range.from.timestamp_millis()),
            to: Some(range.to.timestamp_millis()),
        }
    }

    pub fn since(field: &str, from: i64) -> Self {
        Clause::Range {
            field: field.to_string(),
            from: Some(from),
            to: None,
        }
    }
}

/// All of `must`, at least one of `should` (when non-empty), none of `must_not`.
/// `boosts` only raise the score of documents that already match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Clause>,
    pub should: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub boosts: Vec<(Clause, f64)>,
}

impl BoolQuery {
    fn quantified(clauses: Vec<Clause>, quantifier: Quantifier) -> Option<Clause> {
        match clauses.len() {
            0 => None,
            1 => clauses.into_iter().next(),
            _ => {
                let group = match quantifier {
                    Quantifier::All => BoolQuery {
                        must: clauses,
                        ..Default::default()
                    },
                    Quantifier::Any => BoolQuery {
                        should: clauses,
                        ..Default::default()
                    },
                };
                Some(Clause::Bool(Box::new(group)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Numeric field, documents without a value sort last.
    Field { field: String, order: SortOrder },
    Score,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub query: BoolQuery,
    pub sort: Vec<SortKey>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl NativeQuery {
    /// Matches every document except the sentinel.
    pub fn all() -> Self {
        build_query(&SearchQuery::new())
    }
}

fn texts(values: &[String]) -> Vec<FieldValue> {
    values.iter().map(|v| FieldValue::text(v)).collect()
}

fn pagelet_clause(pagelet: &PageletPredicate) -> Clause {
    let type_key = format!("{}/{}", pagelet.module, pagelet.identifier);
    let field = match (&pagelet.composer, pagelet.position) {
        (Some(composer), Some(position)) => pagelet_type_composer_position(composer, position),
        (Some(composer), None) => pagelet_type_composer(composer),
        (None, Some(position)) => pagelet_type_position(position),
        (None, None) => PAGELET_TYPE.to_string(),
    };
    Clause::term(&field, type_key.as_str())
}

pub fn build_query(request: &SearchQuery) -> NativeQuery {
    let mut query = BoolQuery::default();
    query.must_not.push(Clause::term(UID, SENTINEL_UID));

    if !request.identifiers.is_empty() {
        query.must.push(Clause::terms(ID, texts(&request.identifiers)));
    }
    if let Some(path) = &request.path {
        query.must.push(Clause::term(PATH, path.as_str()));
    }
    if let Some(prefix) = &request.path_prefix {
        query.must.push(Clause::term(PATH_PREFIX, prefix.as_str()));
    }
    if !request.types.is_empty() {
        query.must.push(Clause::terms(TYPE, texts(&request.types)));
    }
    for resource_type in &request.without_types {
        query.must_not.push(Clause::term(TYPE, resource_type.as_str()));
    }
    if let Some(template) = &request.template {
        query.must.push(Clause::term(TEMPLATE, template.as_str()));
    }

    if let Some(version) = request.version {
        query.must.push(Clause::term(VERSION, version));
    }
    if let Some(preferred) = request.preferred_version {
        // The preferred revision itself, or a revision whose identifier has no preferred one.
        query.must.push(Clause::Bool(Box::new(BoolQuery {
            should: vec![
                Clause::term(VERSION, preferred),
                Clause::Bool(Box::new(BoolQuery {
                    must_not: vec![Clause::term(ALTERNATE_VERSION, preferred)],
                    ..Default::default()
                })),
            ],
            ..Default::default()
        })));
    }

    if !request.subjects.is_empty() {
        match request.subject_quantifier {
            Quantifier::Any => query.must.push(Clause::terms(SUBJECT, texts(&request.subjects))),
            Quantifier::All => {
                for subject in &request.subjects {
                    query.must.push(Clause::term(SUBJECT, subject.as_str()));
                }
            }
        }
    }
    if !request.series.is_empty() {
        query.must.push(Clause::terms(SERIES, texts(&request.series)));
    }

    for (field, user) in [
        (CREATED_BY, &request.creator),
        (MODIFIED_BY, &request.modifier),
        (PUBLISHED_BY, &request.publisher),
        (LOCKED_BY, &request.lock_owner),
    ] {
        if let Some(user) = user {
            query.must.push(Clause::term(field, user.as_str()));
        }
    }
    if request.any_lock_owner {
        query.must.push(Clause::exists(LOCKED_BY));
    }

    if let Some(range) = &request.creation_date {
        query.must.push(Clause::date_range(CREATED, range));
    }
    if let Some(range) = &request.modification_date {
        query.must.push(Clause::date_range(MODIFIED, range));
    }
    if let Some(range) = &request.publication_date {
        query.must.push(Clause::date_range(PUBLISHED_FROM, range));
    }
    if request.without_modification {
        query.must_not.push(Clause::exists(MODIFIED));
    }
    if request.without_publication {
        query.must_not.push(Clause::exists(PUBLISHED_FROM));
    }

    if let Some(mimetype) = &request.mimetype {
        query.must.push(Clause::term(CONTENT_MIMETYPE, mimetype.as_str()));
    }
    if let Some(filename) = &request.filename {
        query.must.push(Clause::term(CONTENT_FILENAME, filename.as_str()));
    }

    if let Some(text) = &request.text {
        let tokens = tokenize_query(text);
        if tokens.is_empty() && !text.trim().is_empty() {
            // Nothing indexable in the text, no document can contain it.
            query.must.push(Clause::terms(TEXT, Vec::new()));
        }
        for token in tokens {
            query.must.push(Clause::term(TEXT, token.as_str()));
        }
    }

    let properties = request
        .properties
        .iter()
        .map(|(name, value)| Clause::term(PAGELET_PROPERTIES, name_value(name, value).as_str()))
        .collect();
    if let Some(clause) = BoolQuery::quantified(properties, request.property_quantifier) {
        query.must.push(clause);
    }
    let elements = request
        .elements
        .iter()
        .map(|(name, value)| Clause::term(PAGELET_CONTENTS, name_value(name, value).as_str()))
        .collect();
    if let Some(clause) = BoolQuery::quantified(elements, request.element_quantifier) {
        query.must.push(clause);
    }
    let pagelets = request.pagelets.iter().map(pagelet_clause).collect();
    if let Some(clause) = BoolQuery::quantified(pagelets, request.pagelet_quantifier) {
        query.must.push(clause);
    }

    if request.recency_priority {
        let now = Utc::now();
        for (age, boost) in [(Duration::weeks(1), 10.0), (Duration::days(30), 5.0), (Duration::days(365), 2.0)] {
            query
                .boosts
                .push((Clause::since(MODIFIED, (now - age).timestamp_millis()), boost));
        }
    }

    let mut sort = Vec::new();
    for (field, order) in [
        (PUBLISHED_FROM, request.publication_sort),
        (MODIFIED, request.modification_sort),
        (CREATED, request.creation_sort),
    ] {
        if let Some(order) = order {
            sort.push(SortKey::Field {
                field: field.to_string(),
                order,
            });
        }
    }
    sort.push(SortKey::Score);

    NativeQuery {
        query,
        sort,
        offset: request.offset,
        limit: match request.limit {
            Limit::Unbounded => None,
            Limit::Max(n) => Some(n),
        },
    }
}
