//! Declarative search queries.
//!
//! Built by callers and translated to the index's native form by
//! [`build_query`](super::builder::build_query).

use crate::resource::{User, Version};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Whether every predicate of a group must hold, or any one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantifier {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Limit {
    #[default]
    Unbounded,
    Max(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The whole UTC day `date` falls into.
    pub fn day(date: DateTime<Utc>) -> Self {
        let day: NaiveDate = date.date_naive();
        let from = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let to = from + Duration::days(1) - Duration::milliseconds(1);
        Self { from, to }
    }
}

/// Pagelet identified by module and id, optionally pinned to a container and position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageletPredicate {
    pub module: String,
    pub identifier: String,
    pub composer: Option<String>,
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub identifiers: Vec<String>,
    pub path: Option<String>,
    pub path_prefix: Option<String>,
    pub types: Vec<String>,
    pub without_types: Vec<String>,
    pub template: Option<String>,
    pub version: Option<Version>,
    pub preferred_version: Option<Version>,
    pub subjects: Vec<String>,
    pub subject_quantifier: Quantifier,
    pub series: Vec<String>,
    pub creator: Option<String>,
    pub modifier: Option<String>,
    pub publisher: Option<String>,
    pub lock_owner: Option<String>,
    pub any_lock_owner: bool,
    pub creation_date: Option<DateRange>,
    pub modification_date: Option<DateRange>,
    pub publication_date: Option<DateRange>,
    pub without_modification: bool,
    pub without_publication: bool,
    pub mimetype: Option<String>,
    pub filename: Option<String>,
    pub text: Option<String>,
    pub properties: Vec<(String, String)>,
    pub property_quantifier: Quantifier,
    pub elements: Vec<(String, String)>,
    pub element_quantifier: Quantifier,
    pub pagelets: Vec<PageletPredicate>,
    pub pagelet_quantifier: Quantifier,
    pub recency_priority: bool,
    pub publication_sort: Option<SortOrder>,
    pub modification_sort: Option<SortOrder>,
    pub creation_sort: Option<SortOrder>,
    pub offset: usize,
    pub limit: Limit,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifiers.push(identifier.to_string());
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(crate::resource::normalize_path(path));
        self
    }

    /// Resources at `prefix` or anywhere below it.
    pub fn with_path_prefix(mut self, prefix: &str) -> Self {
        self.path_prefix = Some(crate::resource::normalize_path(prefix));
        self
    }

    pub fn with_type(mut self, resource_type: &str) -> Self {
        self.types.push(resource_type.to_string());
        self
    }

    pub fn without_type(mut self, resource_type: &str) -> Self {
        self.without_types.push(resource_type.to_string());
        self
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// One document per identifier: `version` where stored, the other revisions otherwise.
    pub fn with_preferred_version(mut self, version: Version) -> Self {
        self.preferred_version = Some(version);
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subjects.push(subject.to_string());
        self
    }

    pub fn with_subject_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.subject_quantifier = quantifier;
        self
    }

    pub fn with_series(mut self, series: &str) -> Self {
        self.series.push(series.to_string());
        self
    }

    pub fn with_creator(mut self, user: &User) -> Self {
        self.creator = Some(user.id().to_string());
        self
    }

    pub fn with_modifier(mut self, user: &User) -> Self {
        self.modifier = Some(user.id().to_string());
        self
    }

    pub fn with_publisher(mut self, user: &User) -> Self {
        self.publisher = Some(user.id().to_string());
        self
    }

    pub fn with_lock_owner(mut self, user: &User) -> Self {
        self.lock_owner = Some(user.id().to_string());
        self
    }

    pub fn with_any_lock_owner(mut self) -> Self {
        self.any_lock_owner = true;
        self
    }

    pub fn with_creation_date(mut self, range: DateRange) -> Self {
        self.creation_date = Some(range);
        self
    }

    pub fn with_modification_date(mut self, range: DateRange) -> Self {
        self.modification_date = Some(range);
        self
    }

    pub fn with_publication_date(mut self, range: DateRange) -> Self {
        self.publication_date = Some(range);
        self
    }

    pub fn without_modification(mut self) -> Self {
        self.without_modification = true;
        self
    }

    pub fn without_publication(mut self) -> Self {
        self.without_publication = true;
        self
    }

    pub fn with_mimetype(mut self, mimetype: &str) -> Self {
        self.mimetype = Some(mimetype.to_string());
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    /// Every whitespace-separated token must appear somewhere in the resource.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_property_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.property_quantifier = quantifier;
        self
    }

    pub fn with_element(mut self, name: &str, value: &str) -> Self {
        self.elements.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_element_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.element_quantifier = quantifier;
        self
    }

    pub fn with_pagelet(mut self, module: &str, identifier: &str) -> Self {
        self.pagelets.push(PageletPredicate {
            module: module.to_string(),
            identifier: identifier.to_string(),
            composer: None,
            position: None,
        });
        self
    }

    /// Narrows the last added pagelet predicate to a container.
    pub fn in_composer(mut self, composer: &str) -> Self {
        if let Some(pagelet) = self.pagelets.last_mut() {
            pagelet.composer = Some(composer.to_string());
        }
        self
    }

    /// Narrows the last added pagelet predicate to a position.
    pub fn at_position(mut self, position: usize) -> Self {
        if let Some(pagelet) = self.pagelets.last_mut() {
            pagelet.position = Some(position);
        }
        self
    }

    pub fn with_pagelet_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.pagelet_quantifier = quantifier;
        self
    }

    /// Boosts recently modified resources when ordering by relevance.
    pub fn with_recency_priority(mut self) -> Self {
        self.recency_priority = true;
        self
    }

    pub fn sort_by_publication_date(mut self, order: SortOrder) -> Self {
        self.publication_sort = Some(order);
        self
    }

    pub fn sort_by_modification_date(mut self, order: SortOrder) -> Self {
        self.modification_sort = Some(order);
        self
    }

    pub fn sort_by_creation_date(mut self, order: SortOrder) -> Self {
        self.creation_sort = Some(order);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// `limit <= 0` yields no results. Leave the limit unset for unbounded queries.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Limit::Max(limit.max(0) as usize);
        self
    }
}
