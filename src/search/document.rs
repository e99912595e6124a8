//! Resource -> index document projection.

use super::schema::*;
use super::tokenizer::tokenize_text;
use crate::error::Result;
use crate::resource::{Language, Resource, User, Version};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(i64),
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Version> for FieldValue {
    fn from(version: Version) -> Self {
        FieldValue::Number(version.number() as i64)
    }
}

/// Flat, multi-valued projection of one resource revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub uid: String,
    pub fields: BTreeMap<String, Vec<FieldValue>>,
}

impl IndexDocument {
    pub fn new(uid: &str) -> Self {
        let mut document = Self {
            uid: uid.to_string(),
            fields: BTreeMap::new(),
        };
        document.add(UID, uid);
        document
    }

    pub fn add(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(value.into());
    }

    pub fn add_date(&mut self, field: &str, date: &DateTime<Utc>) {
        self.add(field, date.timestamp_millis());
    }

    pub fn values(&self, field: &str) -> &[FieldValue] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first_text(&self, field: &str) -> Option<&str> {
        self.values(field).iter().find_map(FieldValue::as_text)
    }

    pub fn first_number(&self, field: &str) -> Option<i64> {
        self.values(field).iter().find_map(FieldValue::as_number)
    }

    pub fn has(&self, field: &str) -> bool {
        !self.values(field).is_empty()
    }

    fn add_user(&mut self, id_field: &str, name_field: &str, user: &User) {
        self.add(id_field, user.id());
        self.add(name_field, user.display_name());
    }

    /// Adds the value under the unified and the localized field, and its tokens to both text fields.
    fn add_localized(&mut self, field: &str, language: &Language, value: &str) {
        self.add(field, value);
        self.add(&localized(field, language), value);
        self.add_tokens(language, value);
    }

    fn add_tokens(&mut self, language: &Language, value: &str) {
        let localized_text = localized(TEXT, language);
        for token in tokenize_text(value) {
            self.add(TEXT, token.as_str());
            self.add(&localized_text, token.as_str());
        }
    }
}

/// Builds the index document of `resource`. `alternates` are the other revisions stored for its identifier.
pub fn build_document(resource: &Resource, alternates: &[Version]) -> Result<IndexDocument> {
    let uri = &resource.uri;
    let mut doc = IndexDocument::new(&uri.uid());

    doc.add(ID, uri.identifier.as_str());
    doc.add(TYPE, resource.resource_type.as_str());
    doc.add(VERSION, uri.version);
    for alternate in alternates.iter().filter(|v| **v != uri.version) {
        doc.add(ALTERNATE_VERSION, *alternate);
    }
    if let Some(path) = uri.path() {
        doc.add(PATH, path);
        for prefix in path_prefixes(path) {
            doc.add(PATH_PREFIX, prefix.as_str());
        }
    }
    if let Some(template) = &resource.template {
        doc.add(TEMPLATE, template.as_str());
    }
    for language in resource.languages() {
        doc.add(LANGUAGE, language.id());
    }

    for subject in &resource.subjects {
        doc.add(SUBJECT, subject.as_str());
    }
    for series in &resource.series {
        doc.add(SERIES, series.as_str());
    }

    if let Some(owner) = &resource.owner {
        doc.add_user(OWNED_BY, OWNED_BY_NAME, owner);
    }
    if let Some(created) = &resource.created {
        doc.add_date(CREATED, &created.date);
        doc.add_user(CREATED_BY, CREATED_BY_NAME, &created.user);
    }
    if let Some(modified) = &resource.modified {
        doc.add_date(MODIFIED, &modified.date);
        doc.add_user(MODIFIED_BY, MODIFIED_BY_NAME, &modified.user);
    }
    if let Some(published) = &resource.published {
        doc.add_date(PUBLISHED_FROM, &published.from);
        if let Some(to) = &published.to {
            doc.add_date(PUBLISHED_TO, to);
        }
        doc.add_user(PUBLISHED_BY, PUBLISHED_BY_NAME, &published.user);
    }
    if let Some(lock_owner) = &resource.lock_owner {
        doc.add_user(LOCKED_BY, LOCKED_BY_NAME, lock_owner);
    }

    for (field, values) in [
        (TITLE, &resource.title),
        (DESCRIPTION, &resource.description),
        (RIGHTS, &resource.rights),
        (COVERAGE, &resource.coverage),
    ] {
        for (language, value) in values {
            doc.add_localized(field, language, value);
        }
    }

    for (language, content) in &resource.contents {
        doc.add(CONTENT_MIMETYPE, content.mimetype.as_str());
        doc.add(&localized(CONTENT_MIMETYPE, language), content.mimetype.as_str());
        if let Some(filename) = &content.filename {
            doc.add(CONTENT_FILENAME, filename.as_str());
            doc.add(&localized(CONTENT_FILENAME, language), filename.as_str());
        }
        if let Some(source) = &content.source {
            doc.add(CONTENT_SOURCE, source.as_str());
        }
        if let Some(external) = &content.external_location {
            doc.add(CONTENT_EXTERNAL, external.as_str());
        }
        if let Some(created) = &content.created {
            doc.add_date(&localized(CONTENT_CREATED, language), &created.date);
            doc.add(&localized(CONTENT_CREATED_BY, language), created.user.id());
        }
    }

    for (composer, pagelets) in &resource.composers {
        for (position, pagelet) in pagelets.iter().enumerate() {
            let type_key = pagelet.type_key();
            doc.add(PAGELET_TYPE, type_key.as_str());
            doc.add(&pagelet_type_composer(composer), type_key.as_str());
            doc.add(&pagelet_type_position(position), type_key.as_str());
            doc.add(&pagelet_type_composer_position(composer, position), type_key.as_str());

            for (name, values) in &pagelet.properties {
                for value in values {
                    doc.add(PAGELET_PROPERTIES, name_value(name, value).as_str());
                }
            }
            for (language, elements) in &pagelet.content {
                for (name, values) in elements {
                    for value in values {
                        let element = name_value(name, value);
                        doc.add(PAGELET_CONTENTS, element.as_str());
                        doc.add(&localized(PAGELET_CONTENTS, language), element.as_str());
                        doc.add_tokens(language, value);
                    }
                }
            }
        }
    }

    doc.add(SERIALIZED, serde_json::to_string(resource)?.as_str());
    Ok(doc)
}

/// Hidden document carrying the index schema version.
pub fn sentinel_document(version: i64) -> IndexDocument {
    let mut doc = IndexDocument::new(SENTINEL_UID);
    doc.add(TYPE, SENTINEL_TYPE);
    doc.add(INDEX_VERSION_FIELD, version);
    doc
}

/// `/a/b/c` -> `/`, `/a`, `/a/b`, `/a/b/c`.
pub fn path_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = vec!["/".to_string()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}
