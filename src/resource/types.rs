use super::uri::{ResourceUri, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Pagelet property that carries a reference to another resource's identifier.
pub const RESOURCE_REFERENCE_PROPERTY: &str = "resourceid";

pub const PAGE_TYPE: &str = "page";
pub const FILE_TYPE: &str = "file";
pub const IMAGE_TYPE: &str = "image";
pub const MOVIE_TYPE: &str = "movie";

/// ISO language identifier, e.g. `en` or `de`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Language(pub String);

impl Language {
    pub fn new(id: &str) -> Self {
        Self(id.to_lowercase())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
}

impl User {
    pub fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            name: None,
        }
    }

    pub fn with_name(login: &str, name: &str) -> Self {
        Self {
            login: login.to_string(),
            name: Some(name.to_string()),
        }
    }

    /// Stable identifier stored in `*_by` index fields.
    pub fn id(&self) -> &str {
        &self.login
    }

    /// Display name stored in `*_by_name` index fields, falls back to the login.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.login)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.login)
    }
}

/// Who did something, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub user: User,
    pub date: DateTime<Utc>,
}

impl Modification {
    pub fn new(user: User, date: DateTime<Utc>) -> Self {
        Self { user, date }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub user: User,
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

/// A value per language.
pub type LocalizedText = BTreeMap<Language, String>;

/// One language variant of a resource's binary content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContent {
    pub language: Language,
    pub mimetype: String,
    pub size: u64,
    pub filename: Option<String>,
    /// Where the bytes came from (upload, import url, ...).
    pub source: Option<String>,
    pub external_location: Option<String>,
    pub created: Option<Modification>,
}

impl ResourceContent {
    pub fn new(language: Language, mimetype: &str) -> Self {
        Self {
            language,
            mimetype: mimetype.to_string(),
            size: 0,
            filename: None,
            source: None,
            external_location: None,
            created: None,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }
}

/// Composable structured-content element placed inside a composer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagelet {
    pub module: String,
    pub identifier: String,
    pub properties: BTreeMap<String, Vec<String>>,
    /// Language -> element name -> values.
    pub content: BTreeMap<Language, BTreeMap<String, Vec<String>>>,
}

impl Pagelet {
    pub fn new(module: &str, identifier: &str) -> Self {
        Self {
            module: module.to_string(),
            identifier: identifier.to_string(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_content(mut self, language: Language, element: &str, value: &str) -> Self {
        self.content
            .entry(language)
            .or_default()
            .entry(element.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// `module/identifier`, the value stored in pagelet type fields.
    pub fn type_key(&self) -> String {
        format!("{}/{}", self.module, self.identifier)
    }

    /// Resource identifiers this pagelet points at.
    pub fn references(&self) -> impl Iterator<Item = &String> {
        self.properties
            .get(RESOURCE_REFERENCE_PROPERTY)
            .into_iter()
            .flatten()
    }
}

/// Structured content of a resource, loaded separately from its header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBody {
    pub composers: BTreeMap<String, Vec<Pagelet>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: ResourceUri,
    pub resource_type: String,
    pub template: Option<String>,
    pub title: LocalizedText,
    pub description: LocalizedText,
    pub rights: LocalizedText,
    pub coverage: LocalizedText,
    pub owner: Option<User>,
    pub created: Option<Modification>,
    pub modified: Option<Modification>,
    pub published: Option<Publication>,
    pub lock_owner: Option<User>,
    pub subjects: BTreeSet<String>,
    pub series: BTreeSet<String>,
    /// Composer name -> pagelets in position order.
    pub composers: BTreeMap<String, Vec<Pagelet>>,
    pub contents: BTreeMap<Language, ResourceContent>,
}

impl Resource {
    pub fn new(uri: ResourceUri, resource_type: &str) -> Self {
        Self {
            uri,
            resource_type: resource_type.to_string(),
            template: None,
            title: LocalizedText::new(),
            description: LocalizedText::new(),
            rights: LocalizedText::new(),
            coverage: LocalizedText::new(),
            owner: None,
            created: None,
            modified: None,
            published: None,
            lock_owner: None,
            subjects: BTreeSet::new(),
            series: BTreeSet::new(),
            composers: BTreeMap::new(),
            contents: BTreeMap::new(),
        }
    }

    pub fn page(uri: ResourceUri) -> Self {
        Self::new(uri, PAGE_TYPE)
    }

    pub fn identifier(&self) -> &str {
        &self.uri.identifier
    }

    pub fn version(&self) -> Version {
        self.uri.version
    }

    pub fn is_locked(&self) -> bool {
        self.lock_owner.is_some()
    }

    pub fn set_title(&mut self, language: Language, title: &str) {
        self.title.insert(language, title.to_string());
    }

    pub fn set_description(&mut self, language: Language, description: &str) {
        self.description.insert(language, description.to_string());
    }

    pub fn set_created(&mut self, user: User, date: DateTime<Utc>) {
        if self.owner.is_none() {
            self.owner = Some(user.clone());
        }
        self.created = Some(Modification::new(user, date));
    }

    pub fn set_modified(&mut self, user: User, date: DateTime<Utc>) {
        self.modified = Some(Modification::new(user, date));
    }

    pub fn set_published(&mut self, user: User, from: DateTime<Utc>, to: Option<DateTime<Utc>>) {
        self.published = Some(Publication { user, from, to });
    }

    pub fn add_subject(&mut self, subject: &str) {
        self.subjects.insert(subject.to_string());
    }

    pub fn add_series(&mut self, series: &str) {
        self.series.insert(series.to_string());
    }

    /// Appends a pagelet to `composer`, returning its position.
    pub fn add_pagelet(&mut self, composer: &str, pagelet: Pagelet) -> usize {
        let pagelets = self.composers.entry(composer.to_string()).or_default();
        pagelets.push(pagelet);
        pagelets.len() - 1
    }

    /// Every language the resource carries any localized header or content in.
    pub fn languages(&self) -> BTreeSet<Language> {
        let mut languages = BTreeSet::new();
        for map in [&self.title, &self.description, &self.rights, &self.coverage] {
            languages.extend(map.keys().cloned());
        }
        languages.extend(self.contents.keys().cloned());
        for pagelets in self.composers.values() {
            for pagelet in pagelets {
                languages.extend(pagelet.content.keys().cloned());
            }
        }
        languages
    }

    /// Identifiers of other resources referenced from structured content.
    pub fn references(&self) -> BTreeSet<String> {
        self.composers
            .values()
            .flatten()
            .flat_map(|pagelet| pagelet.references().cloned())
            .filter(|id| id != &self.uri.identifier)
            .collect()
    }

    /// Splits into the header (composers emptied) and the body.
    pub fn split(mut self) -> (Resource, ResourceBody) {
        let composers = std::mem::take(&mut self.composers);
        (self, ResourceBody { composers })
    }

    pub fn with_body(mut self, body: ResourceBody) -> Self {
        self.composers = body.composers;
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource_type, self.uri)
    }
}
