//! Index field names.

use crate::resource::Language;

pub const UID: &str = "uid";
pub const ID: &str = "id";
pub const PATH: &str = "path";
/// The path and every ancestor path, for segment-aware prefix queries.
pub const PATH_PREFIX: &str = "path_prefix";
pub const TYPE: &str = "type";
pub const VERSION: &str = "version";
/// Numbers of the other stored revisions of the same identifier.
pub const ALTERNATE_VERSION: &str = "alternate_version";
pub const TEMPLATE: &str = "template";
pub const LANGUAGE: &str = "language";

pub const SUBJECT: &str = "subject";
pub const SERIES: &str = "series";

pub const OWNED_BY: &str = "owned_by";
pub const OWNED_BY_NAME: &str = "owned_by_name";
pub const CREATED: &str = "created";
pub const CREATED_BY: &str = "created_by";
pub const CREATED_BY_NAME: &str = "created_by_name";
pub const MODIFIED: &str = "modified";
pub const MODIFIED_BY: &str = "modified_by";
pub const MODIFIED_BY_NAME: &str = "modified_by_name";
pub const PUBLISHED_FROM: &str = "published_from";
pub const PUBLISHED_TO: &str = "published_to";
pub const PUBLISHED_BY: &str = "published_by";
pub const PUBLISHED_BY_NAME: &str = "published_by_name";
pub const LOCKED_BY: &str = "locked_by";
pub const LOCKED_BY_NAME: &str = "locked_by_name";

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const RIGHTS: &str = "rights";
pub const COVERAGE: &str = "coverage";

pub const CONTENT_MIMETYPE: &str = "content_mimetype";
pub const CONTENT_FILENAME: &str = "content_filename";
pub const CONTENT_SOURCE: &str = "content_source";
pub const CONTENT_EXTERNAL: &str = "content_external";
pub const CONTENT_CREATED: &str = "content_created";
pub const CONTENT_CREATED_BY: &str = "content_created_by";

/// `module/identifier` of every pagelet, regardless of container or position.
pub const PAGELET_TYPE: &str = "pagelet_type";
/// `name=value` for every pagelet property.
pub const PAGELET_PROPERTIES: &str = "pagelet_properties";
/// `name=value` for every localized pagelet element.
pub const PAGELET_CONTENTS: &str = "pagelet_contents";

/// Tokens of every textual field, all languages.
pub const TEXT: &str = "text";
/// Canonical JSON form of the resource.
pub const SERIALIZED: &str = "serialized";

/// Sentinel document carrying the schema version. Never returned by queries.
pub const SENTINEL_UID: &str = "root";
pub const SENTINEL_TYPE: &str = "version";
pub const INDEX_VERSION_FIELD: &str = "index_version";
pub const INDEX_VERSION: i64 = 1;

/// `title` -> `title_en`.
pub fn localized(field: &str, language: &Language) -> String {
    format!("{}_{}", field, language.id())
}

pub fn pagelet_type_composer(composer: &str) -> String {
    format!("{}_composer_{}", PAGELET_TYPE, composer)
}

pub fn pagelet_type_position(position: usize) -> String {
    format!("{}_position_{}", PAGELET_TYPE, position)
}

pub fn pagelet_type_composer_position(composer: &str, position: usize) -> String {
    format!("{}_composer_{}_position_{}", PAGELET_TYPE, composer, position)
}

/// Field a suggestion dictionary draws its values from.
pub fn suggestion_field(dictionary: &str) -> Option<&'static str> {
    match dictionary {
        "subject" => Some(SUBJECT),
        "series" => Some(SERIES),
        _ => None,
    }
}

/// Property and element predicates are stored as `name=value`.
pub fn name_value(name: &str, value: &str) -> String {
    format!("{}={}", name, value)
}
