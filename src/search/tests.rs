//! Search Module Tests
//!
//! Validates the projection, the query pipeline and index synchronization.
//!
//! ## Test Scopes
//! - **Tokenizer**: normalization and query splitting.
//! - **Documents**: localized, pagelet and user fields.
//! - **Queries**: boolean rules, text matching, versions, sorting and pagination.
//! - **Suggestions**: prefix matching and seed validation.
//! - **Synchronization**: refresh, pruning, retry and staleness.
//! - **Integrity**: reference checks before destructive deletes.

#[cfg(test)]
mod tests {
    use crate::error::RepositoryError;
    use crate::resource::*;
    use crate::search::builder::{Clause, build_query};
    use crate::search::document::{build_document, path_prefixes};
    use crate::search::schema::*;
    use crate::search::tokenizer::{tokenize_query, tokenize_text};
    use crate::search::*;
    use crate::storage::{ContentStore, MemoryStore};

    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    const SITE: &str = "test";

    fn page(path: &str, title: &str) -> Resource {
        let mut page = Resource::page(ResourceUri::new(SITE, path));
        page.set_title(Language::new("en"), title);
        page
    }

    async fn index_all(index: &MemoryIndex, resources: &[Resource]) {
        for resource in resources {
            index
                .upsert(build_document(resource, &[resource.version()]).unwrap())
                .await
                .unwrap();
        }
    }

    // ============================================================
    // TOKENIZER TESTS
    // ============================================================

    #[test]
    fn test_tokenize_text_lowercase_and_unicode() {
        let tokens = tokenize_text("Grüße aus MÜNCHEN, 2024!");

        assert_eq!(tokens, vec!["grüße", "aus", "münchen", "2024"]);
    }

    #[test]
    fn test_tokenize_text_filters_short_words() {
        let tokens: std::collections::HashSet<String> = tokenize_text("I am a Rust programmer").into_iter().collect();

        assert!(tokens.contains("rust"));
        assert!(tokens.contains("am"));
        assert!(!tokens.contains("i"));
        assert!(!tokens.contains("a"));
    }

    #[test]
    fn test_tokenize_text_keeps_frequency() {
        let tokens = tokenize_text("rust rust programming rust");
        assert_eq!(tokens.iter().filter(|t| *t == "rust").count(), 3);
    }

    #[test]
    fn test_tokenize_query_splits_and_dedupes() {
        let tokens = tokenize_query("  Hello, world! hello foo-bar ");
        assert_eq!(tokens, vec!["hello", "world", "foo", "bar"]);
    }

    #[test]
    fn test_tokenize_query_drops_unindexed_short_words() {
        assert_eq!(tokenize_query("Plan B"), vec!["plan"]);
        assert_eq!(tokenize_query("don't stop"), vec!["don", "stop"]);
        assert!(tokenize_query("a I").is_empty());
    }

    // ============================================================
    // DOCUMENT TESTS
    // ============================================================

    #[test]
    fn test_path_prefixes() {
        assert_eq!(path_prefixes("/"), vec!["/"]);
        assert_eq!(path_prefixes("/a/b"), vec!["/", "/a", "/a/b"]);
    }

    #[test]
    fn test_document_fields() {
        // ARRANGE
        let mut resource = page("/news/today", "Hello World");
        resource.set_title(Language::new("de"), "Hallo Welt");
        resource.set_created(User::with_name("amelie", "Amelie Martin"), Utc::now());
        resource.lock_owner = Some(User::new("bruno"));
        resource.add_subject("weather");
        resource.add_pagelet(
            "main",
            Pagelet::new("text", "title")
                .with_property(RESOURCE_REFERENCE_PROPERTY, "image-1")
                .with_content(Language::new("en"), "title", "Sunny days"),
        );

        // ACT
        let doc = build_document(&resource, &[Version::Live, Version::Work]).unwrap();

        // ASSERT
        assert_eq!(doc.uid, resource.uri.uid());
        assert_eq!(doc.first_number(VERSION), Some(0));
        assert_eq!(doc.first_number(ALTERNATE_VERSION), Some(1));
        assert_eq!(doc.values(PATH_PREFIX).len(), 3);
        assert_eq!(doc.first_text(&localized(TITLE, &Language::new("de"))), Some("Hallo Welt"));
        assert_eq!(doc.values(TITLE).len(), 2, "unified field aggregates all languages");
        assert_eq!(doc.first_text(CREATED_BY), Some("amelie"));
        assert_eq!(doc.first_text(CREATED_BY_NAME), Some("Amelie Martin"));
        assert_eq!(doc.first_text(OWNED_BY), Some("amelie"));
        assert_eq!(doc.first_text(LOCKED_BY), Some("bruno"));
        assert_eq!(doc.first_text(LOCKED_BY_NAME), Some("bruno"));
        assert_eq!(doc.first_text(&pagelet_type_composer_position("main", 0)), Some("text/title"));
        assert_eq!(doc.first_text(PAGELET_PROPERTIES), Some("resourceid=image-1"));
        assert_eq!(doc.first_text(PAGELET_CONTENTS), Some("title=Sunny days"));
        assert!(doc.values(TEXT).contains(&"sunny".into()));
        assert!(doc.values(&localized(TEXT, &Language::new("de"))).contains(&"welt".into()));

        let serialized = doc.first_text(SERIALIZED).unwrap();
        let restored: Resource = serde_json::from_str(serialized).unwrap();
        assert_eq!(restored, resource);
    }

    // ============================================================
    // QUERY BUILDER TESTS
    // ============================================================

    #[test]
    fn test_builder_always_excludes_sentinel() {
        let native = build_query(&SearchQuery::new());
        assert!(native.query.must_not.contains(&Clause::term(UID, SENTINEL_UID)));
    }

    #[test]
    fn test_builder_sort_precedence() {
        use crate::search::builder::SortKey;

        let native = build_query(
            &SearchQuery::new()
                .sort_by_creation_date(SortOrder::Ascending)
                .sort_by_publication_date(SortOrder::Descending),
        );

        let fields: Vec<String> = native
            .sort
            .iter()
            .map(|key| match key {
                SortKey::Field { field, .. } => field.clone(),
                SortKey::Score => "score".to_string(),
            })
            .collect();
        assert_eq!(fields, vec![PUBLISHED_FROM, CREATED, "score"]);
    }

    // ============================================================
    // QUERY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_text_query_counts() {
        // ARRANGE: three documents, only one contains the term
        let index = MemoryIndex::new();
        index_all(
            &index,
            &[
                page("/a", "Ein Suchresultat"),
                page("/b", "Something else"),
                page("/c", "Nothing here"),
            ],
        )
        .await;

        // ACT
        let hit = index
            .query(&build_query(&SearchQuery::new().with_text("Suchresultat")))
            .await
            .unwrap();
        let miss = index
            .query(&build_query(&SearchQuery::new().with_text("Nirgendwo")))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(hit.documents(), 1);
        assert_eq!(hit.hits, 1);
        assert_eq!(miss.documents(), 0);
        assert_eq!(miss.hits, 0);
        assert_eq!(miss.page, 1);
    }

    #[tokio::test]
    async fn test_text_tokens_are_anded() {
        let index = MemoryIndex::new();
        index_all(&index, &[page("/a", "red apple"), page("/b", "red cherry")]).await;

        let both = index
            .query(&build_query(&SearchQuery::new().with_text("red apple")))
            .await
            .unwrap();

        assert_eq!(both.hits, 1);
        assert_eq!(both.items[0].path.as_deref(), Some("/a"));
    }

    #[tokio::test]
    async fn test_text_query_with_short_word_matches() {
        // ARRANGE
        let index = MemoryIndex::new();
        index_all(&index, &[page("/a", "Plan B"), page("/b", "Other plans")]).await;

        // ACT
        let result = index
            .query(&build_query(&SearchQuery::new().with_text("Plan B")))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(result.hits, 1);
        assert_eq!(result.items[0].path.as_deref(), Some("/a"));
    }

    #[tokio::test]
    async fn test_scalar_predicates() {
        // ARRANGE
        let index = MemoryIndex::new();
        let mut news = page("/news", "News");
        news.template = Some("default".to_string());
        news.add_subject("sports");
        news.add_subject("weather");
        let mut file = Resource::new(ResourceUri::new(SITE, "/news/doc"), FILE_TYPE);
        file.add_subject("sports");
        let other = page("/other", "Other");
        index_all(&index, &[news.clone(), file.clone(), other]).await;

        let run = |query: SearchQuery| {
            let index = index.clone();
            async move { index.query(&build_query(&query)).await.unwrap() }
        };

        // ACT + ASSERT
        assert_eq!(run(SearchQuery::new().with_path_prefix("/news")).await.hits, 2);
        assert_eq!(run(SearchQuery::new().with_type(FILE_TYPE)).await.hits, 1);
        assert_eq!(run(SearchQuery::new().without_type(FILE_TYPE)).await.hits, 2);
        assert_eq!(run(SearchQuery::new().with_template("default")).await.hits, 1);
        assert_eq!(
            run(SearchQuery::new().with_subject("sports").with_subject("weather"))
                .await
                .hits,
            2
        );
        assert_eq!(
            run(SearchQuery::new()
                .with_subject("sports")
                .with_subject("weather")
                .with_subject_quantifier(Quantifier::All))
            .await
            .hits,
            1
        );
        assert_eq!(
            run(SearchQuery::new().with_identifier(news.identifier()).with_identifier(file.identifier()))
                .await
                .hits,
            2
        );
    }

    #[tokio::test]
    async fn test_user_and_date_predicates() {
        let index = MemoryIndex::new();
        let amelie = User::new("amelie");
        let day = Utc.with_ymd_and_hms(2024, 3, 14, 15, 0, 0).unwrap();

        let mut edited = page("/a", "Edited");
        edited.set_created(amelie.clone(), day);
        edited.set_modified(amelie.clone(), day);
        edited.lock_owner = Some(amelie.clone());
        let untouched = page("/b", "Untouched");
        index_all(&index, &[edited, untouched]).await;

        let run = |query: SearchQuery| {
            let index = index.clone();
            async move { index.query(&build_query(&query)).await.unwrap().hits }
        };

        assert_eq!(run(SearchQuery::new().with_creator(&amelie)).await, 1);
        assert_eq!(run(SearchQuery::new().with_lock_owner(&amelie)).await, 1);
        assert_eq!(run(SearchQuery::new().with_any_lock_owner()).await, 1);
        assert_eq!(run(SearchQuery::new().without_modification()).await, 1);
        assert_eq!(run(SearchQuery::new().without_publication()).await, 2);
        assert_eq!(
            run(SearchQuery::new().with_creation_date(DateRange::day(day + Duration::hours(3)))).await,
            1
        );
        assert_eq!(
            run(SearchQuery::new().with_creation_date(DateRange::day(day + Duration::days(1)))).await,
            0
        );
    }

    #[tokio::test]
    async fn test_pagelet_predicates() {
        let index = MemoryIndex::new();
        let mut first = page("/a", "A");
        first.add_pagelet("main", Pagelet::new("text", "title").with_property("style", "bold"));
        first.add_pagelet("main", Pagelet::new("image", "gallery"));
        let mut second = page("/b", "B");
        second.add_pagelet("side", Pagelet::new("text", "title"));
        index_all(&index, &[first, second]).await;

        let run = |query: SearchQuery| {
            let index = index.clone();
            async move { index.query(&build_query(&query)).await.unwrap().hits }
        };

        assert_eq!(run(SearchQuery::new().with_pagelet("text", "title")).await, 2);
        assert_eq!(run(SearchQuery::new().with_pagelet("text", "title").in_composer("main")).await, 1);
        assert_eq!(run(SearchQuery::new().with_pagelet("image", "gallery").at_position(1)).await, 1);
        assert_eq!(run(SearchQuery::new().with_pagelet("image", "gallery").at_position(0)).await, 0);
        assert_eq!(run(SearchQuery::new().with_property("style", "bold")).await, 1);
        assert_eq!(
            run(SearchQuery::new()
                .with_pagelet("text", "title")
                .with_pagelet("image", "gallery")
                .with_pagelet_quantifier(Quantifier::All))
            .await,
            1
        );
    }

    #[tokio::test]
    async fn test_preferred_version() {
        // ARRANGE: /a has LIVE and WORK, /b only WORK
        let index = MemoryIndex::new();
        let live_a = page("/a", "A");
        let mut work_a = live_a.clone();
        work_a.uri = live_a.uri.at_version(Version::Work);
        let mut work_b = page("/b", "B");
        work_b.uri = work_b.uri.at_version(Version::Work);

        let both = [Version::Live, Version::Work];
        index.upsert(build_document(&live_a, &both).unwrap()).await.unwrap();
        index.upsert(build_document(&work_a, &both).unwrap()).await.unwrap();
        index.upsert(build_document(&work_b, &[Version::Work]).unwrap()).await.unwrap();

        // ACT
        let preferred = index
            .query(&build_query(&SearchQuery::new().with_preferred_version(Version::Live)))
            .await
            .unwrap();
        let live_only = index
            .query(&build_query(&SearchQuery::new().with_version(Version::Live)))
            .await
            .unwrap();

        // ASSERT: one document per identifier
        assert_eq!(preferred.hits, 2);
        let mut versions: Vec<(String, Version)> = preferred
            .items
            .iter()
            .map(|item| (item.path.clone().unwrap(), item.version))
            .collect();
        versions.sort();
        assert_eq!(
            versions,
            vec![("/a".to_string(), Version::Live), ("/b".to_string(), Version::Work)]
        );
        assert_eq!(live_only.hits, 1);
    }

    #[tokio::test]
    async fn test_sorting_and_pagination() {
        let index = MemoryIndex::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut pages = Vec::new();
        for i in 0..5 {
            let mut p = page(&format!("/p{}", i), "Page");
            p.set_modified(User::new("amelie"), base + Duration::days(i));
            pages.push(p);
        }
        index_all(&index, &pages).await;

        let result = index
            .query(&build_query(
                &SearchQuery::new()
                    .sort_by_modification_date(SortOrder::Descending)
                    .with_offset(2)
                    .with_limit(2),
            ))
            .await
            .unwrap();

        assert_eq!(result.hits, 5);
        assert_eq!(result.documents(), 2);
        assert_eq!(result.page, 2);
        let paths: Vec<&str> = result.items.iter().filter_map(|i| i.path.as_deref()).collect();
        assert_eq!(paths, vec!["/p2", "/p1"]);
    }

    #[tokio::test]
    async fn test_non_positive_limit_yields_nothing() {
        let index = MemoryIndex::new();
        index_all(&index, &[page("/a", "A")]).await;

        let none = index
            .query(&build_query(&SearchQuery::new().with_limit(0)))
            .await
            .unwrap();
        let unbounded = index.query(&build_query(&SearchQuery::new())).await.unwrap();

        assert_eq!(none.documents(), 0);
        assert_eq!(none.hits, 1);
        assert_eq!(unbounded.documents(), 1);
    }

    #[tokio::test]
    async fn test_recency_priority_orders_recent_first() {
        let index = MemoryIndex::new();
        let mut old = page("/old", "Report");
        old.set_modified(User::new("amelie"), Utc::now() - Duration::days(400));
        let mut fresh = page("/fresh", "Report");
        fresh.set_modified(User::new("amelie"), Utc::now() - Duration::days(2));
        index_all(&index, &[old, fresh]).await;

        let result = index
            .query(&build_query(&SearchQuery::new().with_text("report").with_recency_priority()))
            .await
            .unwrap();

        assert_eq!(result.items[0].path.as_deref(), Some("/fresh"));
        assert!(result.items[0].score > result.items[1].score);
    }

    #[tokio::test]
    async fn test_items_carry_serialized_resource() {
        let index = MemoryIndex::new();
        let resource = page("/a", "A");
        index_all(&index, &[resource.clone()]).await;

        let result = index.query(&NativeQuery::all()).await.unwrap();

        assert_eq!(result.items[0].resource.as_ref(), Some(&resource));
    }

    // ============================================================
    // SUGGESTION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_suggest_by_prefix() {
        let index = MemoryIndex::new();
        let mut first = page("/a", "A");
        first.add_subject("Topic");
        first.add_subject("Another subject");
        let mut second = page("/b", "B");
        second.add_subject("Another topic");
        index_all(&index, &[first, second]).await;

        let topic = index.suggest(SUBJECT, "topic", 10).await.unwrap();
        let another = index.suggest(SUBJECT, "Another", 10).await.unwrap();
        let limited = index.suggest(SUBJECT, "Another", 1).await.unwrap();

        assert_eq!(topic, vec!["Topic"]);
        assert_eq!(another.len(), 2);
        assert_eq!(limited.len(), 1);
    }

    // ============================================================
    // SYNCHRONIZATION TESTS
    // ============================================================

    fn synchronizer(store: &MemoryStore, index: &MemoryIndex, retry_attempts: usize) -> IndexSynchronizer {
        IndexSynchronizer::new(
            Arc::new(store.clone()),
            Arc::new(index.clone()),
            SyncSettings {
                retry_attempts,
                ..Default::default()
            },
        )
    }

    async fn store_with_page() -> (MemoryStore, Resource) {
        let store = MemoryStore::new();
        let root = store
            .put(page("/", "Home"))
            .await
            .unwrap();
        (store, root)
    }

    #[tokio::test]
    async fn test_sentinel_is_hidden() {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        let sync = synchronizer(&store, &index, 1);

        assert_eq!(sync.ensure_sentinel().await.unwrap(), INDEX_VERSION);
        assert_eq!(sync.index_version().await.unwrap(), Some(INDEX_VERSION));
        assert_eq!(index.document_count().await.unwrap(), 1);
        assert_eq!(index.query(&NativeQuery::all()).await.unwrap().hits, 0);
    }

    #[tokio::test]
    async fn test_refresh_projects_all_revisions() {
        // ARRANGE
        let (store, live) = store_with_page().await;
        let mut work = live.clone();
        work.uri = live.uri.at_version(Version::Work);
        store.put(work.clone()).await.unwrap();
        let index = MemoryIndex::new();
        let sync = synchronizer(&store, &index, 1);

        // ACT
        sync.schedule(live.uri.key());
        sync.settle().await;

        // ASSERT
        let live_doc = index.get(&live.uri.uid()).await.unwrap().unwrap();
        assert_eq!(live_doc.first_number(ALTERNATE_VERSION), Some(1));
        assert!(index.get(&work.uri.uid()).await.unwrap().is_some());

        // ACT: drop WORK and resynchronize
        store.delete(&work.uri, false).await.unwrap();
        sync.remove(&work.uri, false).await;
        sync.settle().await;

        // ASSERT
        assert!(index.get(&work.uri.uid()).await.unwrap().is_none());
        let live_doc = index.get(&live.uri.uid()).await.unwrap().unwrap();
        assert!(!live_doc.has(ALTERNATE_VERSION));
    }

    #[tokio::test]
    async fn test_refresh_retries_transient_failures() {
        let (store, root) = store_with_page().await;
        let index = MemoryIndex::new();
        let sync = synchronizer(&store, &index, 3);
        index.fail_next(1);

        sync.schedule(root.uri.key());
        sync.settle().await;

        assert!(index.get(&root.uri.uid()).await.unwrap().is_some());
        assert!(sync.health().healthy);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_stale_until_resync() {
        // ARRANGE
        let (store, root) = store_with_page().await;
        let index = MemoryIndex::new();
        let sync = synchronizer(&store, &index, 1);
        index.fail_next(1);

        // ACT
        sync.schedule(root.uri.key());
        sync.settle().await;

        // ASSERT
        let health = sync.health();
        assert!(!health.healthy);
        assert_eq!(health.stale, 1);
        assert!(health.last_error.is_some());
        assert!(sync.is_stale(&root.uri.key()));

        // ACT: index is back
        assert_eq!(sync.resync_stale(), 1);
        sync.settle().await;

        // ASSERT
        assert!(sync.health().healthy);
        assert!(index.get(&root.uri.uid()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rebuild_reprojects_store() {
        let (store, root) = store_with_page().await;
        store.put(page("/a", "A")).await.unwrap();
        let index = MemoryIndex::new();
        let sync = synchronizer(&store, &index, 1);

        let documents = sync.rebuild(SITE).await.unwrap();

        assert_eq!(documents, 2);
        assert_eq!(index.document_count().await.unwrap(), 3, "two resources plus the sentinel");
        assert!(index.get(&root.uri.uid()).await.unwrap().is_some());
    }

    // ============================================================
    // INTEGRITY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_referenced_resource_cannot_be_deleted() {
        // ARRANGE: B links to A
        let (store, _) = store_with_page().await;
        let a = store.put(page("/a", "A")).await.unwrap();
        let mut b = page("/b", "B");
        b.add_pagelet("main", Pagelet::new("link", "internal").with_property(RESOURCE_REFERENCE_PROPERTY, a.identifier()));
        let b = store.put(b).await.unwrap();
        let index = MemoryIndex::new();
        index_all(&index, &[a.clone(), b.clone()]).await;
        let checker = IntegrityChecker::new(Arc::new(index.clone()), std::time::Duration::from_secs(1));

        // ACT
        let result = checker.check_delete(&store, &a.uri, true).await;

        // ASSERT
        match result {
            Err(RepositoryError::ReferentialIntegrity { identifier, referrers }) => {
                assert_eq!(identifier, a.identifier());
                assert_eq!(referrers, vec![b.identifier().to_string()]);
            }
            other => panic!("expected ReferentialIntegrity, got {:?}", other),
        }
        assert!(checker.check_delete(&store, &b.uri, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_destructive_delete_skips_check() {
        let (store, _) = store_with_page().await;
        let a = store.put(page("/a", "A")).await.unwrap();
        let mut work = a.clone();
        work.uri = a.uri.at_version(Version::Work);
        store.put(work.clone()).await.unwrap();
        let index = MemoryIndex::new();
        index.fail_next(1);
        let checker = IntegrityChecker::new(Arc::new(index.clone()), std::time::Duration::from_secs(1));

        // WORK is not the last revision, the index is never asked
        assert!(checker.check_delete(&store, &work.uri, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_integrity_check_fails_closed() {
        let (store, _) = store_with_page().await;
        let a = store.put(page("/a", "A")).await.unwrap();
        let index = MemoryIndex::new();
        index.fail_next(1);
        let checker = IntegrityChecker::new(Arc::new(index.clone()), std::time::Duration::from_secs(1));

        let result = checker.check_delete(&store, &a.uri, true).await;

        assert!(matches!(result, Err(RepositoryError::IndexUnavailable(_))));
    }
}
