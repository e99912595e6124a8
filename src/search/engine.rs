use super::builder::{BoolQuery, Clause, NativeQuery, SortKey};
use super::document::{FieldValue, IndexDocument};
use super::query::SortOrder;
use super::schema::*;
use super::types::{SearchResult, SearchResultItem};
use crate::error::{RepositoryError, Result};
use crate::resource::{Resource, Version};

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// The search index service.
///
/// Only the index synchronizer writes to it. Errors map to `IndexUnavailable`.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Inserts or replaces the document with the same uid.
    async fn upsert(&self, document: IndexDocument) -> Result<()>;

    async fn delete(&self, uid: &str) -> Result<bool>;

    async fn get(&self, uid: &str) -> Result<Option<IndexDocument>>;

    async fn query(&self, query: &NativeQuery) -> Result<SearchResult>;

    /// Up to `limit` distinct values of `field` starting with `seed` (case-insensitive),
    /// most frequent first.
    async fn suggest(&self, field: &str, seed: &str, limit: usize) -> Result<Vec<String>>;

    async fn clear(&self) -> Result<()>;

    /// Documents held, sentinel included.
    async fn document_count(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct Faults {
    failing_calls: AtomicUsize,
    delay_ms: AtomicU64,
}

/// In-memory index evaluating boolean queries with term-frequency scoring.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    documents: Arc<RwLock<BTreeMap<String, IndexDocument>>>,
    faults: Arc<Faults>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.faults.failing_calls.store(count, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.faults
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn check(&self, operation: &str) -> Result<()> {
        let delay = self.faults.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failed = self
            .faults
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RepositoryError::IndexUnavailable(format!("{} rejected", operation)));
        }
        Ok(())
    }
}

/// Score of a matching clause, `None` if it does not match.
fn score_clause(clause: &Clause, doc: &IndexDocument) -> Option<f64> {
    match clause {
        Clause::Term { field, value } => {
            let count = doc.values(field).iter().filter(|v| *v == value).count();
            (count > 0).then_some(count as f64)
        }
        Clause::Terms { field, values } => {
            let count = doc
                .values(field)
                .iter()
                .filter(|v| values.contains(*v))
                .count();
            (count > 0).then_some(count as f64)
        }
        Clause::Range { field, from, to } => doc
            .values(field)
            .iter()
            .filter_map(FieldValue::as_number)
            .any(|n| from.is_none_or(|f| n >= f) && to.is_none_or(|t| n <= t))
            .then_some(1.0),
        Clause::Exists { field } => doc.has(field).then_some(1.0),
        Clause::Bool(query) => score_bool(query, doc),
    }
}

fn score_bool(query: &BoolQuery, doc: &IndexDocument) -> Option<f64> {
    let mut score = 0.0;
    for clause in &query.must {
        score += score_clause(clause, doc)?;
    }
    if !query.should.is_empty() {
        let matched: Vec<f64> = query
            .should
            .iter()
            .filter_map(|clause| score_clause(clause, doc))
            .collect();
        if matched.is_empty() {
            return None;
        }
        score += matched.iter().sum::<f64>();
    }
    if query
        .must_not
        .iter()
        .any(|clause| score_clause(clause, doc).is_some())
    {
        return None;
    }
    for (clause, boost) in &query.boosts {
        if score_clause(clause, doc).is_some() {
            score += boost;
        }
    }
    Some(score)
}

fn compare(a: &(f64, &IndexDocument), b: &(f64, &IndexDocument), sort: &[SortKey]) -> CmpOrdering {
    for key in sort {
        let ordering = match key {
            SortKey::Score => b.0.partial_cmp(&a.0).unwrap_or(CmpOrdering::Equal),
            SortKey::Field { field, order } => match (a.1.first_number(field), b.1.first_number(field)) {
                (Some(x), Some(y)) => match order {
                    SortOrder::Ascending => x.cmp(&y),
                    SortOrder::Descending => y.cmp(&x),
                },
                (Some(_), None) => CmpOrdering::Less,
                (None, Some(_)) => CmpOrdering::Greater,
                (None, None) => CmpOrdering::Equal,
            },
        };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    a.1.uid.cmp(&b.1.uid)
}

fn to_item(score: f64, doc: &IndexDocument) -> SearchResultItem {
    let resource = doc.first_text(SERIALIZED).and_then(|json| {
        serde_json::from_str::<Resource>(json)
            .map_err(|e| tracing::warn!("Unreadable serialized resource in {}: {}", doc.uid, e))
            .ok()
    });
    SearchResultItem {
        uid: doc.uid.clone(),
        identifier: doc.first_text(ID).unwrap_or_default().to_string(),
        path: doc.first_text(PATH).map(str::to_string),
        version: Version::from_number(doc.first_number(VERSION).unwrap_or_default().max(0) as u64),
        resource_type: doc.first_text(TYPE).unwrap_or_default().to_string(),
        score,
        resource,
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert(&self, document: IndexDocument) -> Result<()> {
        self.check("upsert").await?;
        let mut documents = self.documents.write().await;
        tracing::trace!("Indexing {}", document.uid);
        documents.insert(document.uid.clone(), document);
        Ok(())
    }

    async fn delete(&self, uid: &str) -> Result<bool> {
        self.check("delete").await?;
        let mut documents = self.documents.write().await;
        Ok(documents.remove(uid).is_some())
    }

    async fn get(&self, uid: &str) -> Result<Option<IndexDocument>> {
        self.check("get").await?;
        let documents = self.documents.read().await;
        Ok(documents.get(uid).cloned())
    }

    async fn query(&self, query: &NativeQuery) -> Result<SearchResult> {
        self.check("query").await?;
        let documents = self.documents.read().await;

        let mut matches: Vec<(f64, &IndexDocument)> = documents
            .values()
            .filter_map(|doc| score_bool(&query.query, doc).map(|score| (score, doc)))
            .collect();
        matches.sort_by(|a, b| compare(a, b, &query.sort));

        let hits = matches.len();
        let items = matches
            .iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(score, doc)| to_item(*score, doc))
            .collect();
        Ok(SearchResult::new(hits, query.offset, query.limit, items))
    }

    async fn suggest(&self, field: &str, seed: &str, limit: usize) -> Result<Vec<String>> {
        self.check("suggest").await?;
        let documents = self.documents.read().await;
        let seed = seed.to_lowercase();

        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for doc in documents.values().filter(|doc| doc.uid != SENTINEL_UID) {
            for value in doc.values(field).iter().filter_map(FieldValue::as_text) {
                if value.to_lowercase().starts_with(&seed) {
                    *frequency.entry(value).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(value, _)| value.to_string())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.check("clear").await?;
        self.documents.write().await.clear();
        Ok(())
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }
}
