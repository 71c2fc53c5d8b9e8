//! In-memory storage backend
//!
//! [`MemoryBackend`] keeps one entry type in a `BTreeMap` behind a
//! `tokio::sync::RwLock`. It supports auto-incrementing ids, soft delete,
//! required and unique columns, ordering, windowing and eager loading from
//! linked backends. Clones share the same table.
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{EntryModel, EntryRepository, MemoryBackend, Relation};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let authors = MemoryBackend::new();
//! let posts = MemoryBackend::new()
//!     .require("title")
//!     .unique("slug")
//!     .with_related("author", authors.clone());
//!
//! let model = EntryModel::new("posts").relation("author", Relation::belongs_to("author_id"));
//! let repo = EntryRepository::new(posts, model);
//!
//! let post = repo
//!     .create(json!({"title": "Hello", "slug": "hello"}).as_object().unwrap().clone())
//!     .await
//!     .unwrap();
//! assert_eq!(post.id, Some(1));
//! # }
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::RepositoryConfig;

use super::entry::{compare_values, Attributes, Entry, EntryId};
use super::error::{RepositoryError, RepositoryOperation};
use super::events::{EntryEvent, EntryEventKind, EventDispatcher};
use super::model::{EntryModel, Relation};
use super::pagination::{FilterCondition, FilterOperator, FilterValue, OrderDirection};
use super::query::{QuerySpec, TrashedMode};
use super::traits::{RepositoryResult, StorageBackend};

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<EntryId, Entry>,
    last_id: EntryId,
}

#[derive(Debug, Clone, Default)]
struct Constraints {
    required: Vec<String>,
    unique: Vec<String>,
}

/// Entry storage held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    table: Arc<RwLock<MemoryTable>>,
    constraints: Arc<Constraints>,
    related: Arc<BTreeMap<String, MemoryBackend>>,
    events: EventDispatcher,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend sized from configuration
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new().with_events(EventDispatcher::with_capacity(config.event_capacity))
    }

    /// Use a specific dispatcher for change notifications
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Reject writes that leave `column` missing, null or empty
    #[must_use]
    pub fn require(mut self, column: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.constraints).required.push(column.into());
        self
    }

    /// Reject writes that duplicate a value of `column`, trashed rows included
    #[must_use]
    pub fn unique(mut self, column: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.constraints).unique.push(column.into());
        self
    }

    /// Link the backend that resolves the relation `name`
    #[must_use]
    pub fn with_related(mut self, name: impl Into<String>, backend: MemoryBackend) -> Self {
        Arc::make_mut(&mut self.related).insert(name.into(), backend);
        self
    }

    /// Store entries verbatim, keeping their ids and timestamps
    ///
    /// Entries without an id receive the next free one. Constraints are not
    /// checked and no events are published.
    pub async fn seed(&self, entries: impl IntoIterator<Item = Entry>) -> Vec<EntryId> {
        let mut table = self.table.write().await;
        let mut ids = Vec::new();
        for mut entry in entries {
            let id = match entry.id {
                Some(id) => id,
                None => table.last_id + 1,
            };
            table.last_id = table.last_id.max(id);
            entry.id = Some(id);
            entry.relations.clear();
            table.rows.insert(id, entry);
            ids.push(id);
        }
        ids
    }

    /// Every non-trashed row, ascending by id
    pub async fn live_rows(&self) -> Vec<Entry> {
        let table = self.table.read().await;
        table.rows.values().filter(|e| !e.is_trashed()).cloned().collect()
    }

    /// Number of physically stored rows, trashed ones included
    pub async fn stored_rows(&self) -> usize {
        self.table.read().await.rows.len()
    }

    fn check_constraints(
        &self,
        table: &MemoryTable,
        attributes: &Attributes,
        except: &[EntryId],
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        for column in &self.constraints.required {
            let missing = match attributes.get(column) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(RepositoryError::validation_failed(
                    operation,
                    format!("{} is required", column),
                ));
            }
        }

        for column in &self.constraints.unique {
            let Some(value) = attributes.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = table.rows.iter().any(|(id, row)| {
                !except.contains(id)
                    && compare_values(row.get(column), Some(value)) == Ordering::Equal
            });
            if taken {
                return Err(RepositoryError::constraint_violation(
                    operation,
                    format!("{} must be unique, {} is taken", column, value),
                ));
            }
        }

        Ok(())
    }

    async fn load_relations(
        &self,
        model: &EntryModel,
        rows: &mut [Entry],
        names: &[&str],
    ) -> RepositoryResult<()> {
        for &name in names {
            let relation = model.relation_named(name).ok_or_else(|| {
                RepositoryError::invalid_query(
                    RepositoryOperation::LoadRelations,
                    format!("relation '{}' is not declared", name),
                )
                .with_entity(model.entry_type(), name)
            })?;
            let source = self.related.get(name).ok_or_else(|| {
                RepositoryError::storage_error(
                    RepositoryOperation::LoadRelations,
                    format!("no backend linked for relation '{}'", name),
                )
            })?;
            let candidates = source.live_rows().await;

            for row in rows.iter_mut() {
                let related: Vec<Entry> = match relation {
                    Relation::BelongsTo { foreign_key } => match row.get(foreign_key) {
                        Some(key) if !key.is_null() => candidates
                            .iter()
                            .filter(|c| {
                                compare_values(c.column("id").as_ref(), Some(key)) == Ordering::Equal
                            })
                            .cloned()
                            .collect(),
                        _ => Vec::new(),
                    },
                    Relation::HasMany { foreign_key } => match row.id {
                        Some(id) => {
                            let id = Value::from(id);
                            candidates
                                .iter()
                                .filter(|c| {
                                    compare_values(c.get(foreign_key), Some(&id)) == Ordering::Equal
                                })
                                .cloned()
                                .collect()
                        }
                        None => Vec::new(),
                    },
                };
                row.relations.insert(name.to_string(), related);
            }
        }
        Ok(())
    }

    fn select(table: &MemoryTable, query: &QuerySpec) -> Vec<Entry> {
        let mode = query.trashed_mode();
        table
            .rows
            .values()
            .filter(|entry| visible(entry, mode))
            .filter(|entry| query.filters().all(|condition| matches(entry, condition)))
            .cloned()
            .collect()
    }
}

fn visible(entry: &Entry, mode: TrashedMode) -> bool {
    match mode {
        TrashedMode::Exclude => !entry.is_trashed(),
        TrashedMode::Include => true,
        TrashedMode::Only => entry.is_trashed(),
    }
}

/// Whether an entry satisfies a filter condition
///
/// Nulls follow SQL semantics: they only match `IS NULL`.
fn matches(entry: &Entry, condition: &FilterCondition) -> bool {
    let actual = entry.column(&condition.field).filter(|v| !v.is_null());

    match condition.operator {
        FilterOperator::IsNull => actual.is_none(),
        FilterOperator::IsNotNull => actual.is_some(),
        FilterOperator::Like => match (actual.as_ref().and_then(Value::as_str), &condition.value) {
            (Some(text), FilterValue::String(pattern)) => like(text, pattern),
            _ => false,
        },
        FilterOperator::In => {
            let Some(actual) = actual else {
                return false;
            };
            match &condition.value {
                FilterValue::StringList(list) => {
                    actual.as_str().is_some_and(|s| list.iter().any(|item| item == s))
                }
                FilterValue::IntegerList(list) => list.iter().any(|n| {
                    compare_values(Some(&actual), Some(&Value::from(*n))) == Ordering::Equal
                }),
                single => equal(&actual, &single.to_json()),
            }
        }
        operator => {
            let Some(actual) = actual else {
                return false;
            };
            let expected = condition.value.to_json();
            if expected.is_null() {
                return false;
            }
            if !comparable(&actual, &expected) {
                return operator == FilterOperator::NotEqual;
            }
            let ordering = compare_values(Some(&actual), Some(&expected));
            match operator {
                FilterOperator::Equal => ordering == Ordering::Equal,
                FilterOperator::NotEqual => ordering != Ordering::Equal,
                FilterOperator::GreaterThan => ordering == Ordering::Greater,
                FilterOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                FilterOperator::LessThan => ordering == Ordering::Less,
                FilterOperator::LessThanOrEqual => ordering != Ordering::Greater,
                FilterOperator::Like
                | FilterOperator::In
                | FilterOperator::IsNull
                | FilterOperator::IsNotNull => false,
            }
        }
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn equal(a: &Value, b: &Value) -> bool {
    comparable(a, b) && compare_values(Some(a), Some(b)) == Ordering::Equal
}

/// Case-insensitive SQL LIKE: `%` matches any run, `_` exactly one character
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern[..j] matches the text consumed so far
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for j in 1..=pattern.len() {
        matched[j] = matched[j - 1] && pattern[j - 1] == '%';
    }

    for &c in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matched[j],
                '_' => matched[j - 1],
                p => matched[j - 1] && p == c,
            };
        }
        matched = next;
    }

    matched[pattern.len()]
}

fn sort(rows: &mut [Entry], orderings: &[(String, OrderDirection)]) {
    if orderings.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (column, direction) in orderings {
            let ordering = compare_values(a.column(column).as_ref(), b.column(column).as_ref());
            let ordering = match direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn window(rows: Vec<Entry>, offset: Option<u64>, limit: Option<u64>) -> Vec<Entry> {
    let skip = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(take).collect()
}

impl StorageBackend for MemoryBackend {
    async fn fetch(&self, model: &EntryModel, query: &QuerySpec) -> RepositoryResult<Vec<Entry>> {
        let mut rows = {
            let table = self.table.read().await;
            Self::select(&table, query)
        };

        let orderings: Vec<(String, OrderDirection)> = query
            .orderings()
            .map(|(column, direction)| (column.to_string(), direction))
            .collect();
        sort(&mut rows, &orderings);
        let mut rows = window(rows, query.offset_value(), query.limit_value());

        let relations = query.relations();
        if !relations.is_empty() {
            self.load_relations(model, &mut rows, &relations).await?;
        }
        Ok(rows)
    }

    async fn count(&self, _model: &EntryModel, query: &QuerySpec) -> RepositoryResult<u64> {
        let table = self.table.read().await;
        Ok(Self::select(&table, &query.for_count()).len() as u64)
    }

    async fn exists(&self, _model: &EntryModel, id: EntryId, include_trashed: bool) -> RepositoryResult<bool> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .get(&id)
            .is_some_and(|row| include_trashed || !row.is_trashed()))
    }

    async fn insert(&self, model: &EntryModel, attributes: Attributes) -> RepositoryResult<Entry> {
        let entry = {
            let mut table = self.table.write().await;
            self.check_constraints(&table, &attributes, &[], RepositoryOperation::Create)?;
            let now = Utc::now();
            table.last_id += 1;
            let id = table.last_id;
            let entry = Entry {
                id: Some(id),
                attributes,
                created_at: Some(now),
                updated_at: Some(now),
                deleted_at: None,
                relations: BTreeMap::new(),
            };
            table.rows.insert(id, entry.clone());
            entry
        };

        self.events.dispatch(EntryEvent::new(EntryEventKind::Created, model.entry_type(), entry.id));
        Ok(entry)
    }

    async fn save(&self, model: &EntryModel, entry: &Entry) -> RepositoryResult<Entry> {
        let Some(id) = entry.id else {
            let created = self.insert(model, entry.attributes.clone()).await?;
            self.events.dispatch(EntryEvent::new(EntryEventKind::Saved, model.entry_type(), created.id));
            return Ok(created);
        };

        let saved = {
            let mut table = self.table.write().await;
            if !table.rows.contains_key(&id) {
                return Err(RepositoryError::not_found(model.entry_type(), id.to_string())
                    .with_operation(RepositoryOperation::Save));
            }
            self.check_constraints(&table, &entry.attributes, &[id], RepositoryOperation::Save)?;
            let row = table.rows.get_mut(&id).ok_or_else(|| {
                RepositoryError::not_found(model.entry_type(), id.to_string())
                    .with_operation(RepositoryOperation::Save)
            })?;
            row.attributes = entry.attributes.clone();
            row.updated_at = Some(Utc::now());
            row.clone()
        };

        self.events.dispatch(EntryEvent::new(EntryEventKind::Saved, model.entry_type(), saved.id));
        Ok(saved)
    }

    async fn update_matching(
        &self,
        model: &EntryModel,
        query: &QuerySpec,
        attributes: Attributes,
    ) -> RepositoryResult<u64> {
        let touched = {
            let mut table = self.table.write().await;
            let ids: Vec<EntryId> = Self::select(&table, &query.for_count())
                .into_iter()
                .filter_map(|entry| entry.id)
                .collect();

            if ids.len() > 1 {
                if let Some(column) = self
                    .constraints
                    .unique
                    .iter()
                    .find(|column| attributes.get(column.as_str()).is_some_and(|v| !v.is_null()))
                {
                    return Err(RepositoryError::constraint_violation(
                        RepositoryOperation::Update,
                        format!("{} must be unique, cannot assign one value to {} entries", column, ids.len()),
                    ));
                }
            }

            let mut merged_rows = Vec::with_capacity(ids.len());
            for id in &ids {
                let Some(row) = table.rows.get(id) else {
                    continue;
                };
                let mut merged = row.attributes.clone();
                for (column, value) in &attributes {
                    merged.insert(column.clone(), value.clone());
                }
                self.check_constraints(&table, &merged, &[*id], RepositoryOperation::Update)?;
                merged_rows.push((*id, merged));
            }

            let now = Utc::now();
            for (id, merged) in &merged_rows {
                if let Some(row) = table.rows.get_mut(id) {
                    row.attributes = merged.clone();
                    row.updated_at = Some(now);
                }
            }
            merged_rows.len() as u64
        };

        if touched > 0 {
            self.events.dispatch(EntryEvent::new(EntryEventKind::Updated, model.entry_type(), None));
        }
        Ok(touched)
    }

    async fn soft_delete(&self, model: &EntryModel, id: EntryId) -> RepositoryResult<Option<Entry>> {
        let deleted = {
            let mut table = self.table.write().await;
            match table.rows.get_mut(&id) {
                Some(row) if !row.is_trashed() => {
                    let now = Utc::now();
                    row.deleted_at = Some(now);
                    row.updated_at = Some(now);
                    Some(row.clone())
                }
                _ => None,
            }
        };

        if deleted.is_some() {
            self.events.dispatch(EntryEvent::new(EntryEventKind::Deleted, model.entry_type(), Some(id)));
        }
        Ok(deleted)
    }

    async fn restore(&self, model: &EntryModel, id: EntryId) -> RepositoryResult<Option<Entry>> {
        let restored = {
            let mut table = self.table.write().await;
            match table.rows.get_mut(&id) {
                Some(row) if row.is_trashed() => {
                    row.deleted_at = None;
                    row.updated_at = Some(Utc::now());
                    Some(row.clone())
                }
                _ => None,
            }
        };

        if restored.is_some() {
            self.events.dispatch(EntryEvent::new(EntryEventKind::Restored, model.entry_type(), Some(id)));
        }
        Ok(restored)
    }

    async fn force_delete(&self, model: &EntryModel, id: EntryId) -> RepositoryResult<bool> {
        let removed = self.table.write().await.rows.remove(&id).is_some();
        if removed {
            self.events.dispatch(EntryEvent::new(EntryEventKind::ForceDeleted, model.entry_type(), Some(id)));
        }
        Ok(removed)
    }

    async fn purge(&self, model: &EntryModel) -> RepositoryResult<u64> {
        let purged = {
            let mut table = self.table.write().await;
            let purged = table.rows.len() as u64;
            table.rows.clear();
            table.last_id = 0;
            purged
        };
        self.events.dispatch(EntryEvent::new(EntryEventKind::Truncated, model.entry_type(), None));
        Ok(purged)
    }

    fn events(&self) -> &EventDispatcher {
        &self.events
    }
}
