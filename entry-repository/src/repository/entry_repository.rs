//! The entry repository façade
//!
//! [`EntryRepository`] wraps a [`StorageBackend`] for one entry type and adds
//! everything callers expect from a repository: lookups with or without
//! eager-loaded relations, mass-assignment protection, soft delete and
//! restore, parameter-driven pagination, a per-entry-type cache, a scoped
//! "without events" block and named extension hooks.
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{EntryModel, EntryRepository, MemoryBackend, PaginateParams};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), entry_repository::repository::RepositoryError> {
//! let repo = EntryRepository::new(MemoryBackend::new(), EntryModel::new("posts"));
//!
//! for title in ["one", "two", "three"] {
//!     let attributes = json!({ "title": title }).as_object().cloned().unwrap_or_default();
//!     repo.create(attributes).await?;
//! }
//!
//! let page = repo.paginate(PaginateParams::new().per_page(2)).await?;
//! assert_eq!(page.items.len(), 2);
//! assert_eq!(page.total, Some(3));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::RepositoryConfig;

use super::cache::{CacheStore, EntryCache};
use super::entry::{Attributes, Entry, EntryId};
use super::events::{EntryEvent, EventDispatcher};
use super::hooks::HookRegistry;
use super::model::EntryModel;
use super::pagination::{FilterCondition, FilterValue, OrderDirection, Page, PaginatorKind};
use super::query::{PaginateParams, QueryOp, QuerySpec};
use super::traits::{RepositoryResult, StorageBackend};

/// Repository for one entry type over a storage backend
#[derive(Debug, Clone)]
pub struct EntryRepository<B> {
    backend: B,
    model: EntryModel,
    hooks: Arc<HookRegistry>,
    cache: EntryCache,
    config: RepositoryConfig,
    guarded: bool,
}

impl<B: StorageBackend> EntryRepository<B> {
    /// Create a repository with default configuration and no hooks
    pub fn new(backend: B, model: EntryModel) -> Self {
        let cache = EntryCache::new(model.entry_type());
        Self {
            backend,
            model,
            hooks: Arc::new(HookRegistry::empty()),
            cache,
            config: RepositoryConfig::default(),
            guarded: true,
        }
    }

    /// Apply repository configuration
    #[must_use]
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.cache = self.cache.enabled(config.cache_enabled);
        self.config = config;
        self
    }

    /// Attach a frozen hook registry
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl Into<Arc<HookRegistry>>) -> Self {
        self.hooks = hooks.into();
        self
    }

    /// Share a cache store with other repositories
    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<CacheStore>) -> Self {
        self.cache = EntryCache::with_store(self.model.entry_type(), store).enabled(self.config.cache_enabled);
        self
    }

    /// The storage backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Repository configuration in effect
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The model description
    pub fn model(&self) -> &EntryModel {
        &self.model
    }

    /// Replace the model description
    ///
    /// The cache follows the new entry type.
    pub fn set_model(&mut self, model: EntryModel) -> &mut Self {
        self.cache = self.cache.rescoped(model.entry_type());
        self.model = model;
        self
    }

    fn entry_type(&self) -> &str {
        self.model.entry_type()
    }

    /// Query with the model's default eager loads
    fn default_query(&self) -> QuerySpec {
        QuerySpec::new().extend(
            self.model
                .eager_relations()
                .iter()
                .map(|name| QueryOp::With(name.clone())),
        )
    }

    async fn first_of(&self, query: QuerySpec) -> RepositoryResult<Option<Entry>> {
        let rows = self.backend.fetch(&self.model, &query.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every live entry, with default relations
    ///
    /// Unbounded; prefer [`paginate`](Self::paginate) for large tables.
    pub async fn all(&self) -> RepositoryResult<Vec<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), "Fetching all entries");
        self.backend.fetch(&self.model, &self.default_query()).await
    }

    /// Every entry, trashed ones included
    pub async fn all_with_trashed(&self) -> RepositoryResult<Vec<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), "Fetching all entries with trashed");
        self.backend
            .fetch(&self.model, &self.default_query().with_trashed())
            .await
    }

    /// Every live entry, skipping eager loads
    pub async fn all_without_relations(&self) -> RepositoryResult<Vec<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), "Fetching all entries without relations");
        self.backend.fetch(&self.model, &QuerySpec::new()).await
    }

    /// A live entry by id
    pub async fn find(&self, id: EntryId) -> RepositoryResult<Option<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), entry_id = id, "Finding entry");
        self.first_of(self.default_query().filter(FilterCondition::eq("id", id)))
            .await
    }

    /// A live entry by id, skipping eager loads
    pub async fn find_without_relations(&self, id: EntryId) -> RepositoryResult<Option<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), entry_id = id, "Finding entry without relations");
        self.first_of(QuerySpec::new().filter(FilterCondition::eq("id", id)))
            .await
    }

    /// The first live entry whose column equals `value`
    pub async fn find_by(
        &self,
        column: &str,
        value: impl Into<FilterValue>,
    ) -> RepositoryResult<Option<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), column, "Finding entry by column");
        self.first_of(self.default_query().filter(column_equals(column, value.into())))
            .await
    }

    /// Live entries with the given ids, ascending by id
    pub async fn find_all(&self, ids: &[EntryId]) -> RepositoryResult<Vec<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), ids = ids.len(), "Finding entries by id");
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .default_query()
            .filter(FilterCondition::in_integers("id", ids.to_vec()));
        self.backend.fetch(&self.model, &query).await
    }

    /// Every live entry whose column equals `value`
    pub async fn find_all_by(
        &self,
        column: &str,
        value: impl Into<FilterValue>,
    ) -> RepositoryResult<Vec<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), column, "Finding entries by column");
        let query = self.default_query().filter(column_equals(column, value.into()));
        self.backend.fetch(&self.model, &query).await
    }

    /// An entry by id whether or not it is trashed
    pub async fn find_trashed(&self, id: EntryId) -> RepositoryResult<Option<Entry>> {
        tracing::debug!(entry_type = %self.entry_type(), entry_id = id, "Finding entry with trashed");
        let query = self
            .default_query()
            .with_trashed()
            .order_by("id", OrderDirection::Ascending)
            .filter(FilterCondition::eq("id", id));
        self.first_of(query).await
    }

    /// Number of live entries
    pub async fn count(&self) -> RepositoryResult<u64> {
        let count = self.backend.count(&self.model, &QuerySpec::new()).await?;
        tracing::debug!(entry_type = %self.entry_type(), count, "Counted entries");
        Ok(count)
    }

    /// Every live entry ordered by the model's sort column
    pub async fn sorted(&self, direction: OrderDirection) -> RepositoryResult<Vec<Entry>> {
        let query = self.default_query().order_by(self.model.sort_by(), direction);
        self.backend.fetch(&self.model, &query).await
    }

    /// The first live entry by the model's sort column
    pub async fn first(&self, direction: OrderDirection) -> RepositoryResult<Option<Entry>> {
        let query = self.default_query().order_by(self.model.sort_by(), direction);
        self.first_of(query).await
    }

    /// The most recently written live entry
    ///
    /// Ties on `updated_at` go to the later `created_at`.
    pub async fn last_modified(&self) -> RepositoryResult<Option<Entry>> {
        let query = self
            .default_query()
            .order_by("updated_at", OrderDirection::Descending)
            .order_by("created_at", OrderDirection::Descending);
        self.first_of(query).await
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    /// Resolve parameters into a query: scope first, then the caller's
    /// operations in order, then default eager loads
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for an undeclared scope.
    pub fn build_query(&self, params: &PaginateParams) -> RepositoryResult<QuerySpec> {
        let mut query = QuerySpec::new();
        if let Some(scope) = &params.scope {
            query = query.extend(self.model.apply_scope(&scope.name, &scope.arguments)?);
        }
        query = query.extend(params.ops.iter().cloned());
        let eager = self.default_query();
        Ok(query.extend(eager.ops().iter().cloned()))
    }

    /// A page of entries
    ///
    /// The page size falls back to the configured default and is capped at
    /// `max_per_page`; the page number defaults to 1. Length-aware pages carry
    /// the total, simple pages only report whether another page exists.
    pub async fn paginate(&self, params: PaginateParams) -> RepositoryResult<Page<Entry>> {
        let per_page = self.config.page_size(params.per_page);
        let page = params.page.unwrap_or(1).max(1);
        let offset = (page - 1).saturating_mul(per_page);
        let query = self.build_query(&params)?;

        tracing::debug!(
            entry_type = %self.entry_type(),
            per_page,
            page,
            ops = query.ops().len(),
            "Paginating entries"
        );

        match params.paginator {
            PaginatorKind::LengthAware => {
                let total = self.backend.count(&self.model, &query).await?;
                let items = self
                    .backend
                    .fetch(&self.model, &query.offset(offset).limit(per_page))
                    .await?;
                Ok(Page::length_aware(items, per_page, page, total))
            }
            PaginatorKind::Simple => {
                let mut items = self
                    .backend
                    .fetch(&self.model, &query.offset(offset).limit(per_page.saturating_add(1)))
                    .await?;
                let keep = usize::try_from(per_page).unwrap_or(usize::MAX);
                let has_more = items.len() > keep;
                items.truncate(keep);
                Ok(Page::simple(items, per_page, page, has_more))
            }
        }
    }

    /// Parse JSON parameters and paginate
    pub async fn paginate_json(&self, parameters: Value) -> RepositoryResult<Page<Entry>> {
        self.paginate(PaginateParams::from_json(parameters)?).await
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Enable mass-assignment protection
    pub fn guard(&mut self) -> &mut Self {
        self.guarded = true;
        self
    }

    /// Disable mass-assignment protection
    pub fn unguard(&mut self) -> &mut Self {
        self.guarded = false;
        self
    }

    /// Whether mass-assignment protection is on
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Drop attributes that may not be mass assigned while guarded
    fn fill(&self, mut attributes: Attributes) -> Attributes {
        if self.guarded {
            let before = attributes.len();
            attributes.retain(|column, _| self.model.is_fillable(column));
            if attributes.len() != before {
                tracing::debug!(
                    entry_type = %self.entry_type(),
                    dropped = before - attributes.len(),
                    "Dropped guarded attributes"
                );
            }
        }
        attributes
    }

    /// An unsaved entry; [`save`](Self::save) persists it
    pub fn new_instance(&self, attributes: Attributes) -> Entry {
        Entry::new(self.fill(attributes))
    }

    /// Persist a new entry
    ///
    /// # Errors
    ///
    /// Backend constraint failures surface as `ValidationFailed` or
    /// `ConstraintViolation`.
    pub async fn create(&self, attributes: Attributes) -> RepositoryResult<Entry> {
        let entry = self.backend.insert(&self.model, self.fill(attributes)).await?;
        self.cache.flush();
        tracing::info!(entry_type = %self.entry_type(), entry_id = ?entry.id, "Created entry");
        Ok(entry)
    }

    /// Insert or overwrite an entry, refreshing its id and timestamps
    pub async fn save(&self, entry: &mut Entry) -> RepositoryResult<bool> {
        let mut saved = self.backend.save(&self.model, entry).await?;
        saved.relations = mem::take(&mut entry.relations);
        *entry = saved;
        self.cache.flush();
        tracing::debug!(entry_type = %self.entry_type(), entry_id = ?entry.id, "Saved entry");
        Ok(true)
    }

    /// Merge attributes into every live entry; returns the number touched
    pub async fn update(&self, attributes: Attributes) -> RepositoryResult<u64> {
        let attributes = self.fill(attributes);
        if attributes.is_empty() {
            return Ok(0);
        }
        let touched = self
            .backend
            .update_matching(&self.model, &QuerySpec::new(), attributes)
            .await?;
        self.cache.flush();
        tracing::info!(entry_type = %self.entry_type(), touched, "Updated entries");
        Ok(touched)
    }

    /// Soft delete an entry; returns whether it was live
    pub async fn delete(&self, entry: &mut Entry) -> RepositoryResult<bool> {
        let Some(id) = entry.id else {
            return Ok(false);
        };
        match self.backend.soft_delete(&self.model, id).await? {
            Some(row) => {
                entry.deleted_at = row.deleted_at;
                entry.updated_at = row.updated_at;
                self.cache.flush();
                tracing::debug!(entry_type = %self.entry_type(), entry_id = id, "Deleted entry");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Permanently remove an entry
    ///
    /// Existence is re-checked afterwards, trashed rows included; the result
    /// is `true` only if the entry is really gone.
    pub async fn force_delete(&self, entry: &Entry) -> RepositoryResult<bool> {
        let Some(id) = entry.id else {
            return Ok(true);
        };
        self.backend.force_delete(&self.model, id).await?;
        self.cache.flush();

        let gone = !self.backend.exists(&self.model, id, true).await?;
        if gone {
            tracing::info!(entry_type = %self.entry_type(), entry_id = id, "Force deleted entry");
        } else {
            tracing::warn!(entry_type = %self.entry_type(), entry_id = id, "Entry still exists after force delete");
        }
        Ok(gone)
    }

    /// Clear an entry's soft-delete marker; returns whether it was trashed
    pub async fn restore(&self, entry: &mut Entry) -> RepositoryResult<bool> {
        let Some(id) = entry.id else {
            return Ok(false);
        };
        match self.backend.restore(&self.model, id).await? {
            Some(row) => {
                entry.deleted_at = None;
                entry.updated_at = row.updated_at;
                self.cache.flush();
                tracing::debug!(entry_type = %self.entry_type(), entry_id = id, "Restored entry");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Soft delete every live entry one by one, then purge the store
    ///
    /// Returns the number of rows purged, trashed ones included.
    pub async fn truncate(&self) -> RepositoryResult<u64> {
        for mut entry in self.all_without_relations().await? {
            self.delete(&mut entry).await?;
        }
        let purged = self.backend.purge(&self.model).await?;
        self.cache.flush();
        tracing::info!(entry_type = %self.entry_type(), purged, "Truncated entries");
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// The backend's change-notification sink
    pub fn events(&self) -> &EventDispatcher {
        self.backend.events()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EntryEvent> {
        self.backend.events().subscribe()
    }

    /// Run `f` with change notifications suspended
    ///
    /// Suspension covers the whole dispatcher, so writes made concurrently by
    /// other tasks through the same backend are silent too. Notifications
    /// resume when `f` completes, fails or panics.
    pub async fn without_events<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _paused = self.backend.events().pause();
        f().await
    }

    // ------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------

    /// Cached value for `key`, computed and stored on a miss
    ///
    /// `None` uses the configured default TTL.
    pub async fn cache<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> RepositoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let ttl = ttl.unwrap_or_else(|| self.config.cache_ttl());
        self.cache.remember(key, Some(ttl), compute).await
    }

    /// Cached value for `key` that lives until the next write
    pub async fn cache_forever<T, F, Fut>(&self, key: &str, compute: F) -> RepositoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        self.cache.remember(key, None, compute).await
    }

    /// Drop every cached value for this entry type
    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Whether a hook handles `method`
    pub fn has_hook(&self, method: &str) -> bool {
        self.hooks.has(method)
    }

    /// Route a named call to its hook
    ///
    /// The name is normalized to snake_case first.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` when no hook is registered under the
    /// name; `Ok(None)` means the hook ran and returned nothing.
    pub fn call(&self, method: &str, args: &[Value]) -> RepositoryResult<Option<Value>> {
        self.hooks.call(method, args)
    }
}

fn column_equals(column: &str, value: FilterValue) -> FilterCondition {
    match value {
        FilterValue::Null => FilterCondition::is_null(column),
        value => FilterCondition::eq(column, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        EntryEventKind, MemoryBackend, Relation, RepositoryErrorKind, RepositoryOperation,
    };
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    fn repo() -> EntryRepository<MemoryBackend> {
        EntryRepository::new(MemoryBackend::new(), EntryModel::new("posts"))
    }

    async fn seed(repo: &EntryRepository<MemoryBackend>, n: usize) {
        for i in 0..n {
            repo.create(attrs(json!({"title": format!("post {}", i), "position": i})))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let repo = repo();
        let created = repo
            .create(attrs(json!({"title": "Hello", "status": "draft"})))
            .await
            .unwrap();

        let found = repo.find(created.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(found.attributes, attrs(json!({"title": "Hello", "status": "draft"})));
        assert!(repo.find(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_constraint_failure_propagates() {
        let repo = EntryRepository::new(MemoryBackend::new().require("title"), EntryModel::new("posts"));
        let error = repo.create(attrs(json!({"status": "draft"}))).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(error.operation, RepositoryOperation::Create);
    }

    #[tokio::test]
    async fn test_delete_find_trashed_restore() {
        let repo = repo();
        let mut entry = repo.create(attrs(json!({"title": "a"}))).await.unwrap();
        let id = entry.id.unwrap();

        assert!(repo.delete(&mut entry).await.unwrap());
        assert!(entry.deleted_at.is_some());
        assert!(repo.find(id).await.unwrap().is_none());

        let trashed = repo.find_trashed(id).await.unwrap().unwrap();
        assert_eq!(trashed.id, Some(id));
        assert!(trashed.deleted_at.is_some());

        assert!(repo.restore(&mut entry).await.unwrap());
        assert!(entry.deleted_at.is_none());
        assert!(repo.find(id).await.unwrap().is_some());
        assert!(!repo.restore(&mut entry).await.unwrap());
    }

    #[tokio::test]
    async fn test_force_delete_removes_everywhere() {
        let repo = repo();
        let mut entry = repo.create(attrs(json!({"title": "a"}))).await.unwrap();
        let id = entry.id.unwrap();
        repo.delete(&mut entry).await.unwrap();

        assert!(repo.force_delete(&entry).await.unwrap());
        assert!(repo.find(id).await.unwrap().is_none());
        assert!(repo.find_trashed(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paginate_length_aware() {
        let repo = repo();
        seed(&repo, 5).await;

        let page = repo.paginate(PaginateParams::new().per_page(2)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, Some(5));
        assert_eq!(page.current_page, 1);
        assert_eq!(page.per_page, 2);
        assert_eq!(page.last_page(), Some(3));

        let last = repo
            .paginate_json(json!({"per_page": 2, "page": 3}))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].get("title"), Some(&json!("post 4")));
    }

    #[tokio::test]
    async fn test_paginate_simple_reports_more() {
        let repo = repo();
        seed(&repo, 3).await;

        let first = repo.paginate(PaginateParams::new().per_page(2).simple()).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, None);
        assert!(first.has_more);

        let second = repo
            .paginate(PaginateParams::new().per_page(2).page(2).simple())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_paginate_defaults_and_cap() {
        let config = RepositoryConfig {
            per_page: 3,
            max_per_page: 4,
            ..RepositoryConfig::default()
        };
        let repo = repo().with_config(config);
        seed(&repo, 6).await;

        assert_eq!(repo.paginate(PaginateParams::new()).await.unwrap().items.len(), 3);
        let capped = repo.paginate(PaginateParams::new().per_page(50)).await.unwrap();
        assert_eq!(capped.per_page, 4);
        assert_eq!(capped.items.len(), 4);
    }

    #[tokio::test]
    async fn test_paginate_applies_caller_operations() {
        let repo = repo();
        seed(&repo, 5).await;

        let page = repo
            .paginate_json(json!({
                "where": ["position", ">=", 2],
                "orderBy": ["position", "desc"],
                "update": {"title": "hijacked"},
            }))
            .await
            .unwrap();
        assert_eq!(page.total, Some(3));
        assert_eq!(page.items[0].get("position"), Some(&json!(4)));
        assert!(repo.find_by("title", "hijacked").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paginate_refuses_unknown_operations() {
        let repo = repo();
        let error = repo
            .paginate_json(json!({"truncate": []}))
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
    }

    #[tokio::test]
    async fn test_scope_applies_before_other_operations() {
        let model = EntryModel::new("posts").scope("active", |_args| {
            Ok(vec![QueryOp::Where(FilterCondition::eq("status", "active"))])
        });
        let repo = EntryRepository::new(MemoryBackend::new(), model);
        repo.create(attrs(json!({"status": "active", "position": 1}))).await.unwrap();
        repo.create(attrs(json!({"status": "draft", "position": 2}))).await.unwrap();
        repo.create(attrs(json!({"status": "active", "position": 3}))).await.unwrap();

        let params = PaginateParams::from_json(json!({
            "where": ["position", ">", 0],
            "scope": "active",
            "scope_arguments": [],
        }))
        .unwrap();

        let query = repo.build_query(&params).unwrap();
        assert_eq!(
            query.ops()[0],
            QueryOp::Where(FilterCondition::eq("status", "active"))
        );

        let page = repo.paginate(params).await.unwrap();
        assert_eq!(page.total, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_scope_is_refused() {
        let repo = repo();
        let error = repo
            .paginate(PaginateParams::new().scope("missing", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
    }

    #[tokio::test]
    async fn test_truncate_purges_trashed_and_live() {
        let repo = repo();
        seed(&repo, 5).await;
        for id in [1, 2] {
            let mut entry = repo.find(id).await.unwrap().unwrap();
            repo.delete(&mut entry).await.unwrap();
        }

        let mut events = repo.subscribe();
        assert_eq!(repo.truncate().await.unwrap(), 5);
        assert!(repo.all().await.unwrap().is_empty());
        assert!(repo.all_with_trashed().await.unwrap().is_empty());

        let mut deleted = 0;
        loop {
            let event = events.recv().await.unwrap();
            match event.kind {
                EntryEventKind::Deleted => deleted += 1,
                EntryEventKind::Truncated => break,
                other => panic!("unexpected event {other}"),
            }
        }
        assert_eq!(deleted, 3);
    }

    #[tokio::test]
    async fn test_last_modified_breaks_ties_by_created_at() {
        let backend = MemoryBackend::new();
        let at = |h: u32| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).single();
        let entry = |title: &str, created: u32, updated: u32| Entry {
            attributes: attrs(json!({ "title": title })),
            created_at: at(created),
            updated_at: at(updated),
            ..Entry::default()
        };
        backend
            .seed([entry("old", 1, 5), entry("newer", 3, 9), entry("tie", 2, 9)])
            .await;

        let repo = EntryRepository::new(backend, EntryModel::new("posts"));
        let latest = repo.last_modified().await.unwrap().unwrap();
        assert_eq!(latest.get("title"), Some(&json!("newer")));
    }

    #[tokio::test]
    async fn test_sorted_and_first_use_sort_column() {
        let repo = EntryRepository::new(MemoryBackend::new(), EntryModel::new("posts").sort_column("position"));
        for position in [2, 0, 1] {
            repo.create(attrs(json!({"position": position}))).await.unwrap();
        }

        let sorted = repo.sorted(OrderDirection::Ascending).await.unwrap();
        let positions: Vec<_> = sorted.iter().filter_map(|e| e.get("position")).cloned().collect();
        assert_eq!(positions, vec![json!(0), json!(1), json!(2)]);

        let first = repo.first(OrderDirection::Descending).await.unwrap().unwrap();
        assert_eq!(first.get("position"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_find_helpers() {
        let repo = repo();
        seed(&repo, 4).await;
        repo.create(attrs(json!({"title": "post 1", "position": null}))).await.unwrap();

        assert_eq!(repo.find_all(&[1, 3, 42]).await.unwrap().len(), 2);
        assert!(repo.find_all(&[]).await.unwrap().is_empty());
        assert_eq!(repo.find_all_by("title", "post 1").await.unwrap().len(), 2);
        assert_eq!(
            repo.find_by("position", FilterValue::Null).await.unwrap().and_then(|e| e.id),
            Some(5)
        );
        assert_eq!(repo.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_guard_filters_mass_assignment() {
        let mut repo = EntryRepository::new(
            MemoryBackend::new(),
            EntryModel::new("posts").fillable(["title"]),
        );

        let guarded = repo
            .create(attrs(json!({"id": 99, "title": "a", "status": "live"})))
            .await
            .unwrap();
        assert_eq!(guarded.id, Some(1));
        assert_eq!(guarded.attributes, attrs(json!({"title": "a"})));

        repo.unguard();
        assert!(!repo.is_guarded());
        let open = repo.create(attrs(json!({"title": "b", "status": "live"}))).await.unwrap();
        assert_eq!(open.get("status"), Some(&json!("live")));

        repo.guard();
        let instance = repo.new_instance(attrs(json!({"title": "c", "status": "x"})));
        assert!(!instance.exists());
        assert_eq!(instance.attributes, attrs(json!({"title": "c"})));
    }

    #[tokio::test]
    async fn test_new_instance_then_save() {
        let repo = repo();
        let mut entry = repo.new_instance(attrs(json!({"title": "draft"})));
        assert!(repo.save(&mut entry).await.unwrap());
        let id = entry.id.unwrap();

        entry.set("title", "final");
        repo.save(&mut entry).await.unwrap();
        let found = repo.find(id).await.unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&json!("final")));
    }

    #[tokio::test]
    async fn test_bulk_update_skips_trashed() {
        let repo = repo();
        seed(&repo, 3).await;
        let mut entry = repo.find(1).await.unwrap().unwrap();
        repo.delete(&mut entry).await.unwrap();

        assert_eq!(repo.update(attrs(json!({"status": "archived"}))).await.unwrap(), 2);
        let trashed = repo.find_trashed(1).await.unwrap().unwrap();
        assert!(trashed.get("status").is_none());
    }

    #[tokio::test]
    async fn test_without_events_suppresses_and_resumes() {
        let repo = repo();
        let mut events = repo.subscribe();

        let created = repo
            .without_events(|| repo.create(attrs(json!({"title": "quiet"}))))
            .await
            .unwrap();
        assert!(created.exists());
        assert!(!repo.events().is_paused());

        repo.create(attrs(json!({"title": "loud"}))).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EntryEventKind::Created);
        assert_eq!(event.entry_id, Some(2));
    }

    #[tokio::test]
    async fn test_cache_is_flushed_by_writes() {
        let repo = repo();
        seed(&repo, 2).await;

        let count: u64 = repo.cache_forever("count", || repo.count()).await.unwrap();
        assert_eq!(count, 2);
        seed(&repo, 1).await;
        let count: u64 = repo.cache_forever("count", || repo.count()).await.unwrap();
        assert_eq!(count, 3);

        let hit: u64 = repo
            .cache("count", Some(Duration::from_secs(60)), || async { Ok(0) })
            .await
            .unwrap();
        assert_eq!(hit, 3);
    }

    #[tokio::test]
    async fn test_write_during_cache_compute_is_not_stored() {
        let repo = repo();
        let stale: u64 = repo
            .cache_forever("count", || async {
                let count = repo.count().await?;
                repo.create(Attributes::new()).await?;
                Ok(count)
            })
            .await
            .unwrap();
        assert_eq!(stale, 0);

        let count: u64 = repo.cache_forever("count", || repo.count()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_default_cache_ttl_beyond_clock_range() {
        let config = RepositoryConfig {
            cache_ttl_secs: u64::MAX,
            ..RepositoryConfig::default()
        };
        let repo = repo().with_config(config);

        let value: u32 = repo.cache("k", None, || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
        let hit: u32 = repo.cache("k", None, || async { Ok(2) }).await.unwrap();
        assert_eq!(hit, 1);
    }

    #[tokio::test]
    async fn test_hooks_distinguish_missing_from_empty() {
        let mut builder = HookRegistry::builder();
        builder
            .register("touchAll", |_args: &[Value]| Ok(None))
            .unwrap()
            .register("shout", |args: &[Value]| {
                Ok(args.first().and_then(Value::as_str).map(|s| json!(s.to_uppercase())))
            })
            .unwrap();
        let repo = repo().with_hooks(builder.build());

        assert!(repo.has_hook("touch_all"));
        assert_eq!(repo.call("touchAll", &[]).unwrap(), None);
        assert_eq!(repo.call("shout", &[json!("hi")]).unwrap(), Some(json!("HI")));

        let error = repo.call("doesNotExist", &[]).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
        assert_eq!(error.entity_id.as_deref(), Some("does_not_exist"));
    }

    #[tokio::test]
    async fn test_eager_relations_and_without_relations() {
        let authors = MemoryBackend::new();
        let author_model = EntryModel::new("authors");
        let author = authors.insert(&author_model, attrs(json!({"name": "Ann"}))).await.unwrap();

        let model = EntryModel::new("posts")
            .relation("author", Relation::belongs_to("author_id"))
            .eager("author");
        let repo = EntryRepository::new(MemoryBackend::new().with_related("author", authors), model);
        let post = repo
            .create(attrs(json!({"title": "a", "author_id": author.id})))
            .await
            .unwrap();
        let id = post.id.unwrap();

        let loaded = repo.find(id).await.unwrap().unwrap();
        assert_eq!(loaded.relation("author").map(<[Entry]>::len), Some(1));

        let bare = repo.find_without_relations(id).await.unwrap().unwrap();
        assert!(bare.relations.is_empty());
        assert!(repo.all_without_relations().await.unwrap()[0].relations.is_empty());
    }

    #[tokio::test]
    async fn test_set_model_switches_entry_type() {
        let mut repo = repo();
        repo.set_model(EntryModel::new("pages"));
        assert_eq!(repo.model().entry_type(), "pages");
    }
}
