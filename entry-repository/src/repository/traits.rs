//! Storage backend contract
//!
//! [`StorageBackend`] is the seam between the repository façade and whatever
//! actually stores entries. It uses RPITIT (Return Position Impl Trait In
//! Traits) for async methods, so no boxing or `async_trait` is required.
//!
//! Backends own timestamps and ids, interpret [`QuerySpec`]s and publish an
//! [`EntryEvent`](super::EntryEvent) after every write through their
//! [`EventDispatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! impl StorageBackend for PostgresEntries {
//!     async fn fetch(&self, model: &EntryModel, query: &QuerySpec) -> RepositoryResult<Vec<Entry>> {
//!         let (sql, binds) = render_select(model, query)?;
//!         // ...
//!     }
//!     // ... other methods
//! }
//! ```

use std::future::Future;

use super::entry::{Attributes, Entry, EntryId};
use super::error::RepositoryError;
use super::events::EventDispatcher;
use super::model::EntryModel;
use super::query::QuerySpec;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Operations a storage backend must provide
pub trait StorageBackend: Send + Sync {
    /// Entries matching the query, honoring ordering, trashed mode, limit,
    /// offset and eager loads
    ///
    /// With no ordering, entries come back in ascending id order.
    fn fetch(
        &self,
        model: &EntryModel,
        query: &QuerySpec,
    ) -> impl Future<Output = RepositoryResult<Vec<Entry>>> + Send;

    /// Number of entries matching the query's filters and trashed mode
    ///
    /// Limit, offset and eager loads are ignored.
    fn count(
        &self,
        model: &EntryModel,
        query: &QuerySpec,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether an entry with this id is stored
    fn exists(
        &self,
        model: &EntryModel,
        id: EntryId,
        include_trashed: bool,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Insert a new entry, assigning its id and timestamps
    ///
    /// # Errors
    ///
    /// Constraint violations surface as `ValidationFailed` or
    /// `ConstraintViolation` errors.
    fn insert(
        &self,
        model: &EntryModel,
        attributes: Attributes,
    ) -> impl Future<Output = RepositoryResult<Entry>> + Send;

    /// Insert an unsaved entry or overwrite the attributes of a stored one
    fn save(
        &self,
        model: &EntryModel,
        entry: &Entry,
    ) -> impl Future<Output = RepositoryResult<Entry>> + Send;

    /// Merge attributes into every entry matching the query; returns the
    /// number of entries touched
    fn update_matching(
        &self,
        model: &EntryModel,
        query: &QuerySpec,
        attributes: Attributes,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Set the soft-delete marker; `None` if no live entry has this id
    fn soft_delete(
        &self,
        model: &EntryModel,
        id: EntryId,
    ) -> impl Future<Output = RepositoryResult<Option<Entry>>> + Send;

    /// Clear the soft-delete marker; `None` if no trashed entry has this id
    fn restore(
        &self,
        model: &EntryModel,
        id: EntryId,
    ) -> impl Future<Output = RepositoryResult<Option<Entry>>> + Send;

    /// Physically remove one entry; returns whether a row was removed
    fn force_delete(
        &self,
        model: &EntryModel,
        id: EntryId,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Physically remove every entry, trashed ones included
    fn purge(&self, model: &EntryModel) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Change-notification sink for this backend
    fn events(&self) -> &EventDispatcher;
}
