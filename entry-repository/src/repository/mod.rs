//! Hook-extensible entry repository
//!
//! This module provides a generic repository for one entry type on top of a
//! pluggable storage backend.
//!
//! # Features
//!
//! - **CRUD and soft delete**: [`EntryRepository`] with `find`, `create`,
//!   `save`, `delete`, `restore`, `force_delete` and `truncate`
//! - **Dynamic pagination**: caller parameters parsed into an allow-listed
//!   [`QueryOp`] sequence by [`PaginateParams`]
//! - **Relations and scopes**: declared on an [`EntryModel`]
//! - **Caching**: [`EntryCache`] scoped per entry type, flushed on writes
//! - **Events**: [`EventDispatcher`] with an RAII [`EventsPaused`] guard
//! - **Hooks**: a frozen [`HookRegistry`] behind [`EntryRepository::call`]
//! - **Backends**: the [`StorageBackend`] trait and the in-memory
//!   [`MemoryBackend`]
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{
//!     EntryModel, EntryRepository, FilterCondition, MemoryBackend, QueryOp,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), entry_repository::repository::RepositoryError> {
//! let model = EntryModel::new("posts").scope("published", |_args| {
//!     Ok(vec![QueryOp::Where(FilterCondition::eq("status", "published"))])
//! });
//! let repo = EntryRepository::new(MemoryBackend::new(), model);
//!
//! let mut post = repo
//!     .create(json!({"title": "Hi", "status": "published"}).as_object().cloned().unwrap_or_default())
//!     .await?;
//! repo.delete(&mut post).await?;
//! assert!(repo.find(post.id.unwrap_or_default()).await?.is_none());
//!
//! let page = repo
//!     .paginate_json(json!({"scope": "published", "with_trashed": []}))
//!     .await?;
//! assert_eq!(page.total, Some(1));
//! # Ok(())
//! # }
//! ```

mod cache;
mod entry;
mod entry_repository;
mod error;
mod events;
mod hooks;
mod memory;
mod model;
mod pagination;
mod query;
mod traits;

// Re-export all public types
pub use cache::{CacheStore, CachedValue, EntryCache};
pub use entry::{compare_values, Attributes, Entry, EntryId, RESERVED_COLUMNS};
pub use entry_repository::EntryRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use events::{EntryEvent, EntryEventKind, EventDispatcher, EventsPaused, DEFAULT_EVENT_CAPACITY};
pub use hooks::{snake_case, HookHandler, HookRegistry, HookRegistryBuilder};
pub use memory::MemoryBackend;
pub use model::{EntryModel, Relation, ScopeFn, DEFAULT_SORT_COLUMN};
pub use pagination::{
    FilterCondition, FilterOperator, FilterValue, OrderDirection, Page, PaginatorKind,
};
pub use query::{
    parse_op, PaginateParams, QueryOp, QuerySpec, ScopeCall, TrashedMode, MUTATING_KEYS,
    RESERVED_KEYS,
};
pub use traits::{RepositoryResult, StorageBackend};
