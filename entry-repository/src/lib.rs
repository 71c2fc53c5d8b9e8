//! # entry-repository
//!
//! A generic, hook-extensible repository for persisted entries.
//!
//! ## Features
//!
//! - **Repository façade**: CRUD, soft delete, restore, bulk update and truncate over any
//!   [`StorageBackend`](repository::StorageBackend)
//! - **Dynamic pagination**: caller-supplied parameters resolved against a closed allow-list
//!   of query operations, with named scopes applied first
//! - **Relations**: eager loading declared on the entry model
//! - **Caching**: per-entry-type read-through cache with TTLs, flushed on writes
//! - **Events**: broadcast change notifications with a scoped "without events" guard
//! - **Hooks**: named extension calls routed through a frozen registry
//! - **Configuration**: Figment-based layered config (env, files, XDG, defaults)
//! - **Observability**: structured JSON logging via `tracing`
//!
//! ## Example
//!
//! ```rust,no_run
//! use entry_repository::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let backend = MemoryBackend::from_config(&config.repository).require("title");
//!     let repo = EntryRepository::new(backend, EntryModel::new("posts"))
//!         .with_config(config.repository.clone());
//!
//!     let attributes = json!({"title": "Hello"}).as_object().cloned().unwrap_or_default();
//!     let post = repo.create(attributes).await?;
//!     tracing::info!(id = ?post.id, "created");
//!
//!     shutdown_tracing();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod repository;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, RepositoryConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::repository::{
        Attributes, Entry, EntryEvent, EntryEventKind, EntryId, EntryModel, EntryRepository,
        EventDispatcher, FilterCondition, FilterOperator, FilterValue, HookRegistry,
        MemoryBackend, OrderDirection, Page, PaginateParams, PaginatorKind, QueryOp, QuerySpec,
        Relation, RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
        StorageBackend,
    };
}
