//! Entry model description
//!
//! An [`EntryModel`] tells the repository and its backend what an entry type
//! looks like: its name, which columns callers may mass-assign, which column
//! `sorted` orders by, which relations can be eager loaded (and which are
//! loaded by default) and which named scopes `paginate` may apply.
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{EntryModel, FilterCondition, QueryOp, Relation};
//!
//! let model = EntryModel::new("posts")
//!     .fillable(["title", "status", "author_id"])
//!     .relation("author", Relation::belongs_to("author_id"))
//!     .scope("published", |_args| {
//!         Ok(vec![QueryOp::Where(FilterCondition::eq("status", "published"))])
//!     });
//!
//! assert!(model.is_fillable("title"));
//! assert!(model.has_scope("published"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::entry::RESERVED_COLUMNS;
use super::error::{RepositoryError, RepositoryOperation};
use super::hooks::snake_case;
use super::query::QueryOp;
use super::traits::RepositoryResult;

/// Default column used by `sorted` and `first`
pub const DEFAULT_SORT_COLUMN: &str = "sort_order";

/// Builds the operations of a named scope from its arguments
pub type ScopeFn = Arc<dyn Fn(&[Value]) -> RepositoryResult<Vec<QueryOp>> + Send + Sync>;

/// How a relation is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// This entry holds the related entry's id in `foreign_key`
    BelongsTo {
        /// Column on this entry
        foreign_key: String,
    },
    /// Related entries hold this entry's id in `foreign_key`
    HasMany {
        /// Column on the related entries
        foreign_key: String,
    },
}

impl Relation {
    /// A belongs-to relation
    pub fn belongs_to(foreign_key: impl Into<String>) -> Self {
        Self::BelongsTo {
            foreign_key: foreign_key.into(),
        }
    }

    /// A has-many relation
    pub fn has_many(foreign_key: impl Into<String>) -> Self {
        Self::HasMany {
            foreign_key: foreign_key.into(),
        }
    }
}

/// Description of one entry type
#[derive(Clone)]
pub struct EntryModel {
    entry_type: String,
    fillable: Vec<String>,
    sort_column: String,
    relations: BTreeMap<String, Relation>,
    eager: Vec<String>,
    scopes: BTreeMap<String, ScopeFn>,
}

impl EntryModel {
    /// Describe an entry type with no fillable restriction
    pub fn new(entry_type: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            fillable: Vec::new(),
            sort_column: DEFAULT_SORT_COLUMN.to_string(),
            relations: BTreeMap::new(),
            eager: Vec::new(),
            scopes: BTreeMap::new(),
        }
    }

    /// Restrict mass assignment to these columns
    #[must_use]
    pub fn fillable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Column used by `sorted` and `first`
    #[must_use]
    pub fn sort_column(mut self, column: impl Into<String>) -> Self {
        self.sort_column = column.into();
        self
    }

    /// Declare a relation
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Eager load a declared relation on every default read
    #[must_use]
    pub fn eager(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.eager.contains(&name) {
            self.eager.push(name);
        }
        self
    }

    /// Declare a named scope
    #[must_use]
    pub fn scope<F>(mut self, name: &str, build: F) -> Self
    where
        F: Fn(&[Value]) -> RepositoryResult<Vec<QueryOp>> + Send + Sync + 'static,
    {
        self.scopes.insert(snake_case(name), Arc::new(build));
        self
    }

    /// Entry type name
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    /// Mass-assignable columns; empty means unrestricted
    pub fn fillable_columns(&self) -> &[String] {
        &self.fillable
    }

    /// Column used by `sorted` and `first`
    pub fn sort_by(&self) -> &str {
        &self.sort_column
    }

    /// Relations loaded by default
    pub fn eager_relations(&self) -> &[String] {
        &self.eager
    }

    /// Relation definition by name
    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Whether a scope exists for the (unnormalized) name
    pub fn has_scope(&self, name: &str) -> bool {
        self.scopes.contains_key(&snake_case(name))
    }

    /// Whether a column may be mass assigned while guarded
    pub fn is_fillable(&self, column: &str) -> bool {
        if RESERVED_COLUMNS.contains(&column) {
            return false;
        }
        self.fillable.is_empty() || self.fillable.iter().any(|c| c == column)
    }

    /// Build the operations of a named scope
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for an undeclared scope; errors raised
    /// by the scope itself pass through.
    pub fn apply_scope(&self, name: &str, arguments: &[Value]) -> RepositoryResult<Vec<QueryOp>> {
        let name = snake_case(name);
        let build = self.scopes.get(&name).ok_or_else(|| {
            RepositoryError::unsupported_operation(RepositoryOperation::Paginate, format!("scope {}", name))
        })?;
        build(arguments)
    }
}

impl fmt::Debug for EntryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryModel")
            .field("entry_type", &self.entry_type)
            .field("fillable", &self.fillable)
            .field("sort_column", &self.sort_column)
            .field("relations", &self.relations)
            .field("eager", &self.eager)
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .finish()
    }
}
