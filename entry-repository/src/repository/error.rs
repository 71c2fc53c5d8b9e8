//! Repository error types
//!
//! Lookup misses are never errors: they surface as `Ok(None)` or an empty
//! vector. A [`RepositoryError`] means the operation itself could not be
//! carried out: a constraint was violated, a query named an operation outside
//! the allow-list, or an extension hook does not exist.
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("posts", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single entry by id or column
    FindById,
    /// Finding multiple entries
    FindAll,
    /// Finding an entry including trashed rows
    FindTrashed,
    /// Counting entries
    Count,
    /// Checking whether an entry exists
    Exists,
    /// Building or running a paginated query
    Paginate,
    /// Creating a new entry
    Create,
    /// Saving a single entry
    Save,
    /// Bulk updating entries
    Update,
    /// Soft deleting an entry
    SoftDelete,
    /// Permanently deleting an entry
    ForceDelete,
    /// Restoring a soft-deleted entry
    Restore,
    /// Purging every entry
    Truncate,
    /// Eager loading relations
    LoadRelations,
    /// Reading or writing the entry cache
    Cache,
    /// Calling a registered extension hook
    CallHook,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindAll => write!(f, "find_all"),
            Self::FindTrashed => write!(f, "find_trashed"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Paginate => write!(f, "paginate"),
            Self::Create => write!(f, "create"),
            Self::Save => write!(f, "save"),
            Self::Update => write!(f, "update"),
            Self::SoftDelete => write!(f, "soft_delete"),
            Self::ForceDelete => write!(f, "force_delete"),
            Self::Restore => write!(f, "restore"),
            Self::Truncate => write!(f, "truncate"),
            Self::LoadRelations => write!(f, "load_relations"),
            Self::Cache => write!(f, "cache"),
            Self::CallHook => write!(f, "call_hook"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entry was not found
    NotFound,
    /// Entry or registration already exists
    AlreadyExists,
    /// Storage constraint violation (unique column)
    ConstraintViolation,
    /// Attributes failed validation before storage
    ValidationFailed,
    /// Named operation, scope or hook is not supported
    UnsupportedOperation,
    /// Query parameters are malformed
    InvalidQuery,
    /// Underlying storage error
    StorageError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::UnsupportedOperation => write!(f, "unsupported_operation"),
            Self::InvalidQuery => write!(f, "invalid_query"),
            Self::StorageError => write!(f, "storage_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use entry_repository::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::unsupported_operation(RepositoryOperation::Paginate, "raw_sql");
/// assert_eq!(
///     error.to_string(),
///     "Repository unsupported_operation error during paginate: Operation is not supported [operation: raw_sql]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entry type involved (e.g., "posts")
    pub entity_type: Option<String>,
    /// The id or name involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entry context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entry not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create an "already exists" error
    pub fn already_exists(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::AlreadyExists,
            "Entry already exists",
        )
        .with_entity(entity_type, identifier)
    }

    /// Create a validation failed error
    ///
    /// # Example
    ///
    /// ```rust
    /// use entry_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
    ///
    /// let error = RepositoryError::validation_failed(RepositoryOperation::Create, "title is required");
    /// assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    /// ```
    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(
        operation: RepositoryOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, RepositoryErrorKind::ConstraintViolation, message)
    }

    /// Create an error for an operation, scope or hook name that is not supported
    pub fn unsupported_operation(operation: RepositoryOperation, name: impl Into<String>) -> Self {
        Self {
            operation,
            kind: RepositoryErrorKind::UnsupportedOperation,
            message: "Operation is not supported".to_string(),
            entity_type: Some("operation".to_string()),
            entity_id: Some(name.into()),
        }
    }

    /// Create an error for malformed query parameters
    pub fn invalid_query(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::InvalidQuery, message)
    }

    /// Create a storage error
    pub fn storage_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::StorageError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entry context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable
    ///
    /// Only storage-level failures may succeed on a second attempt; the
    /// repository itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, RepositoryErrorKind::StorageError)
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindTrashed), "find_trashed");
        assert_eq!(format!("{}", RepositoryOperation::Paginate), "paginate");
        assert_eq!(format!("{}", RepositoryOperation::ForceDelete), "force_delete");
        assert_eq!(format!("{}", RepositoryOperation::CallHook), "call_hook");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnsupportedOperation),
            "unsupported_operation"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::InvalidQuery), "invalid_query");
        assert_eq!(
            format!("{}", RepositoryErrorKind::ConstraintViolation),
            "constraint_violation"
        );
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("posts", "7");
        assert_eq!(error.operation, RepositoryOperation::FindById);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_type, Some("posts".to_string()));
        assert_eq!(error.entity_id, Some("7".to_string()));
    }

    #[test]
    fn test_unsupported_operation_names_the_operation() {
        let error = RepositoryError::unsupported_operation(RepositoryOperation::CallHook, "publish");
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
        assert!(error.to_string().contains("[operation: publish]"));
    }

    #[test]
    fn test_with_operation() {
        let error = RepositoryError::invalid_query(RepositoryOperation::Paginate, "bad per_page")
            .with_operation(RepositoryOperation::FindAll);
        assert_eq!(error.operation, RepositoryOperation::FindAll);
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::storage_error(RepositoryOperation::Create, "lock").is_retriable());
        assert!(!RepositoryError::not_found("posts", "1").is_retriable());
        assert!(
            !RepositoryError::validation_failed(RepositoryOperation::Create, "x").is_retriable()
        );
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::storage_error(RepositoryOperation::Truncate, "disk full");
        let display = error.to_string();
        assert!(display.contains("storage_error"));
        assert!(display.contains("truncate"));
        assert!(!display.contains('['));
    }
}
