//! Typed query operations and the `paginate` parameter parser
//!
//! Callers describe a query as a mapping of operation name to arguments, for
//! example `{"where": ["status", "published"], "order_by": ["created_at",
//! "desc"], "per_page": 10}`. Every name is normalized to snake_case and
//! resolved against a closed allow-list of [`QueryOp`] variants. Unknown names
//! are refused with [`RepositoryErrorKind::UnsupportedOperation`]; nothing is
//! ever dispatched by name at run time.
//!
//! [`RepositoryErrorKind::UnsupportedOperation`]: super::RepositoryErrorKind::UnsupportedOperation
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{PaginateParams, PaginatorKind, QueryOp};
//! use serde_json::json;
//!
//! let params = PaginateParams::from_json(json!({
//!     "paginator": "simple",
//!     "per_page": 10,
//!     "where": ["status", "published"],
//!     "orderBy": ["created_at", "desc"],
//! }))
//! .unwrap();
//!
//! assert_eq!(params.paginator, PaginatorKind::Simple);
//! assert_eq!(params.per_page, Some(10));
//! assert!(matches!(params.ops[1], QueryOp::OrderBy { .. }));
//! ```

use serde_json::{Map, Value};

use super::error::{RepositoryError, RepositoryOperation};
use super::hooks::snake_case;
use super::pagination::{FilterCondition, FilterOperator, FilterValue, OrderDirection, PaginatorKind};
use super::traits::RepositoryResult;

/// Parameter keys consumed by `paginate` itself
pub const RESERVED_KEYS: [&str; 5] = ["paginator", "per_page", "page", "scope", "scope_arguments"];

/// Keys that are silently skipped so that a read never mutates
pub const MUTATING_KEYS: [&str; 2] = ["update", "delete"];

/// One query operation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    /// Keep entries matching the condition
    Where(FilterCondition),
    /// Order by a column; earlier orderings take precedence
    OrderBy {
        /// Column to order by
        column: String,
        /// Sort direction
        direction: OrderDirection,
    },
    /// Cap the number of entries; the last limit wins
    Limit(u64),
    /// Skip entries; the last offset wins
    Offset(u64),
    /// Eager load a named relation
    With(String),
    /// Include soft-deleted entries
    WithTrashed,
    /// Only soft-deleted entries
    OnlyTrashed,
}

/// How a query treats soft-deleted entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedMode {
    /// Soft-deleted entries are invisible
    #[default]
    Exclude,
    /// Soft-deleted entries are included
    Include,
    /// Only soft-deleted entries are returned
    Only,
}

/// An ordered sequence of query operations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    ops: Vec<QueryOp>,
}

impl QuerySpec {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation
    #[must_use]
    pub fn push(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Append several operations in order
    #[must_use]
    pub fn extend(mut self, ops: impl IntoIterator<Item = QueryOp>) -> Self {
        self.ops.extend(ops);
        self
    }

    /// Append a filter
    #[must_use]
    pub fn filter(self, condition: FilterCondition) -> Self {
        self.push(QueryOp::Where(condition))
    }

    /// Append an ordering
    #[must_use]
    pub fn order_by(self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.push(QueryOp::OrderBy {
            column: column.into(),
            direction,
        })
    }

    /// Append a limit
    #[must_use]
    pub fn limit(self, limit: u64) -> Self {
        self.push(QueryOp::Limit(limit))
    }

    /// Append an offset
    #[must_use]
    pub fn offset(self, offset: u64) -> Self {
        self.push(QueryOp::Offset(offset))
    }

    /// Append a relation to eager load
    #[must_use]
    pub fn with(self, relation: impl Into<String>) -> Self {
        self.push(QueryOp::With(relation.into()))
    }

    /// Include soft-deleted entries
    #[must_use]
    pub fn with_trashed(self) -> Self {
        self.push(QueryOp::WithTrashed)
    }

    /// Only soft-deleted entries
    #[must_use]
    pub fn only_trashed(self) -> Self {
        self.push(QueryOp::OnlyTrashed)
    }

    /// All operations in application order
    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    /// Filter conditions in application order
    pub fn filters(&self) -> impl Iterator<Item = &FilterCondition> {
        self.ops.iter().filter_map(|op| match op {
            QueryOp::Where(condition) => Some(condition),
            _ => None,
        })
    }

    /// Orderings in precedence order
    pub fn orderings(&self) -> impl Iterator<Item = (&str, OrderDirection)> {
        self.ops.iter().filter_map(|op| match op {
            QueryOp::OrderBy { column, direction } => Some((column.as_str(), *direction)),
            _ => None,
        })
    }

    /// Relations to eager load, first occurrence order, no duplicates
    pub fn relations(&self) -> Vec<&str> {
        let mut relations: Vec<&str> = Vec::new();
        for op in &self.ops {
            if let QueryOp::With(name) = op {
                if !relations.contains(&name.as_str()) {
                    relations.push(name);
                }
            }
        }
        relations
    }

    /// Effective soft-delete handling; the last trashed operation wins
    pub fn trashed_mode(&self) -> TrashedMode {
        self.ops
            .iter()
            .rev()
            .find_map(|op| match op {
                QueryOp::WithTrashed => Some(TrashedMode::Include),
                QueryOp::OnlyTrashed => Some(TrashedMode::Only),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Effective limit
    pub fn limit_value(&self) -> Option<u64> {
        self.ops.iter().rev().find_map(|op| match op {
            QueryOp::Limit(n) => Some(*n),
            _ => None,
        })
    }

    /// Effective offset
    pub fn offset_value(&self) -> Option<u64> {
        self.ops.iter().rev().find_map(|op| match op {
            QueryOp::Offset(n) => Some(*n),
            _ => None,
        })
    }

    /// The same query without limit, offset or eager loads, as used for counting
    #[must_use]
    pub fn for_count(&self) -> Self {
        Self {
            ops: self
                .ops
                .iter()
                .filter(|op| !matches!(op, QueryOp::Limit(_) | QueryOp::Offset(_) | QueryOp::With(_)))
                .cloned()
                .collect(),
        }
    }
}

/// A named scope invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeCall {
    /// Scope name, snake_case
    pub name: String,
    /// Arguments passed to the scope
    pub arguments: Vec<Value>,
}

/// Parsed `paginate` parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaginateParams {
    /// Length-aware or simple pagination
    pub paginator: PaginatorKind,
    /// Page size; `None` uses the configured default
    pub per_page: Option<u64>,
    /// Page number (1-indexed); `None` means the first page
    pub page: Option<u64>,
    /// Scope applied before every other operation
    pub scope: Option<ScopeCall>,
    /// Remaining operations in parameter order
    pub ops: Vec<QueryOp>,
}

impl PaginateParams {
    /// Empty parameters: first page, default size, no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    #[must_use]
    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Set the page number
    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Use simple pagination
    #[must_use]
    pub fn simple(mut self) -> Self {
        self.paginator = PaginatorKind::Simple;
        self
    }

    /// Apply a named scope first
    #[must_use]
    pub fn scope(mut self, name: impl AsRef<str>, arguments: Vec<Value>) -> Self {
        self.scope = Some(ScopeCall {
            name: snake_case(name.as_ref()),
            arguments,
        });
        self
    }

    /// Append an operation
    #[must_use]
    pub fn op(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Parse from a JSON object
    pub fn from_json(value: Value) -> RepositoryResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(RepositoryError::invalid_query(
                RepositoryOperation::Paginate,
                format!("parameters must be an object, got {}", other),
            )),
        }
    }

    /// Parse from a parameter mapping, preserving its iteration order
    pub fn from_map(map: Map<String, Value>) -> RepositoryResult<Self> {
        let mut params = Self::new();
        let mut scope_name: Option<String> = None;
        let mut scope_arguments: Vec<Value> = Vec::new();

        for (key, value) in map {
            let method = snake_case(&key);
            match method.as_str() {
                "paginator" => {
                    params.paginator = match value.as_str() {
                        Some("simple") => PaginatorKind::Simple,
                        _ => PaginatorKind::LengthAware,
                    };
                }
                "per_page" => params.per_page = Some(positive_integer("per_page", &value)?),
                "page" => params.page = Some(positive_integer("page", &value)?),
                "scope" => match value {
                    Value::Null => {}
                    Value::String(name) if name.is_empty() => {}
                    Value::String(name) => scope_name = Some(snake_case(&name)),
                    other => {
                        return Err(RepositoryError::invalid_query(
                            RepositoryOperation::Paginate,
                            format!("scope must be a name, got {}", other),
                        ))
                    }
                },
                "scope_arguments" => scope_arguments = spread(value),
                name if MUTATING_KEYS.contains(&name) => {
                    tracing::warn!(operation = name, "Skipping mutating key in paginate parameters");
                }
                name => params.ops.extend(parse_op(name, spread(value))?),
            }
        }

        params.scope = scope_name.map(|name| ScopeCall {
            name,
            arguments: scope_arguments,
        });
        Ok(params)
    }
}

impl TryFrom<Map<String, Value>> for PaginateParams {
    type Error = RepositoryError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(map)
    }
}

/// Sequence arguments are spread, scalars become a single argument
fn spread(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        scalar => vec![scalar],
    }
}

fn positive_integer(key: &str, value: &Value) -> RepositoryResult<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(RepositoryError::invalid_query(
            RepositoryOperation::Paginate,
            format!("{} must be a positive integer, got {}", key, value),
        )),
    }
}

fn column_arg(method: &str, value: Option<&Value>) -> RepositoryResult<String> {
    match value.and_then(Value::as_str) {
        Some(column) if !column.is_empty() => Ok(column.to_string()),
        _ => Err(RepositoryError::invalid_query(
            RepositoryOperation::Paginate,
            format!("{} expects a column name as its first argument", method),
        )),
    }
}

fn filter_value(method: &str, value: &Value) -> RepositoryResult<FilterValue> {
    FilterValue::from_json(value).ok_or_else(|| {
        RepositoryError::invalid_query(
            RepositoryOperation::Paginate,
            format!("{} cannot compare against {}", method, value),
        )
    })
}

/// Resolve one allow-listed operation name and its spread arguments
pub fn parse_op(method: &str, args: Vec<Value>) -> RepositoryResult<Vec<QueryOp>> {
    let invalid = |message: String| RepositoryError::invalid_query(RepositoryOperation::Paginate, message);

    match method {
        "where" => {
            let column = column_arg(method, args.first())?;
            let condition = match args.len() {
                2 => match filter_value(method, &args[1])? {
                    FilterValue::Null => FilterCondition::is_null(column),
                    value => FilterCondition::new(column, FilterOperator::Equal, value),
                },
                3 => {
                    let operator = args[1]
                        .as_str()
                        .ok_or_else(|| invalid(format!("where operator must be a string, got {}", args[1])))?
                        .parse::<FilterOperator>()
                        .map_err(invalid)?;
                    FilterCondition::new(column, operator, filter_value(method, &args[2])?)
                }
                n => return Err(invalid(format!("where expects 2 or 3 arguments, got {}", n))),
            };
            Ok(vec![QueryOp::Where(condition)])
        }
        "where_in" => {
            if args.len() != 2 {
                return Err(invalid(format!("where_in expects 2 arguments, got {}", args.len())));
            }
            let column = column_arg(method, args.first())?;
            match filter_value(method, &args[1])? {
                value @ (FilterValue::StringList(_) | FilterValue::IntegerList(_)) => Ok(vec![
                    QueryOp::Where(FilterCondition::new(column, FilterOperator::In, value)),
                ]),
                _ => Err(invalid("where_in expects a list of values".to_string())),
            }
        }
        "where_null" => Ok(vec![QueryOp::Where(FilterCondition::is_null(column_arg(
            method,
            args.first(),
        )?))]),
        "where_not_null" => Ok(vec![QueryOp::Where(FilterCondition::is_not_null(
            column_arg(method, args.first())?,
        ))]),
        "order_by" => {
            let column = column_arg(method, args.first())?;
            let direction = match args.get(1) {
                None => OrderDirection::Ascending,
                Some(value) => value
                    .as_str()
                    .ok_or_else(|| invalid(format!("order direction must be a string, got {}", value)))?
                    .parse::<OrderDirection>()
                    .map_err(invalid)?,
            };
            Ok(vec![QueryOp::OrderBy { column, direction }])
        }
        "limit" | "take" => Ok(vec![QueryOp::Limit(count_arg(method, args.first())?)]),
        "offset" | "skip" => Ok(vec![QueryOp::Offset(count_arg(method, args.first())?)]),
        "with" => args
            .iter()
            .map(|relation| match relation.as_str() {
                Some(name) if !name.is_empty() => Ok(QueryOp::With(name.to_string())),
                _ => Err(invalid(format!("with expects relation names, got {}", relation))),
            })
            .collect(),
        "with_trashed" => Ok(vec![QueryOp::WithTrashed]),
        "only_trashed" => Ok(vec![QueryOp::OnlyTrashed]),
        other => {
            tracing::warn!(operation = other, "Refusing query operation outside the allow-list");
            Err(RepositoryError::unsupported_operation(
                RepositoryOperation::Paginate,
                other,
            ))
        }
    }
}

fn count_arg(method: &str, value: Option<&Value>) -> RepositoryResult<u64> {
    value.and_then(Value::as_u64).ok_or_else(|| {
        RepositoryError::invalid_query(
            RepositoryOperation::Paginate,
            format!("{} expects a non-negative integer", method),
        )
    })
}
