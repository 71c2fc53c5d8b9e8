//! Pagination, ordering and filter types for repository queries
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::{FilterCondition, OrderDirection, Page};
//!
//! let filters = vec![
//!     FilterCondition::eq("status", "published"),
//!     FilterCondition::gte("views", 100_i64),
//! ];
//!
//! let page: Page<u32> = Page::length_aware(vec![1, 2], 2, 1, 5);
//! assert_eq!(page.last_page(), Some(3));
//! assert_eq!(OrderDirection::Descending.to_string(), "desc");
//! # let _ = filters;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    #[serde(rename = "desc")]
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown order direction '{}'", other)),
        }
    }
}

/// Which paginator `paginate` should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginatorKind {
    /// Counts every matching entry and reports the total
    #[default]
    LengthAware,
    /// Skips the count; only reports whether a further page exists
    Simple,
}

/// One page of results plus pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Entries on this page
    pub items: Vec<T>,
    /// Requested page size
    pub per_page: u64,
    /// Current page (1-indexed)
    pub current_page: u64,
    /// Total matching entries, `None` for simple pagination
    pub total: Option<u64>,
    /// Whether a further page exists
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a length-aware page
    pub fn length_aware(items: Vec<T>, per_page: u64, current_page: u64, total: u64) -> Self {
        let has_more = current_page.saturating_mul(per_page) < total;
        Self {
            items,
            per_page,
            current_page,
            total: Some(total),
            has_more,
        }
    }

    /// Build a simple page
    pub fn simple(items: Vec<T>, per_page: u64, current_page: u64, has_more: bool) -> Self {
        Self {
            items,
            per_page,
            current_page,
            total: None,
            has_more,
        }
    }

    /// Last page number, if the total is known
    pub fn last_page(&self) -> Option<u64> {
        let total = self.total?;
        if self.per_page == 0 {
            return Some(1);
        }
        Some(total.div_ceil(self.per_page).max(1))
    }

    /// Number of entries on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE), `%` and `_` wildcards, case-insensitive
    Like,
    /// Value is in a list (IN)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    /// Parse the comparison operators accepted in `where` arguments
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "like" => Ok(Self::Like),
            "in" => Ok(Self::In),
            other => Err(format!("unsupported comparison operator '{}'", other)),
        }
    }
}

/// A value that can be used in filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// List of string values (for IN operator)
    StringList(Vec<String>),
    /// List of integer values (for IN operator)
    IntegerList(Vec<i64>),
    /// Null value (for IS NULL / IS NOT NULL)
    Null,
}

impl FilterValue {
    /// Convert a JSON argument into a filter value
    ///
    /// Arrays must be homogeneous lists of strings or integers; objects are
    /// rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => {
                if let Some(ints) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
                    Some(Self::IntegerList(ints))
                } else {
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .map(Self::StringList)
                }
            }
            Value::Object(_) => None,
        }
    }

    /// Convert back into JSON for comparison against stored attributes
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::from(s.as_str()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::StringList(list) => Value::from(list.clone()),
            Self::IntegerList(list) => Value::from(list.clone()),
            Self::Null => Value::Null,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(list: Vec<i64>) -> Self {
        Self::IntegerList(list)
    }
}

/// A single filter condition
///
/// # Example
///
/// ```rust
/// use entry_repository::repository::{FilterCondition, FilterOperator};
///
/// let filter = FilterCondition::like("title", "%rust%");
/// assert_eq!(filter.operator, FilterOperator::Like);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The column to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// field = value
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// field != value
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    /// field > value
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    /// field >= value
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// field < value
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    /// field <= value
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// LIKE pattern filter
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, FilterValue::String(pattern.into()))
    }

    /// IN list filter for strings
    pub fn in_strings(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(field, FilterOperator::In, FilterValue::StringList(values))
    }

    /// IN list filter for integers
    pub fn in_integers(field: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(field, FilterOperator::In, FilterValue::IntegerList(values))
    }

    /// IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::Null)
    }

    /// IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, FilterValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_direction_parse() {
        assert_eq!("ASC".parse::<OrderDirection>(), Ok(OrderDirection::Ascending));
        assert_eq!("desc".parse::<OrderDirection>(), Ok(OrderDirection::Descending));
        assert!("sideways".parse::<OrderDirection>().is_err());
    }

    #[test]
    fn test_filter_operator_parse() {
        assert_eq!("<>".parse::<FilterOperator>(), Ok(FilterOperator::NotEqual));
        assert_eq!("LIKE".parse::<FilterOperator>(), Ok(FilterOperator::Like));
        assert_eq!(">=".parse::<FilterOperator>(), Ok(FilterOperator::GreaterThanOrEqual));
        assert!("~".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn test_filter_value_from_json() {
        assert_eq!(FilterValue::from_json(&json!(3)), Some(FilterValue::Integer(3)));
        assert_eq!(FilterValue::from_json(&json!(1.5)), Some(FilterValue::Float(1.5)));
        assert_eq!(
            FilterValue::from_json(&json!(["a", "b"])),
            Some(FilterValue::StringList(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(
            FilterValue::from_json(&json!([1, 2])),
            Some(FilterValue::IntegerList(vec![1, 2]))
        );
        assert_eq!(FilterValue::from_json(&json!(["a", 1])), None);
        assert_eq!(FilterValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_filter_condition_builders() {
        let filter = FilterCondition::gt("views", 100_i64);
        assert_eq!(filter.operator, FilterOperator::GreaterThan);
        assert_eq!(filter.value, FilterValue::Integer(100));

        let filter = FilterCondition::is_null("deleted_at");
        assert_eq!(filter.value, FilterValue::Null);
    }

    #[test]
    fn test_length_aware_page_metadata() {
        let page = Page::length_aware(vec![1, 2], 2, 1, 5);
        assert_eq!(page.total, Some(5));
        assert_eq!(page.last_page(), Some(3));
        assert!(page.has_more);

        let last = Page::length_aware(vec![5], 2, 3, 5);
        assert!(!last.has_more);
    }

    #[test]
    fn test_simple_page_has_no_total() {
        let page = Page::simple(vec!["a"], 1, 1, true);
        assert_eq!(page.total, None);
        assert_eq!(page.last_page(), None);
        assert!(page.has_more);
    }

    #[test]
    fn test_empty_length_aware_page_reports_one_page() {
        let page: Page<u8> = Page::length_aware(vec![], 15, 1, 0);
        assert_eq!(page.last_page(), Some(1));
        assert!(page.is_empty());
    }
}
