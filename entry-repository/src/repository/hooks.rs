//! Named extension hooks
//!
//! Collaborators extend a repository with extra named operations without
//! wrapping it. Hooks are registered on a [`HookRegistryBuilder`] during
//! start-up; the built [`HookRegistry`] is immutable and shared behind an
//! `Arc`, so registration can never race with live calls.
//!
//! # Example
//!
//! ```rust
//! use entry_repository::repository::HookRegistry;
//! use serde_json::{json, Value};
//!
//! let mut builder = HookRegistry::builder();
//! builder
//!     .register("countWords", |args: &[Value]| {
//!         let words = args
//!             .first()
//!             .and_then(Value::as_str)
//!             .map(|s| s.split_whitespace().count())
//!             .unwrap_or(0);
//!         Ok(Some(json!(words)))
//!     })
//!     .unwrap();
//! let hooks = builder.build();
//!
//! assert!(hooks.has("count_words"));
//! assert_eq!(hooks.call("countWords", &[json!("a b c")]).unwrap(), Some(json!(3)));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// A registered hook
///
/// `Ok(None)` means the hook ran and intentionally produced nothing.
pub type HookHandler = Arc<dyn Fn(&[Value]) -> RepositoryResult<Option<Value>> + Send + Sync>;

/// Normalize a method name to snake_case
///
/// `getFooBar`, `GetFooBar`, `get-foo-bar` and `get_foo_bar` all map to
/// `get_foo_bar`. Acronyms stay together: `parseHTMLBody` becomes
/// `parse_html_body`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '_' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out.trim_end_matches('_').to_string()
}

/// Collects hooks before a registry is frozen
#[derive(Default)]
pub struct HookRegistryBuilder {
    hooks: HashMap<String, HookHandler>,
}

impl HookRegistryBuilder {
    /// Register a hook under its normalized name
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if a hook with the same normalized name is
    /// already registered, and `InvalidQuery` for an empty name.
    pub fn register<F>(&mut self, name: &str, handler: F) -> RepositoryResult<&mut Self>
    where
        F: Fn(&[Value]) -> RepositoryResult<Option<Value>> + Send + Sync + 'static,
    {
        let normalized = snake_case(name);
        if normalized.is_empty() {
            return Err(RepositoryError::invalid_query(
                RepositoryOperation::CallHook,
                "hook name must not be empty",
            ));
        }
        if self.hooks.contains_key(&normalized) {
            return Err(RepositoryError::already_exists(
                RepositoryOperation::CallHook,
                "hook",
                normalized,
            ));
        }

        tracing::debug!(hook = %normalized, "Registered repository hook");
        self.hooks.insert(normalized, Arc::new(handler));
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> HookRegistry {
        HookRegistry { hooks: self.hooks }
    }
}

/// Immutable set of named hooks
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, HookHandler>,
}

impl HookRegistry {
    /// Start building a registry
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// An empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a hook exists for the (unnormalized) method name
    pub fn has(&self, method: &str) -> bool {
        self.hooks.contains_key(&snake_case(method))
    }

    /// Registered hook names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Invoke the hook registered for `method`
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` when no hook matches, so that a typo is
    /// never confused with a hook that returned nothing. Errors raised by the
    /// hook itself are passed through unchanged.
    pub fn call(&self, method: &str, args: &[Value]) -> RepositoryResult<Option<Value>> {
        let name = snake_case(method);
        match self.hooks.get(&name) {
            Some(handler) => {
                tracing::debug!(hook = %name, args = args.len(), "Calling repository hook");
                handler(args)
            }
            None => {
                tracing::warn!(hook = %name, "No repository hook registered");
                Err(RepositoryError::unsupported_operation(
                    RepositoryOperation::CallHook,
                    name,
                ))
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use serde_json::json;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("getFooBar"), "get_foo_bar");
        assert_eq!(snake_case("GetFooBar"), "get_foo_bar");
        assert_eq!(snake_case("get_foo_bar"), "get_foo_bar");
        assert_eq!(snake_case("get-foo-bar"), "get_foo_bar");
        assert_eq!(snake_case("parseHTMLBody"), "parse_html_body");
        assert_eq!(snake_case("findBy2Fields"), "find_by2_fields");
        assert_eq!(snake_case("per_page"), "per_page");
        assert_eq!(snake_case(""), "");
    }

    #[test]
    fn test_register_rejects_duplicates_after_normalization() {
        let mut builder = HookRegistry::builder();
        builder.register("publishAll", |_| Ok(None)).unwrap();
        let error = builder
            .register("publish_all", |_| Ok(None))
            .err()
            .unwrap();
        assert_eq!(error.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(builder.build().len(), 1);
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut builder = HookRegistry::builder();
        assert!(builder.register("  ", |_| Ok(None)).is_err());
    }

    #[test]
    fn test_missing_and_empty_results_are_distinguishable() {
        let mut builder = HookRegistry::builder();
        builder.register("noop", |_| Ok(None)).unwrap();
        let hooks = builder.build();

        assert_eq!(hooks.call("noop", &[]).unwrap(), None);
        let error = hooks.call("nope", &[]).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_hook_receives_arguments_unchanged() {
        let mut builder = HookRegistry::builder();
        builder
            .register("echo", |args| Ok(Some(Value::Array(args.to_vec()))))
            .unwrap();
        let hooks = builder.build();

        assert_eq!(
            hooks.call("Echo", &[json!(1), json!("two")]).unwrap(),
            Some(json!([1, "two"]))
        );
    }

    #[test]
    fn test_hook_errors_pass_through() {
        let mut builder = HookRegistry::builder();
        builder
            .register("fail", |_| {
                Err(RepositoryError::validation_failed(
                    RepositoryOperation::CallHook,
                    "bad input",
                ))
            })
            .unwrap();
        let error = builder.build().call("fail", &[]).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_debug_lists_names() {
        let mut builder = HookRegistry::builder();
        builder.register("b", |_| Ok(None)).unwrap();
        builder.register("a", |_| Ok(None)).unwrap();
        let hooks = builder.build();
        assert_eq!(hooks.names(), vec!["a", "b"]);
        assert!(format!("{:?}", hooks).contains("[\"a\", \"b\"]"));
    }
}
