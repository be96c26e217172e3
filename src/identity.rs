//! Request identity: when to recompile, and the cache key of a request.

use std::fmt;
use std::sync::Arc;

use crate::{LoaderError, Variables};

/// A query document that can be compiled into an executable request.
///
/// Query descriptors are compared by identity: two descriptors are the same
/// query only if they are the same `Arc`. Compilation must be pure; the loader
/// skips it whenever the query and variables are unchanged.
///
/// # Example
///
/// ```
/// use query_loader::{LoaderError, QueryDescriptor, Variables};
///
/// struct UserQuery;
///
/// impl QueryDescriptor for UserQuery {
///     type Request = String;
///
///     fn identifier(&self) -> &str {
///         "UserQuery"
///     }
///
///     fn compile(&self, variables: &Variables) -> Result<String, LoaderError> {
///         Ok(format!("query UserQuery {}", variables.to_canonical_string()))
///     }
/// }
/// ```
pub trait QueryDescriptor: Send + Sync + 'static {
    /// The executable artifact produced by compilation.
    type Request: Send + Sync + 'static;

    /// Stable identifier of the query document, used in cache keys.
    fn identifier(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Compile this query with the given variables.
    fn compile(&self, variables: &Variables) -> Result<Self::Request, LoaderError>;
}

/// Cache key of a compiled request: the query identifier followed by the
/// canonical encoding of its variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Derive the key for a query identifier and variable bag.
    pub fn new(identifier: &str, variables: &Variables) -> Self {
        RequestKey(format!("{}{}", identifier, variables.to_canonical_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query compiled against a specific variable bag.
pub struct CompiledRequest<Q: QueryDescriptor> {
    query: Arc<Q>,
    variables: Variables,
    request: Q::Request,
    key: RequestKey,
}

impl<Q: QueryDescriptor> CompiledRequest<Q> {
    /// Compile `query` with `variables`.
    pub fn compile(query: Arc<Q>, variables: Variables) -> Result<Self, LoaderError> {
        let request = query.compile(&variables)?;
        let key = RequestKey::new(query.identifier(), &variables);
        Ok(Self {
            query,
            variables,
            request,
            key,
        })
    }

    /// The query descriptor this request was compiled from.
    pub fn query(&self) -> &Arc<Q> {
        &self.query
    }

    /// The variables this request was compiled with.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// The compiled artifact.
    pub fn request(&self) -> &Q::Request {
        &self.request
    }

    /// The cache key of this request.
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Returns true if this request was compiled from exactly this query and
    /// structurally equal variables.
    pub fn matches(&self, query: &Arc<Q>, variables: &Variables) -> bool {
        Arc::ptr_eq(&self.query, query) && self.variables == *variables
    }
}

impl<Q: QueryDescriptor> fmt::Debug for CompiledRequest<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRequest")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Result of [`resolve_identity`].
pub struct ResolvedIdentity<Q: QueryDescriptor> {
    /// Whether the previous compiled request was kept.
    pub reused: bool,
    /// The compiled request to execute.
    pub request: Arc<CompiledRequest<Q>>,
}

impl<Q: QueryDescriptor> fmt::Debug for ResolvedIdentity<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedIdentity")
            .field("reused", &self.reused)
            .field("request", &self.request)
            .finish()
    }
}

/// Decide whether a new query and variables pair needs a fresh compiled
/// request.
///
/// The previous request is reused iff `query` is the same `Arc` as the one it
/// was compiled from and `variables` is structurally equal to its variables.
/// Otherwise the query is compiled again; a compile failure is returned as is.
pub fn resolve_identity<Q: QueryDescriptor>(
    previous: Option<&Arc<CompiledRequest<Q>>>,
    query: &Arc<Q>,
    variables: Variables,
) -> Result<ResolvedIdentity<Q>, LoaderError> {
    if let Some(previous) = previous.filter(|p| p.matches(query, &variables)) {
        return Ok(ResolvedIdentity {
            reused: true,
            request: previous.clone(),
        });
    }
    let request = CompiledRequest::compile(query.clone(), variables)?;
    Ok(ResolvedIdentity {
        reused: false,
        request: Arc::new(request),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingQuery {
        name: &'static str,
        compiles: AtomicU32,
    }

    impl CountingQuery {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                compiles: AtomicU32::new(0),
            })
        }

        fn compiles(&self) -> u32 {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl QueryDescriptor for CountingQuery {
        type Request = String;

        fn identifier(&self) -> &str {
            self.name
        }

        fn compile(&self, variables: &Variables) -> Result<String, LoaderError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            if variables.get("invalid").is_some() {
                return Err(LoaderError::compile(self.name, anyhow::anyhow!("bad input")));
            }
            Ok(format!("{}:{}", self.name, variables.to_canonical_string()))
        }
    }

    fn vars(value: serde_json::Value) -> Variables {
        Variables::try_from(value).unwrap()
    }

    #[test]
    fn test_first_resolution_compiles() {
        let query = CountingQuery::new("Q1");
        let resolved = resolve_identity(None, &query, vars(json!({ "id": "42" }))).unwrap();
        assert!(!resolved.reused);
        assert_eq!(query.compiles(), 1);
        assert_eq!(resolved.request.key().as_str(), r#"Q1{"id":"42"}"#);
        assert_eq!(resolved.request.request(), r#"Q1:{"id":"42"}"#);
    }

    #[test]
    fn test_equal_variables_reuse_request() {
        let query = CountingQuery::new("Q1");
        let first = resolve_identity(None, &query, vars(json!({ "id": "42", "n": 1 }))).unwrap();
        let second = resolve_identity(
            Some(&first.request),
            &query,
            vars(json!({ "n": 1, "id": "42" })),
        )
        .unwrap();
        assert!(second.reused);
        assert!(Arc::ptr_eq(&first.request, &second.request));
        assert_eq!(query.compiles(), 1);
    }

    #[test]
    fn test_changed_variables_recompile() {
        let query = CountingQuery::new("Q1");
        let first =
            resolve_identity(None, &query, vars(json!({ "filter": { "tags": ["a"] } }))).unwrap();
        let second = resolve_identity(
            Some(&first.request),
            &query,
            vars(json!({ "filter": { "tags": ["b"] } })),
        )
        .unwrap();
        assert!(!second.reused);
        assert_ne!(first.request.key(), second.request.key());
        assert_eq!(query.compiles(), 2);
    }

    #[test]
    fn test_different_query_instance_recompiles() {
        // Same identifier, different `Arc`: identity is by reference.
        let q1 = CountingQuery::new("Q1");
        let q1_again = CountingQuery::new("Q1");
        let first = resolve_identity(None, &q1, Variables::new()).unwrap();
        let second = resolve_identity(Some(&first.request), &q1_again, Variables::new()).unwrap();
        assert!(!second.reused);
        assert_eq!(first.request.key(), second.request.key());
        assert_eq!(q1_again.compiles(), 1);
    }

    #[test]
    fn test_compile_failure_propagates() {
        let query = CountingQuery::new("Q1");
        let err = resolve_identity(None, &query, vars(json!({ "invalid": true }))).unwrap_err();
        assert!(matches!(err, LoaderError::Compile { .. }));
    }
}
