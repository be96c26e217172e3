//! Query-Loader: a memoizing, suspense-compatible loader for a single query.
//!
//! A [`Loader`] sits between a rendering layer and a data store. Given a query
//! descriptor and a variable bag it returns the last execution outcome, which is
//! either a value or a [`Suspension`] the caller can wait on before asking
//! again. How the query actually runs is up to an [`Executor`].
//!
//! # Key Features
//!
//! - **Memoized compilation**: a query is recompiled only when the query `Arc`
//!   or the structural value of its [`Variables`] changes
//! - **Suspense pattern**: pending executions are values ([`Loadable::Pending`]),
//!   not control flow, and can be propagated with `?` via [`LoaderError::Suspend`]
//! - **Retry on ready**: awaiting a suspension re-executes once the data arrived,
//!   or the loader drives it itself when built with a spawner
//! - **Store-driven updates**: executors re-run the loader through a
//!   [`ForceUpdate`] callback
//! - **Two modes**: [`Loader::eager`] reports pending from `next` as an error,
//!   [`Loader::deferred`] returns it as a completion future
//! - **Observability**: plug in a [`Tracer`]; [`EventCollector`] records events
//!   for tests
//!
//! # Example
//!
//! ```ignore
//! use query_loader::{Loadable, Loader, QueryOptions, Variables};
//!
//! let loader = Loader::deferred(StoreExecutor::new());
//! let variables = Variables::new().with("id", "42");
//!
//! let completion = loader.next(environment, user_query, variables, QueryOptions::default())?;
//! if let Some(Loadable::Pending(pending)) = loader.get_value(None) {
//!     pending.await?;
//! }
//! let user = loader.read(None)?;
//! ```

#![deny(missing_docs)]

mod collector;
mod error;
mod executor;
mod identity;
mod loadable;
mod loader;
mod options;
pub mod tracer;
mod variables;

pub use collector::{EventCollector, LoaderEvent};
pub use error::LoaderError;
pub use executor::{Executor, ForceUpdate};
pub use identity::{resolve_identity, CompiledRequest, QueryDescriptor, RequestKey, ResolvedIdentity};
pub use loadable::{Loadable, Suspension};
pub use loader::{Listener, Loader, LoaderBuilder, LoaderMode, Subscription};
pub use options::{FetchPolicy, NetworkCacheConfig, QueryOptions};
#[cfg(feature = "tracing")]
pub use tracer::TracingTracer;
pub use tracer::{ExecutionResult, NoopTracer, SpanId, Tracer};
pub use variables::Variables;
