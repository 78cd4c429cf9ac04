//! Named cross-cutting decorators.
//!
//! A decorator is registered once under a process-wide name and referenced
//! from handler documentation with `@name` lines. Names are resolved when
//! the registry is frozen; an unknown name is a fatal registration error,
//! never a runtime one.

use indexmap::IndexMap;
use std::sync::Arc;
use stoa_core::FaultResult;
use stoa_engine::{BoxFuture, Exchange};

/// A cross-cutting function inserted into a route's chain by name.
///
/// A decorator that returns an error aborts the remaining chain; the fault
/// is written through the error taxonomy like a handler failure.
pub type DecoratorFn = Arc<
    dyn for<'a> Fn(&'a mut (dyn Exchange + 'a)) -> BoxFuture<'a, FaultResult<()>> + Send + Sync,
>;

/// Wraps a boxed-future closure as a [`DecoratorFn`].
///
/// ```ignore
/// registry.decorator("audit_log", decorator(|ex| {
///     Box::pin(async move {
///         tracing::info!(path = ex.path(), "audited");
///         Ok(())
///     })
/// }));
/// ```
pub fn decorator<F>(f: F) -> DecoratorFn
where
    F: for<'a> Fn(&'a mut (dyn Exchange + 'a)) -> BoxFuture<'a, FaultResult<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The process-wide decorator table, mutable during registration only.
#[derive(Default)]
pub(crate) struct DecoratorTable {
    entries: IndexMap<String, DecoratorFn>,
}

impl DecoratorTable {
    pub(crate) fn insert(&mut self, name: impl Into<String>, f: DecoratorFn) {
        self.entries.insert(name.into(), f);
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<DecoratorFn> {
        self.entries.get(name).map(Arc::clone)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
