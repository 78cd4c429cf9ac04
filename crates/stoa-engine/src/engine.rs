//! Startup-time engine surface and the step-chain vocabulary.
//!
//! A [`Step`] is an opaque unit of execution closed over its route's
//! descriptor; a [`RouteChain`] is the ordered, immutable list of steps for
//! one route key. Chains are assembled once during registration and shared
//! read-only by every in-flight request afterwards.

use crate::exchange::Exchange;
use http::Method;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future, as produced by pipeline steps.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One unit of execution in a route's chain.
///
/// Steps run strictly in the order they were appended; a step that calls
/// [`Exchange::abort`] stops the remaining steps for that request.
pub type Step =
    Arc<dyn for<'a> Fn(&'a mut (dyn Exchange + 'a)) -> BoxFuture<'a, ()> + Send + Sync>;

/// The ordered, immutable step chain for one route key.
pub type RouteChain = Arc<Vec<Step>>;

/// Startup-time mounting surface of the external HTTP engine.
///
/// The registration layer hands the engine finished chains keyed by method
/// and path; listening, routing, TLS, and body parsing stay on the engine's
/// side of this boundary.
pub trait Engine {
    /// Registers a route's full handler chain.
    fn mount(&mut self, method: Method, path: String, chain: RouteChain);

    /// Attaches a global middleware step, included in the chain for every
    /// request.
    fn apply(&mut self, step: Step);

    /// Serves files from a filesystem root under a path prefix.
    fn static_dir(&mut self, prefix: String, root: String);

    /// Serves a single local file at a fixed path.
    fn static_file(&mut self, path: String, file: String);

    /// Sets the chain invoked when no route matches (404 by default).
    fn fallback(&mut self, chain: RouteChain);

    /// Sets the chain invoked when the path matches but the method does not
    /// (405 by default).
    fn method_fallback(&mut self, chain: RouteChain);
}

/// Wraps a boxed-future closure as a [`Step`].
///
/// The closure receives the exchange and returns a boxed future; the helper
/// pins down the higher-ranked signature so step literals stay readable:
///
/// ```ignore
/// let logging = step(|ex| {
///     Box::pin(async move {
///         tracing::info!(path = ex.path(), "request");
///     })
/// });
/// ```
pub fn step<F>(f: F) -> Step
where
    F: for<'a> Fn(&'a mut (dyn Exchange + 'a)) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Runs a step chain against one exchange, honoring the abort primitive.
///
/// Engines use this (or an equivalent loop) as their dispatch body: each
/// step runs in order until one aborts the exchange.
pub async fn run_chain(ex: &mut (dyn Exchange + '_), steps: &[Step]) {
    for step in steps {
        if ex.is_aborted() {
            break;
        }
        step(&mut *ex).await;
    }
}
