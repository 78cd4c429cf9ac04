//! Handler registration and route-table assembly.
//!
//! [`Registry`] is the startup-only, single-threaded mutable phase: business
//! functions are registered with their attached documentation text,
//! decorators and the identifier function are installed, static mounts and
//! global middleware are collected. [`Registry::freeze`] resolves every
//! decorator reference, assembles each route key's ordered chain (identity
//! gate first, decorators in documented order, main action last), and
//! returns the immutable [`RouteTable`]; [`RouteTable::mount`] hands the
//! chains to the external engine. Nothing is mutated after the freeze, so
//! the table is safe for unsynchronized concurrent reads.
//!
//! All registration failures are returned as [`RegistryError`]; the host
//! aborts startup on them. Nothing here panics.

use crate::decorate::{DecoratorFn, DecoratorTable};
use crate::descriptor::{self, RouteKey};
use crate::error::RegistryError;
use crate::identify::{self, IdentifierFn};
use crate::pipeline::{self, RouteRecord};
use crate::respond::{self, Respond, ResponseMode};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use stoa_core::{Context, ErrorMode, FaultResult, Validate};
use stoa_engine::{Engine, RouteChain, Step};

/// Process-wide settings shared into every chain.
///
/// Mutable during the registration phase only; request-time reads take the
/// lock on error paths exclusively.
pub struct Settings {
    mode: RwLock<ErrorMode>,
}

impl Settings {
    pub(crate) fn new() -> Self {
        Self {
            mode: RwLock::new(ErrorMode::default()),
        }
    }

    /// Returns the current error-handling mode.
    #[must_use]
    pub fn error_mode(&self) -> ErrorMode {
        *self.mode.read()
    }

    pub(crate) fn set_error_mode(&self, mode: ErrorMode) {
        *self.mode.write() = mode;
    }
}

/// The startup-time registration surface.
///
/// # Example
///
/// ```ignore
/// let mut registry = Registry::new();
/// registry.register(
///     "[GET] /api/v1/widgets/:id 200 json",
///     widgets::get,
/// )?;
///
/// let table = registry.freeze()?;
/// table.mount(&mut engine);
/// ```
#[derive(Default)]
pub struct Registry {
    records: IndexMap<RouteKey, Vec<RouteRecord>>,
    decorators: DecoratorTable,
    identifier: Option<IdentifierFn>,
    globals: Vec<Step>,
    static_dirs: Vec<(String, String)>,
    static_files: Vec<(String, String)>,
    no_route: Vec<Step>,
    no_method: Vec<Step>,
    settings: Arc<Settings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry in production error mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches between development and production error exposure.
    pub fn set_error_mode(&self, mode: ErrorMode) {
        self.settings.set_error_mode(mode);
    }

    /// Registers a named cross-cutting decorator.
    ///
    /// Handlers reference it with an `@name` documentation line. Names are
    /// resolved when the registry freezes, so decorators and handlers may
    /// be registered in any order.
    pub fn decorator(&mut self, name: impl Into<String>, decorate: DecoratorFn) {
        self.decorators.insert(name, decorate);
    }

    /// Installs the authentication/authorization function invoked by the
    /// identity gate of protected routes.
    pub fn identifier(&mut self, identify: IdentifierFn) {
        self.identifier = Some(identify);
    }

    /// Attaches a global middleware step, included in the chain for every
    /// request, 404 and 405 included.
    pub fn use_middleware(&mut self, step: Step) {
        self.globals.push(step);
    }

    /// Serves files from a filesystem root under a path prefix.
    pub fn static_dir(&mut self, prefix: impl Into<String>, root: impl Into<String>) {
        self.static_dirs.push((prefix.into(), root.into()));
    }

    /// Serves a single local file at a fixed path.
    pub fn static_file(&mut self, path: impl Into<String>, file: impl Into<String>) {
        self.static_files.push((path.into(), file.into()));
    }

    /// Appends a step to the chain invoked when no route matches.
    pub fn no_route(&mut self, step: Step) {
        self.no_route.push(step);
    }

    /// Appends a step to the chain invoked when the path matches but the
    /// method does not.
    pub fn no_method(&mut self, step: Step) {
        self.no_method.push(step);
    }

    /// Registers a business function under the metadata in its attached
    /// documentation text.
    ///
    /// The documentation must carry a descriptor line
    /// `[VERB] /path status responseMode[@contentType]`, and may carry an
    /// `@authorize(...)` line and `@decorator` lines. All metadata errors
    /// are fatal registration errors naming the handler.
    pub fn register<In, Out, H, Fut>(&mut self, doc: &str, action: H) -> Result<(), RegistryError>
    where
        In: DeserializeOwned + Validate + Send + 'static,
        Out: Respond,
        H: Fn(Context, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FaultResult<Out>> + Send + 'static,
    {
        let handler = std::any::type_name::<H>();
        let parsed = descriptor::parse(doc, handler)?;
        let mode = Arc::new(respond::resolve_mode::<Out>(&parsed.route, handler)?);
        let key = RouteKey::new(&parsed.route);
        let route = Arc::new(parsed.route);

        let main = pipeline::main_step(
            Arc::new(action),
            Arc::clone(&route),
            Arc::clone(&mode),
            Arc::clone(&self.settings),
            Arc::from(handler),
        );

        tracing::debug!(key = %key, handler, "registered handler");
        self.records.entry(key).or_default().push(RouteRecord {
            descriptor: route,
            mode,
            identity: parsed.identity,
            decorators: parsed.decorators,
            main,
        });

        Ok(())
    }

    /// Registers a raw step under the route key computed from `doc`,
    /// before the main registration for that key.
    ///
    /// Split registration keeps a "before" step, the main handler, and an
    /// "after" step under one key; order is call order.
    pub fn register_before(&mut self, doc: &str, step: Step) -> Result<(), RegistryError> {
        self.attach_step(doc, step)
    }

    /// Registers a raw step under the route key computed from `doc`, after
    /// the main registration for that key.
    pub fn register_after(&mut self, doc: &str, step: Step) -> Result<(), RegistryError> {
        self.attach_step(doc, step)
    }

    fn attach_step(&mut self, doc: &str, step: Step) -> Result<(), RegistryError> {
        let handler = "attached step";
        let parsed = descriptor::parse(doc, handler)?;
        let tag = parsed.route.mode_tag().to_string();
        let mode = ResponseMode::parse(&tag).ok_or(RegistryError::UnknownMode {
            handler: handler.to_string(),
            tag,
        })?;
        let key = RouteKey::new(&parsed.route);

        self.records.entry(key).or_default().push(RouteRecord {
            descriptor: Arc::new(parsed.route),
            mode: Arc::new(mode),
            identity: None,
            decorators: Vec::new(),
            main: step,
        });

        Ok(())
    }

    /// Resolves every decorator reference, assembles the ordered chains,
    /// and returns the immutable route table.
    ///
    /// Per registration record the chain order is: identity gate (when the
    /// route is protected), decorators in documented order, main action
    /// last. Records sharing a key concatenate in registration order.
    pub fn freeze(self) -> Result<RouteTable, RegistryError> {
        let Self {
            records,
            decorators,
            identifier,
            globals,
            static_dirs,
            static_files,
            no_route,
            no_method,
            settings,
        } = self;

        let mut chains: IndexMap<RouteKey, RouteChain> = IndexMap::with_capacity(records.len());

        for (key, route_records) in records {
            let mut steps: Vec<Step> = Vec::new();

            for record in route_records {
                if let Some(identity) = record.identity {
                    let identify =
                        identifier
                            .clone()
                            .ok_or_else(|| RegistryError::MissingIdentifier {
                                method: record.descriptor.method().clone(),
                                path: record.descriptor.path().to_string(),
                            })?;
                    steps.push(identify::gate_step(Arc::new(identity), identify));
                }

                for name in record.decorators {
                    let decorate = decorators.resolve(&name).ok_or_else(|| {
                        RegistryError::UnknownDecorator {
                            name: name.clone(),
                            method: record.descriptor.method().clone(),
                            path: record.descriptor.path().to_string(),
                        }
                    })?;
                    steps.push(pipeline::decorator_step(
                        Arc::from(name),
                        decorate,
                        Arc::clone(&record.mode),
                        Arc::clone(&settings),
                    ));
                }

                steps.push(record.main);
            }

            chains.insert(key, Arc::new(steps));
        }

        Ok(RouteTable {
            chains,
            globals,
            static_dirs,
            static_files,
            no_route,
            no_method,
        })
    }
}

/// The frozen, immutable route table.
///
/// Built once at startup; shared read-only by all requests afterwards.
pub struct RouteTable {
    chains: IndexMap<RouteKey, RouteChain>,
    globals: Vec<Step>,
    static_dirs: Vec<(String, String)>,
    static_files: Vec<(String, String)>,
    no_route: Vec<Step>,
    no_method: Vec<Step>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("globals", &self.globals.len())
            .field("static_dirs", &self.static_dirs)
            .field("static_files", &self.static_files)
            .field("no_route", &self.no_route.len())
            .field("no_method", &self.no_method.len())
            .finish()
    }
}

impl RouteTable {
    /// Returns the number of route keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns `true` when no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Returns the chain stored under a key.
    #[must_use]
    pub fn chain(&self, key: &RouteKey) -> Option<&RouteChain> {
        self.chains.get(key)
    }

    /// Iterates over the route keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.chains.keys()
    }

    /// Registers everything with the external engine: global middleware,
    /// static mounts, fallback chains, and each route key's full chain
    /// under the method and path parsed back from the key.
    pub fn mount<E: Engine>(&self, engine: &mut E) {
        for step in &self.globals {
            engine.apply(Arc::clone(step));
        }
        for (prefix, root) in &self.static_dirs {
            engine.static_dir(prefix.clone(), root.clone());
        }
        for (path, file) in &self.static_files {
            engine.static_file(path.clone(), file.clone());
        }
        if !self.no_route.is_empty() {
            engine.fallback(Arc::new(self.no_route.clone()));
        }
        if !self.no_method.is_empty() {
            engine.method_fallback(Arc::new(self.no_method.clone()));
        }

        for (key, chain) in &self.chains {
            let Some((method, path)) = key.method_and_path() else {
                tracing::error!(key = %key, "route key cannot be decoded, skipping");
                continue;
            };
            tracing::info!(key = %key, steps = chain.len(), "mounting route");
            engine.mount(method, path, Arc::clone(chain));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorate::decorator;
    use crate::identify::identifier;
    use serde_json::json;
    use stoa_core::{Empty, Identity};
    use stoa_engine::step;

    async fn ok_handler(_ctx: Context, _input: Empty) -> FaultResult<serde_json::Value> {
        Ok(json!({"status": "ok"}))
    }

    fn noop_step() -> Step {
        step(|_ex| Box::pin(async move {}))
    }

    #[test]
    fn test_register_groups_by_key() {
        let mut registry = Registry::new();
        registry
            .register("[GET] /widgets 200 json", ok_handler)
            .unwrap();
        registry
            .register("[GET] /widgets 200 json", ok_handler)
            .unwrap();
        registry
            .register("[POST] /widgets 201 json", ok_handler)
            .unwrap();

        let table = registry.freeze().unwrap();
        assert_eq!(table.len(), 2);

        let parsed = descriptor::parse("[GET] /widgets 200 json", "x").unwrap();
        let key = RouteKey::new(&parsed.route);
        // Two registrations under one key concatenate into one chain.
        assert_eq!(table.chain(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_register_rejects_missing_descriptor() {
        let mut registry = Registry::new();
        let err = registry.register("no descriptor here", ok_handler).unwrap_err();
        assert!(matches!(err, RegistryError::MissingDescriptor { .. }));
        assert!(err.to_string().contains("ok_handler"));
    }

    #[test]
    fn test_register_rejects_unknown_mode() {
        let mut registry = Registry::new();
        let err = registry
            .register("[GET] /widgets 200 yaml", ok_handler)
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMode { .. }));
    }

    #[test]
    fn test_freeze_rejects_unknown_decorator() {
        let mut registry = Registry::new();
        registry
            .register("@audit_log\n[GET] /widgets 200 json", ok_handler)
            .unwrap();

        let err = registry.freeze().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDecorator { .. }));
        assert_eq!(
            err.to_string(),
            "audit_log decorator does not exist for [GET] /widgets"
        );
    }

    #[test]
    fn test_freeze_resolves_decorators_registered_after_handlers() {
        let mut registry = Registry::new();
        registry
            .register("@audit_log\n[GET] /widgets 200 json", ok_handler)
            .unwrap();
        registry.decorator(
            "audit_log",
            decorator(|_ex| Box::pin(async move { Ok(()) })),
        );

        let table = registry.freeze().unwrap();
        let key = table.keys().next().unwrap();
        // Decorator plus main action.
        assert_eq!(table.chain(key).unwrap().len(), 2);
    }

    #[test]
    fn test_freeze_rejects_protected_route_without_identifier() {
        let mut registry = Registry::new();
        registry
            .register("@authorize(admin:::)\n[GET] /widgets 200 json", ok_handler)
            .unwrap();

        let err = registry.freeze().unwrap_err();
        assert!(matches!(err, RegistryError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_protected_route_chain_has_gate_first() {
        let mut registry = Registry::new();
        registry.identifier(identifier(|_ex, _roles, _permissions| {
            Box::pin(async move { Ok(Identity::new()) })
        }));
        registry
            .register(
                "@authorize(admin:::)\n@audit_log\n[GET] /widgets 200 json",
                ok_handler,
            )
            .unwrap();
        registry.decorator(
            "audit_log",
            decorator(|_ex| Box::pin(async move { Ok(()) })),
        );

        let table = registry.freeze().unwrap();
        let key = table.keys().next().unwrap();
        // Gate, decorator, main action.
        assert_eq!(table.chain(key).unwrap().len(), 3);
    }

    #[test]
    fn test_split_registration_concatenates_in_call_order() {
        let mut registry = Registry::new();
        registry
            .register_before("[GET] /widgets 200 json", noop_step())
            .unwrap();
        registry
            .register("[GET] /widgets 200 json", ok_handler)
            .unwrap();
        registry
            .register_after("[GET] /widgets 200 json", noop_step())
            .unwrap();

        let table = registry.freeze().unwrap();
        let key = table.keys().next().unwrap();
        assert_eq!(table.chain(key).unwrap().len(), 3);
    }

    #[test]
    fn test_error_mode_switch() {
        let registry = Registry::new();
        assert_eq!(registry.settings.error_mode(), ErrorMode::Production);

        registry.set_error_mode(ErrorMode::Development);
        assert_eq!(registry.settings.error_mode(), ErrorMode::Development);
    }
}
