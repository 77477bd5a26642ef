//! Hierarchical lifetime scopes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::builder::ContainerBuilder;
use crate::context::{ResolveRequest, ResolveRequestContext};
use crate::diagnostics::DiagnosticHub;
use crate::disposer::Disposer;
use crate::error::{DiError, DiResult};
use crate::events::{
    ChildBeginningHandler, ChildScopeBeginningEvent, OperationBeginningHandler, ScopeEndingEvent,
    ScopeEndingHandler,
};
use crate::lifetime::ComponentLifetime;
use crate::operation::ResolveOperation;
use crate::parameter::Parameter;
use crate::pipeline::middleware::{ActivationMiddleware, ScopeSelectionMiddleware};
use crate::pipeline::ResolvePipeline;
use crate::registration::{
    ActivatorFn, AnyArc, InstanceOwnership, InstanceSharing, Registration, RegistrationId,
};
use crate::registry::ComponentRegistry;
use crate::service::Service;
use crate::store::SharedInstanceStore;

/// Tag of the root lifetime scope.
pub const ROOT_TAG: &str = "root";

static NEXT_ANONYMOUS_TAG: AtomicU64 = AtomicU64::new(1);

/// Opaque, equatable marker identifying a scope within its ancestry.
///
/// Labeled tags are matched by [`ComponentLifetime::MatchingScope`] policies
/// and must be unique along any root-to-leaf path; anonymous tags are unique
/// by construction and never match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTag {
    /// A unique identity tag assigned to untagged scopes
    Anonymous(u64),
    /// A user-supplied label
    Labeled(&'static str),
}

impl ScopeTag {
    pub(crate) fn anonymous() -> Self {
        ScopeTag::Anonymous(NEXT_ANONYMOUS_TAG.fetch_add(1, Ordering::Relaxed))
    }

    /// The label for labeled tags, `None` for anonymous ones.
    pub fn label(&self) -> Option<&'static str> {
        match *self {
            ScopeTag::Anonymous(_) => None,
            ScopeTag::Labeled(label) => Some(label),
        }
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeTag::Anonymous(id) => write!(f, "scope-{}", id),
            ScopeTag::Labeled(label) => f.write_str(label),
        }
    }
}

// Every scope resolves `LifetimeScope` to itself through this single
// well-known registration. The activator surfaces the activation scope, so
// no scope ever owns itself through its shared-instance map.
static SELF_REGISTRATION: Lazy<Arc<Registration>> = Lazy::new(|| {
    let activator: ActivatorFn = Arc::new(|ctx: &mut ResolveRequestContext<'_>| {
        let scope = ctx.activation_scope().clone();
        Ok(Some(scope as AnyArc))
    });
    Arc::new(Registration {
        id: RegistrationId::SCOPE_SELF,
        services: vec![Service::of::<LifetimeScope>()],
        description: "arbor_di::scope::LifetimeScope",
        activator,
        lifetime: ComponentLifetime::CurrentScope,
        sharing: InstanceSharing::None,
        ownership: InstanceOwnership::ExternallyOwned,
        pipeline: Arc::new(ResolvePipeline::build(vec![
            Arc::new(ScopeSelectionMiddleware),
            Arc::new(ActivationMiddleware),
        ])),
        disposal: None,
    })
});

pub(crate) fn scope_self_registration() -> Arc<Registration> {
    SELF_REGISTRATION.clone()
}

/// A node in the container's scope tree.
///
/// Each scope carries its own component registry view, shared-instance store,
/// disposer and tag. Parents are visible to children; siblings are isolated.
/// Disposing a scope releases every instance it owns, in reverse activation
/// order, exactly once.
///
/// # Examples
///
/// ```rust
/// use arbor_di::ContainerBuilder;
/// use std::sync::Arc;
///
/// struct Connection;
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register::<Connection, _>(|_| Ok(Connection))
///     .instance_per_lifetime_scope();
/// let container = builder.build();
///
/// let request_scope = container.begin_lifetime_scope().unwrap();
/// let a = request_scope.resolve::<Connection>().unwrap();
/// let b = request_scope.resolve::<Connection>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let other_scope = container.begin_lifetime_scope().unwrap();
/// let c = other_scope.resolve::<Connection>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &c));
/// ```
pub struct LifetimeScope {
    tag: ScopeTag,
    parent: Option<Arc<LifetimeScope>>,
    root: Weak<LifetimeScope>,
    self_ref: Weak<LifetimeScope>,
    registry: Arc<ComponentRegistry>,
    shared: SharedInstanceStore,
    disposer: Disposer,
    disposing: AtomicBool,
    disposed: AtomicBool,
    diagnostics: Arc<DiagnosticHub>,
    child_beginning: Mutex<Vec<ChildBeginningHandler>>,
    scope_ending: Mutex<Vec<ScopeEndingHandler>>,
    operation_beginning: Mutex<Vec<OperationBeginningHandler>>,
}

impl LifetimeScope {
    pub(crate) fn new_root(
        registry: Arc<ComponentRegistry>,
        diagnostics: Arc<DiagnosticHub>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| LifetimeScope {
            tag: ScopeTag::Labeled(ROOT_TAG),
            parent: None,
            root: weak.clone(),
            self_ref: weak.clone(),
            registry,
            shared: SharedInstanceStore::new(),
            disposer: Disposer::new(),
            disposing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            diagnostics,
            child_beginning: Mutex::new(Vec::new()),
            scope_ending: Mutex::new(Vec::new()),
            operation_beginning: Mutex::new(Vec::new()),
        })
    }

    /// This scope's tag.
    pub fn tag(&self) -> &ScopeTag {
        &self.tag
    }

    /// The parent scope, `None` for the root.
    pub fn parent(&self) -> Option<&Arc<LifetimeScope>> {
        self.parent.as_ref()
    }

    /// The root of the scope tree.
    pub fn root(&self) -> Arc<LifetimeScope> {
        self.root
            .upgrade()
            .expect("the root scope outlives every descendant")
    }

    /// Whether this scope is the root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The registry view this scope resolves against.
    pub fn component_registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// This scope's shared-instance store.
    pub fn shared_instances(&self) -> &SharedInstanceStore {
        &self.shared
    }

    /// This scope's disposer.
    pub fn disposer(&self) -> &Disposer {
        &self.disposer
    }

    /// Whether this scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn diagnostics(&self) -> &Arc<DiagnosticHub> {
        &self.diagnostics
    }

    pub(crate) fn ensure_alive(&self) -> DiResult<()> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.disposed.load(Ordering::Acquire) {
                return Err(DiError::ScopeDisposed);
            }
            current = scope.parent.as_deref();
        }
        Ok(())
    }

    fn strong(&self) -> Arc<LifetimeScope> {
        self.self_ref
            .upgrade()
            .expect("a live scope upgrades its own self-reference")
    }

    // --- Child scopes ---

    /// Begins an anonymous child scope sharing this scope's registry.
    pub fn begin_lifetime_scope(&self) -> DiResult<Arc<LifetimeScope>> {
        self.begin_child(ScopeTag::anonymous(), None, false)
    }

    /// Begins a tagged child scope. Fails with
    /// [`DiError::DuplicateScopeTag`] when the tag is already present on this
    /// scope or any ancestor.
    pub fn begin_lifetime_scope_tagged(&self, tag: &'static str) -> DiResult<Arc<LifetimeScope>> {
        self.begin_child(ScopeTag::Labeled(tag), None, false)
    }

    /// Begins a child scope whose registry overlays the registrations added
    /// by `configure` on top of this scope's registry.
    pub fn begin_lifetime_scope_with(
        &self,
        tag: Option<&'static str>,
        configure: impl FnOnce(&mut ContainerBuilder),
    ) -> DiResult<Arc<LifetimeScope>> {
        let mut builder = ContainerBuilder::new();
        configure(&mut builder);
        self.begin_child(
            tag.map_or_else(ScopeTag::anonymous, ScopeTag::Labeled),
            Some(builder),
            false,
        )
    }

    /// As [`begin_lifetime_scope_with`](Self::begin_lifetime_scope_with), but
    /// the child's registry is created in isolated mode: only registration
    /// sources flagged as adapters for individual components are inherited.
    pub fn begin_isolated_lifetime_scope(
        &self,
        tag: Option<&'static str>,
        configure: impl FnOnce(&mut ContainerBuilder),
    ) -> DiResult<Arc<LifetimeScope>> {
        let mut builder = ContainerBuilder::new();
        configure(&mut builder);
        self.begin_child(
            tag.map_or_else(ScopeTag::anonymous, ScopeTag::Labeled),
            Some(builder),
            true,
        )
    }

    fn begin_child(
        &self,
        tag: ScopeTag,
        overlay: Option<ContainerBuilder>,
        isolated: bool,
    ) -> DiResult<Arc<LifetimeScope>> {
        self.ensure_alive()?;
        if let ScopeTag::Labeled(label) = tag {
            let mut current = Some(self);
            while let Some(scope) = current {
                if scope.tag.label() == Some(label) {
                    return Err(DiError::DuplicateScopeTag(label));
                }
                current = scope.parent.as_deref();
            }
        }
        let registry = match overlay {
            None if !isolated => self.registry.clone(),
            None => Arc::new(ComponentRegistry::new_child(
                &self.registry,
                HashMap::new(),
                HashMap::new(),
                Vec::new(),
                HashMap::new(),
                true,
            )),
            Some(builder) => builder.into_child_registry(&self.registry, isolated),
        };
        let child = Arc::new_cyclic(|weak| LifetimeScope {
            tag,
            parent: Some(self.strong()),
            root: self.root.clone(),
            self_ref: weak.clone(),
            registry,
            shared: SharedInstanceStore::new(),
            disposer: Disposer::new(),
            disposing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            diagnostics: self.diagnostics.clone(),
            child_beginning: Mutex::new(Vec::new()),
            scope_ending: Mutex::new(Vec::new()),
            operation_beginning: Mutex::new(Vec::new()),
        });
        let handlers: Vec<ChildBeginningHandler> = self.child_beginning.lock().clone();
        let event = ChildScopeBeginningEvent { child: &child };
        for handler in &handlers {
            handler(&event);
        }
        Ok(child)
    }

    // --- Resolution ---

    /// Resolves a concrete service.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::of::<T>())?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete service, absent when unregistered or when its
    /// lifetime policy finds no owning scope.
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.try_resolve_service(&Service::of::<T>())? {
            Some(any) => any
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>())),
            None => Ok(None),
        }
    }

    /// Resolves a trait-object service.
    pub fn resolve_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::of_trait::<T>())?;
        any.downcast::<Arc<T>>()
            .map(|wrapped| (*wrapped).clone())
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a trait-object service, absent when unregistered or when its
    /// lifetime policy finds no owning scope.
    pub fn try_resolve_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> DiResult<Option<Arc<T>>> {
        match self.try_resolve_service(&Service::of_trait::<T>())? {
            Some(any) => any
                .downcast::<Arc<T>>()
                .map(|wrapped| Some((*wrapped).clone()))
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>())),
            None => Ok(None),
        }
    }

    /// Resolves a keyed concrete service.
    pub fn resolve_keyed<T: Send + Sync + 'static>(&self, key: &'static str) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::keyed::<T>(key))?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a keyed trait-object service.
    pub fn resolve_keyed_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &'static str,
    ) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::keyed_trait::<T>(key))?;
        any.downcast::<Arc<T>>()
            .map(|wrapped| (*wrapped).clone())
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete service with explicit activation parameters.
    pub fn resolve_with_parameters<T: Send + Sync + 'static>(
        &self,
        parameters: Vec<Parameter>,
    ) -> DiResult<Arc<T>> {
        let service = Service::of::<T>();
        let registration = self
            .registry
            .default_registration_for(&service)
            .ok_or_else(|| DiError::NotRegistered(service.display_name()))?;
        let request = ResolveRequest::new(service, registration).with_parameters(parameters);
        let any = self.resolve_request(request)?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves an arbitrary service to its type-erased instance.
    pub fn resolve_service(&self, service: &Service) -> DiResult<AnyArc> {
        let registration = self
            .registry
            .default_registration_for(service)
            .ok_or_else(|| DiError::NotRegistered(service.display_name()))?;
        self.resolve_request(ResolveRequest::new(service.clone(), registration))
    }

    /// Resolves an arbitrary service, absent when unregistered or when its
    /// lifetime policy finds no owning scope.
    pub fn try_resolve_service(&self, service: &Service) -> DiResult<Option<AnyArc>> {
        let Some(registration) = self.registry.default_registration_for(service) else {
            return Ok(None);
        };
        self.try_resolve_request(ResolveRequest::new(service.clone(), registration))
    }

    /// Creates a resolve operation bound to this scope and executes `request`
    /// through it.
    pub fn resolve_request(&self, request: ResolveRequest) -> DiResult<AnyArc> {
        self.ensure_alive()?;
        let scope = self.strong();
        let operation = ResolveOperation::new(&scope);
        self.raise_operation_beginning(&operation);
        operation.execute(request)
    }

    /// As [`resolve_request`](Self::resolve_request), for a non-required
    /// request.
    pub fn try_resolve_request(&self, request: ResolveRequest) -> DiResult<Option<AnyArc>> {
        self.ensure_alive()?;
        let scope = self.strong();
        let operation = ResolveOperation::new(&scope);
        self.raise_operation_beginning(&operation);
        operation.execute_optional(request)
    }

    /// Whether any visible registration provides `T`.
    pub fn is_registered<T: Send + Sync + 'static>(&self) -> bool {
        self.registry.is_registered(&Service::of::<T>())
    }

    // --- Shared-instance delegation ---

    /// Returns the cached shared instance for the key, or creates it through
    /// this scope's store.
    pub fn create_shared_instance(
        &self,
        id: RegistrationId,
        qualifier: Option<usize>,
        component: &'static str,
        creator: impl FnOnce() -> DiResult<Option<AnyArc>>,
    ) -> DiResult<Option<AnyArc>> {
        self.shared.get_or_create(id, qualifier, component, creator)
    }

    /// Looks up a shared instance in this scope's store.
    pub fn try_get_shared_instance(
        &self,
        id: RegistrationId,
        qualifier: Option<usize>,
    ) -> Option<AnyArc> {
        self.shared.try_get_qualified(id, qualifier)
    }

    // --- Events ---

    /// Registers a handler invoked after each child of this scope is created.
    pub fn on_child_scope_beginning(
        &self,
        handler: impl for<'a> Fn(&ChildScopeBeginningEvent<'a>) + Send + Sync + 'static,
    ) {
        self.child_beginning.lock().push(Arc::new(handler));
    }

    /// Registers a handler invoked when this scope's disposal begins, before
    /// owned instances are released.
    pub fn on_scope_ending(
        &self,
        handler: impl for<'a> Fn(&ScopeEndingEvent<'a>) + Send + Sync + 'static,
    ) {
        self.scope_ending.lock().push(Arc::new(handler));
    }

    /// Registers a handler invoked with every resolve operation beginning on
    /// this scope, before the operation executes.
    pub fn on_resolve_operation_beginning(
        &self,
        handler: impl Fn(&ResolveOperation) + Send + Sync + 'static,
    ) {
        self.operation_beginning.lock().push(Arc::new(handler));
    }

    fn raise_operation_beginning(&self, operation: &ResolveOperation) {
        let handlers: Vec<OperationBeginningHandler> = self.operation_beginning.lock().clone();
        for handler in &handlers {
            handler(operation);
        }
    }

    // --- Disposal ---

    /// Disposes this scope: raises the scope-ending event, releases owned
    /// instances in reverse activation order, clears the shared-instance
    /// store. Idempotent.
    pub fn dispose(&self) -> DiResult<()> {
        if self.disposing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.raise_scope_ending();
        let result = self.disposer.dispose();
        self.shared.clear();
        self.disposed.store(true, Ordering::Release);
        result
    }

    /// As [`dispose`](Self::dispose), awaiting asynchronous release hooks.
    pub async fn dispose_async(&self) {
        if self.disposing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.raise_scope_ending();
        self.disposer.dispose_async().await;
        self.shared.clear();
        self.disposed.store(true, Ordering::Release);
    }

    fn raise_scope_ending(&self) {
        let handlers: Vec<ScopeEndingHandler> = self.scope_ending.lock().clone();
        let event = ScopeEndingEvent { scope: self };
        for handler in &handlers {
            handler(&event);
        }
    }
}

impl Drop for LifetimeScope {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::Acquire) && self.disposer.has_pending() {
            log::warn!(
                "lifetime scope {} dropped with undisposed resources; call dispose() or dispose_async()",
                self.tag
            );
        }
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("tag", &self.tag)
            .field("is_root", &self.is_root())
            .field("is_disposed", &self.is_disposed())
            .finish()
    }
}
