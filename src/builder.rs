//! Registration DSL and container construction.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ResolveRequestContext;
use crate::decoration::DecorationMiddleware;
use crate::diagnostics::{DiagnosticHub, DiagnosticSink};
use crate::disposer::{AsyncDispose, Dispose, Disposer};
use crate::error::{DiError, DiResult};
use crate::lifetime::ComponentLifetime;
use crate::parameter::Parameter;
use crate::pipeline::middleware::{
    ActivationMiddleware, ScopeSelectionMiddleware, SharingMiddleware,
};
use crate::pipeline::{ResolveMiddleware, ResolvePipeline};
use crate::registration::{
    ActivatorFn, AnyArc, DisposalHook, InstanceOwnership, InstanceSharing, Registration,
    RegistrationId,
};
use crate::registry::{ComponentRegistry, RegistrationSource};
use crate::scope::{scope_self_registration, LifetimeScope};
use crate::service::Service;

enum PendingKind {
    Component,
    Decorator,
}

struct PendingRegistration {
    services: Vec<Service>,
    description: &'static str,
    activator: ActivatorFn,
    lifetime: ComponentLifetime,
    sharing: InstanceSharing,
    ownership: InstanceOwnership,
    disposal: Option<DisposalHook>,
    middleware: Vec<Arc<dyn ResolveMiddleware>>,
    kind: PendingKind,
}

/// Collects registrations, sources and diagnostic sinks, then builds a
/// [`Container`] — or, as the `configure` argument of
/// [`LifetimeScope::begin_lifetime_scope_with`], an overlay registry for a
/// child scope.
///
/// # Examples
///
/// ```rust
/// use arbor_di::ContainerBuilder;
/// use std::sync::Arc;
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register::<Database, _>(|_| {
///         Ok(Database {
///             url: "postgres://localhost".to_string(),
///         })
///     })
///     .single_instance();
/// builder.register::<UserService, _>(|ctx| {
///     Ok(UserService {
///         db: ctx.resolve::<Database>()?,
///     })
/// });
///
/// let container = builder.build();
/// let users = container.resolve::<UserService>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    pending: Vec<PendingRegistration>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    sinks: Vec<Arc<dyn DiagnosticSink>>,
    properties: HashMap<String, AnyArc>,
}

impl ContainerBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component produced by `factory`. Defaults to a fresh
    /// instance per resolve, anchored to the resolving scope.
    pub fn register<T, F>(&mut self, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>) -> DiResult<T> + Send + Sync + 'static,
    {
        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            factory(ctx).map(|value| Some(Arc::new(value) as AnyArc))
        });
        let pending = self.push_pending(PendingRegistration {
            services: vec![Service::of::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Component,
        });
        RegistrationBuilder {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a component whose factory may legitimately produce nothing
    /// (an optional binding). A required resolve of an absent binding fails
    /// with [`DiError::PipelineCompletedWithNoInstance`].
    pub fn register_optional<T, F>(&mut self, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>) -> DiResult<Option<T>>
            + Send
            + Sync
            + 'static,
    {
        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            factory(ctx).map(|value| value.map(|v| Arc::new(v) as AnyArc))
        });
        let pending = self.push_pending(PendingRegistration {
            services: vec![Service::of::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Component,
        });
        RegistrationBuilder {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers an already constructed instance, shared application-wide.
    pub fn register_instance<T>(&mut self, value: T) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
    {
        let shared = Arc::new(value);
        let activator: ActivatorFn =
            Arc::new(move |_: &mut ResolveRequestContext<'_>| Ok(Some(shared.clone() as AnyArc)));
        let pending = self.push_pending(PendingRegistration {
            services: vec![Service::of::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::RootScope,
            sharing: InstanceSharing::Shared,
            ownership: InstanceOwnership::ExternallyOwned,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Component,
        });
        RegistrationBuilder {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a trait-object component produced by `factory`.
    pub fn register_trait<T, F>(&mut self, factory: F) -> TraitRegistrationBuilder<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            factory(ctx).map(|value| Some(Arc::new(value) as AnyArc))
        });
        let pending = self.push_pending(PendingRegistration {
            services: vec![Service::of_trait::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Component,
        });
        TraitRegistrationBuilder {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers an already constructed trait object, shared
    /// application-wide.
    pub fn register_trait_instance<T>(&mut self, value: Arc<T>) -> TraitRegistrationBuilder<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let shared = Arc::new(value);
        let activator: ActivatorFn =
            Arc::new(move |_: &mut ResolveRequestContext<'_>| Ok(Some(shared.clone() as AnyArc)));
        let pending = self.push_pending(PendingRegistration {
            services: vec![Service::of_trait::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::RootScope,
            sharing: InstanceSharing::Shared,
            ownership: InstanceOwnership::ExternallyOwned,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Component,
        });
        TraitRegistrationBuilder {
            pending,
            _marker: PhantomData,
        }
    }

    /// Registers a decorator wrapping the concrete service `T`. Decorators
    /// apply in registration order, innermost first.
    pub fn register_decorator<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>, Arc<T>) -> DiResult<T>
            + Send
            + Sync
            + 'static,
    {
        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            let target = ctx.decorator_target_as::<T>()?;
            factory(ctx, target).map(|value| Some(Arc::new(value) as AnyArc))
        });
        self.push_pending(PendingRegistration {
            services: vec![Service::of::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Decorator,
        });
    }

    /// Registers a decorator wrapping the trait-object service `T`.
    pub fn register_trait_decorator<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>, Arc<T>) -> DiResult<Arc<T>>
            + Send
            + Sync
            + 'static,
    {
        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            let target = ctx.decorator_target_trait::<T>()?;
            factory(ctx, target).map(|value| Some(Arc::new(value) as AnyArc))
        });
        self.push_pending(PendingRegistration {
            services: vec![Service::of_trait::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            disposal: None,
            middleware: Vec::new(),
            kind: PendingKind::Decorator,
        });
    }

    /// Adds a dynamic registration source.
    pub fn register_source(&mut self, source: Arc<dyn RegistrationSource>) {
        self.sources.push(source);
    }

    /// Adds a diagnostic sink observing every operation and request.
    /// Sinks take effect when the root container is built; sinks added to
    /// child-scope overlay builders are ignored.
    pub fn register_diagnostic_sink(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.sinks.push(sink);
    }

    /// Sets a registry property; child overlays override parent values.
    pub fn set_property<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.properties.insert(key.into(), Arc::new(value));
    }

    /// Builds the container and its root lifetime scope.
    pub fn build(self) -> Container {
        let diagnostics = Arc::new(DiagnosticHub::new(self.sinks));
        let (mut local, decorators) = Self::finalize(self.pending);
        local
            .entry(Service::of::<LifetimeScope>())
            .or_default()
            .push(scope_self_registration());
        let registry = Arc::new(ComponentRegistry::new_root(
            local,
            decorators,
            self.sources,
            self.properties,
        ));
        Container {
            root: LifetimeScope::new_root(registry, diagnostics),
        }
    }

    pub(crate) fn into_child_registry(
        self,
        parent: &Arc<ComponentRegistry>,
        isolated: bool,
    ) -> Arc<ComponentRegistry> {
        let (local, decorators) = Self::finalize(self.pending);
        Arc::new(ComponentRegistry::new_child(
            parent,
            local,
            decorators,
            self.sources,
            self.properties,
            isolated,
        ))
    }

    fn push_pending(&mut self, pending: PendingRegistration) -> &mut PendingRegistration {
        self.pending.push(pending);
        self.pending
            .last_mut()
            .expect("a registration was just pushed")
    }

    #[allow(clippy::type_complexity)]
    fn finalize(
        pending: Vec<PendingRegistration>,
    ) -> (
        HashMap<Service, Vec<Arc<Registration>>>,
        HashMap<Service, Vec<Arc<Registration>>>,
    ) {
        let mut local: HashMap<Service, Vec<Arc<Registration>>> = HashMap::new();
        let mut decorators: HashMap<Service, Vec<Arc<Registration>>> = HashMap::new();
        for entry in pending {
            let mut stages: Vec<Arc<dyn ResolveMiddleware>> = vec![
                Arc::new(ScopeSelectionMiddleware),
                Arc::new(ActivationMiddleware),
            ];
            if matches!(entry.kind, PendingKind::Component) {
                stages.push(Arc::new(DecorationMiddleware));
            }
            if entry.sharing == InstanceSharing::Shared {
                stages.push(Arc::new(SharingMiddleware));
            }
            stages.extend(entry.middleware);
            let registration = Arc::new(Registration {
                id: RegistrationId::next(),
                services: entry.services,
                description: entry.description,
                activator: entry.activator,
                lifetime: entry.lifetime,
                sharing: entry.sharing,
                ownership: entry.ownership,
                pipeline: Arc::new(ResolvePipeline::build(stages)),
                disposal: entry.disposal,
            });
            let target = match entry.kind {
                PendingKind::Component => &mut local,
                PendingKind::Decorator => &mut decorators,
            };
            for service in registration.services() {
                target
                    .entry(service.clone())
                    .or_default()
                    .push(registration.clone());
            }
        }
        (local, decorators)
    }
}

/// Fluent configuration of a concrete-type registration.
pub struct RegistrationBuilder<'b, T: Send + Sync + 'static> {
    pending: &'b mut PendingRegistration,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> RegistrationBuilder<'_, T> {
    /// Exposes the component under a string key instead of its bare type.
    pub fn as_keyed(self, key: &'static str) -> Self {
        self.pending.services = vec![Service::keyed::<T>(key)];
        self
    }

    /// A fresh instance per resolve (the default).
    pub fn instance_per_dependency(self) -> Self {
        self.pending.sharing = InstanceSharing::None;
        self.pending.lifetime = ComponentLifetime::CurrentScope;
        self
    }

    /// One instance per lifetime scope.
    pub fn instance_per_lifetime_scope(self) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::CurrentScope;
        self
    }

    /// One instance for the whole container, owned by the root scope.
    pub fn single_instance(self) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::RootScope;
        self
    }

    /// One instance per nearest ancestor scope tagged with any of `tags`.
    pub fn instance_per_matching_scope(
        self,
        tags: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::MatchingScope(tags.into_iter().collect());
        self
    }

    /// The caller manages the instance's lifetime; the owning scope will not
    /// release it.
    pub fn externally_owned(self) -> Self {
        self.pending.ownership = InstanceOwnership::ExternallyOwned;
        self.pending.disposal = None;
        self
    }

    /// The owning scope releases activated instances through
    /// [`Dispose`] when it is disposed.
    pub fn owned_by_lifetime_scope(self) -> Self
    where
        T: Dispose,
    {
        self.pending.ownership = InstanceOwnership::OwnedByLifetimeScope;
        self.pending.disposal = Some(Arc::new(|instance: &AnyArc, disposer: &Disposer| {
            match instance.clone().downcast::<T>() {
                Ok(concrete) => disposer.register(concrete),
                Err(_) => Err(DiError::TypeMismatch(std::any::type_name::<T>())),
            }
        }));
        self
    }

    /// The owning scope releases activated instances through
    /// [`AsyncDispose`] when it is disposed asynchronously.
    pub fn owned_by_lifetime_scope_async(self) -> Self
    where
        T: AsyncDispose,
    {
        self.pending.ownership = InstanceOwnership::OwnedByLifetimeScope;
        self.pending.disposal = Some(Arc::new(|instance: &AnyArc, disposer: &Disposer| {
            match instance.clone().downcast::<T>() {
                Ok(concrete) => disposer.register_async(concrete),
                Err(_) => Err(DiError::TypeMismatch(std::any::type_name::<T>())),
            }
        }));
        self
    }

    /// Adds a middleware stage to this registration's resolve pipeline.
    pub fn with_middleware(self, stage: Arc<dyn ResolveMiddleware>) -> Self {
        self.pending.middleware.push(stage);
        self
    }
}

/// Fluent configuration of a trait-object registration.
pub struct TraitRegistrationBuilder<'b, T: ?Sized + Send + Sync + 'static> {
    pending: &'b mut PendingRegistration,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> TraitRegistrationBuilder<'_, T> {
    /// Exposes the component under a string key instead of the bare trait.
    pub fn as_keyed(self, key: &'static str) -> Self {
        self.pending.services = vec![Service::keyed_trait::<T>(key)];
        self
    }

    /// A fresh instance per resolve (the default).
    pub fn instance_per_dependency(self) -> Self {
        self.pending.sharing = InstanceSharing::None;
        self.pending.lifetime = ComponentLifetime::CurrentScope;
        self
    }

    /// One instance per lifetime scope.
    pub fn instance_per_lifetime_scope(self) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::CurrentScope;
        self
    }

    /// One instance for the whole container, owned by the root scope.
    pub fn single_instance(self) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::RootScope;
        self
    }

    /// One instance per nearest ancestor scope tagged with any of `tags`.
    pub fn instance_per_matching_scope(
        self,
        tags: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.pending.sharing = InstanceSharing::Shared;
        self.pending.lifetime = ComponentLifetime::MatchingScope(tags.into_iter().collect());
        self
    }

    /// The caller manages the instance's lifetime; the owning scope will not
    /// release it.
    pub fn externally_owned(self) -> Self {
        self.pending.ownership = InstanceOwnership::ExternallyOwned;
        self.pending.disposal = None;
        self
    }

    /// The owning scope releases activated instances through
    /// [`Dispose`] when it is disposed.
    pub fn owned_by_lifetime_scope(self) -> Self
    where
        T: Dispose,
    {
        self.pending.ownership = InstanceOwnership::OwnedByLifetimeScope;
        self.pending.disposal = Some(Arc::new(|instance: &AnyArc, disposer: &Disposer| {
            match instance.clone().downcast::<Arc<T>>() {
                Ok(wrapped) => disposer.register((*wrapped).clone()),
                Err(_) => Err(DiError::TypeMismatch(std::any::type_name::<T>())),
            }
        }));
        self
    }

    /// The owning scope releases activated instances through
    /// [`AsyncDispose`] when it is disposed asynchronously.
    pub fn owned_by_lifetime_scope_async(self) -> Self
    where
        T: AsyncDispose,
    {
        self.pending.ownership = InstanceOwnership::OwnedByLifetimeScope;
        self.pending.disposal = Some(Arc::new(|instance: &AnyArc, disposer: &Disposer| {
            match instance.clone().downcast::<Arc<T>>() {
                Ok(wrapped) => disposer.register_async((*wrapped).clone()),
                Err(_) => Err(DiError::TypeMismatch(std::any::type_name::<T>())),
            }
        }));
        self
    }

    /// Adds a middleware stage to this registration's resolve pipeline.
    pub fn with_middleware(self, stage: Arc<dyn ResolveMiddleware>) -> Self {
        self.pending.middleware.push(stage);
        self
    }
}

/// The built container: owner of the root [`LifetimeScope`].
///
/// All resolution methods delegate to the root scope; create child scopes for
/// request- or unit-scoped work.
pub struct Container {
    root: Arc<LifetimeScope>,
}

impl Container {
    /// The root lifetime scope.
    pub fn root_scope(&self) -> &Arc<LifetimeScope> {
        &self.root
    }

    /// Resolves a concrete service from the root scope.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.root.resolve::<T>()
    }

    /// Resolves a concrete service from the root scope, absent when
    /// unregistered or when its lifetime policy finds no owning scope.
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        self.root.try_resolve::<T>()
    }

    /// Resolves a trait-object service from the root scope.
    pub fn resolve_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.root.resolve_trait::<T>()
    }

    /// Resolves a keyed concrete service from the root scope.
    pub fn resolve_keyed<T: Send + Sync + 'static>(&self, key: &'static str) -> DiResult<Arc<T>> {
        self.root.resolve_keyed::<T>(key)
    }

    /// Begins an anonymous child scope of the root.
    pub fn begin_lifetime_scope(&self) -> DiResult<Arc<LifetimeScope>> {
        self.root.begin_lifetime_scope()
    }

    /// Begins a tagged child scope of the root.
    pub fn begin_lifetime_scope_tagged(&self, tag: &'static str) -> DiResult<Arc<LifetimeScope>> {
        self.root.begin_lifetime_scope_tagged(tag)
    }

    /// Begins a configured child scope of the root.
    pub fn begin_lifetime_scope_with(
        &self,
        tag: Option<&'static str>,
        configure: impl FnOnce(&mut ContainerBuilder),
    ) -> DiResult<Arc<LifetimeScope>> {
        self.root.begin_lifetime_scope_with(tag, configure)
    }

    /// Begins an isolated, configured child scope of the root.
    pub fn begin_isolated_lifetime_scope(
        &self,
        tag: Option<&'static str>,
        configure: impl FnOnce(&mut ContainerBuilder),
    ) -> DiResult<Arc<LifetimeScope>> {
        self.root.begin_isolated_lifetime_scope(tag, configure)
    }

    /// Resolves a concrete service with explicit activation parameters.
    pub fn resolve_with_parameters<T: Send + Sync + 'static>(
        &self,
        parameters: Vec<Parameter>,
    ) -> DiResult<Arc<T>> {
        self.root.resolve_with_parameters::<T>(parameters)
    }

    /// Disposes the root scope and everything it owns.
    pub fn dispose(&self) -> DiResult<()> {
        self.root.dispose()
    }

    /// Disposes the root scope, awaiting asynchronous release hooks.
    pub async fn dispose_async(&self) {
        self.root.dispose_async().await
    }
}
