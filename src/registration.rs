//! Component registration types.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::ResolveRequestContext;
use crate::disposer::Disposer;
use crate::error::DiResult;
use crate::lifetime::ComponentLifetime;
use crate::pipeline::ResolvePipeline;
use crate::service::Service;

/// Type-erased instance handle as stored and returned by the container.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Produces a raw instance from the request context.
///
/// Returning `Ok(None)` is reserved for activators that explicitly represent
/// an optional binding; a required request whose pipeline ends without an
/// instance fails with
/// [`DiError::PipelineCompletedWithNoInstance`](crate::DiError::PipelineCompletedWithNoInstance).
pub type ActivatorFn =
    Arc<dyn for<'o> Fn(&mut ResolveRequestContext<'o>) -> DiResult<Option<AnyArc>> + Send + Sync>;

/// Registers an activated instance with the owning scope's disposer.
pub(crate) type DisposalHook = Arc<dyn Fn(&AnyArc, &Disposer) -> DiResult<()> + Send + Sync>;

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, globally unique identity of a registration.
///
/// Shared-instance caches key on this id, and cycle detection compares
/// in-flight requests by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Well-known id of the scope self-registration, so that resolving
    /// [`LifetimeScope`](crate::LifetimeScope) from any scope yields that scope.
    pub const SCOPE_SELF: RegistrationId = RegistrationId(0);

    pub(crate) fn next() -> Self {
        RegistrationId(NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration-{}", self.0)
    }
}

/// Whether a registration yields one instance per owning scope or a fresh
/// instance on every resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSharing {
    /// A fresh instance per resolve
    None,
    /// One instance per owning scope, cached in that scope's shared store
    Shared,
}

/// Whether the owning scope disposes activated instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOwnership {
    /// The selected scope tracks the instance and releases it on disposal
    OwnedByLifetimeScope,
    /// The caller is responsible for the instance's lifetime
    ExternallyOwned,
}

/// The immutable binding of services to an activator and its resolve pipeline.
///
/// Registrations are assembled by [`ContainerBuilder`](crate::ContainerBuilder)
/// and shared between the scopes that can see them. The pipeline is composed
/// once, at build time.
pub struct Registration {
    pub(crate) id: RegistrationId,
    pub(crate) services: Vec<Service>,
    pub(crate) description: &'static str,
    pub(crate) activator: ActivatorFn,
    pub(crate) lifetime: ComponentLifetime,
    pub(crate) sharing: InstanceSharing,
    pub(crate) ownership: InstanceOwnership,
    pub(crate) pipeline: Arc<ResolvePipeline>,
    pub(crate) disposal: Option<DisposalHook>,
}

impl Registration {
    /// A standalone per-dependency registration for `T`, with the standard
    /// component pipeline. This is the shape a
    /// [`RegistrationSource`](crate::RegistrationSource) produces registrations
    /// in; statically registered components go through
    /// [`ContainerBuilder`](crate::ContainerBuilder) instead.
    pub fn component<T, F>(factory: F) -> Arc<Registration>
    where
        T: Send + Sync + 'static,
        F: for<'o> Fn(&mut ResolveRequestContext<'o>) -> DiResult<T> + Send + Sync + 'static,
    {
        use crate::decoration::DecorationMiddleware;
        use crate::pipeline::middleware::{ActivationMiddleware, ScopeSelectionMiddleware};

        let activator: ActivatorFn = Arc::new(move |ctx: &mut ResolveRequestContext<'_>| {
            factory(ctx).map(|value| Some(Arc::new(value) as AnyArc))
        });
        Arc::new(Registration {
            id: RegistrationId::next(),
            services: vec![Service::of::<T>()],
            description: std::any::type_name::<T>(),
            activator,
            lifetime: ComponentLifetime::CurrentScope,
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByLifetimeScope,
            pipeline: Arc::new(ResolvePipeline::build(vec![
                Arc::new(ScopeSelectionMiddleware),
                Arc::new(DecorationMiddleware),
                Arc::new(ActivationMiddleware),
            ])),
            disposal: None,
        })
    }

    /// The registration's stable identity.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// The services this registration provides.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// The implementing type's name, for diagnostics.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// The lifetime policy selecting the owning scope.
    pub fn lifetime(&self) -> &ComponentLifetime {
        &self.lifetime
    }

    /// The sharing mode.
    pub fn sharing(&self) -> InstanceSharing {
        self.sharing
    }

    /// The ownership mode.
    pub fn ownership(&self) -> InstanceOwnership {
        self.ownership
    }

    /// The precomposed resolve pipeline every request for this registration
    /// flows through.
    pub fn pipeline(&self) -> &Arc<ResolvePipeline> {
        &self.pipeline
    }

    pub(crate) fn activate(
        &self,
        ctx: &mut ResolveRequestContext<'_>,
    ) -> DiResult<Option<AnyArc>> {
        (self.activator)(ctx)
    }

    pub(crate) fn disposal_hook(&self) -> Option<&DisposalHook> {
        self.disposal.as_ref()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("lifetime", &self.lifetime)
            .field("sharing", &self.sharing)
            .field("ownership", &self.ownership)
            .finish()
    }
}
