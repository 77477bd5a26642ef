//! Built-in pipeline stages.

use crate::context::ResolveRequestContext;
use crate::error::DiResult;
use crate::pipeline::{Next, PipelinePhase, ResolveMiddleware};
use crate::registration::{InstanceOwnership, InstanceSharing};

/// Selects the owning scope from the registration's lifetime policy.
///
/// Required requests propagate a policy failure; non-required requests
/// short-circuit the pipeline without an instance, which the caller observes
/// as a permitted absence.
pub(crate) struct ScopeSelectionMiddleware;

impl ResolveMiddleware for ScopeSelectionMiddleware {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ScopeSelection
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        ctx.advance_phase(PipelinePhase::ScopeSelection);
        let lifetime = ctx.registration().lifetime().clone();
        if ctx.is_required() {
            let selected = lifetime.find_scope(ctx.activation_scope())?;
            ctx.change_scope(selected);
            next.proceed(ctx)
        } else {
            match lifetime.try_find_scope(ctx.activation_scope()) {
                Some(selected) => {
                    ctx.change_scope(selected);
                    next.proceed(ctx)
                }
                None => Ok(()),
            }
        }
    }
}

/// Consults and populates the selected scope's shared-instance store.
///
/// The creator runs the rest of the chain and yields whatever instance
/// activation produced; when it yields nothing, sharing records nothing.
pub(crate) struct SharingMiddleware;

impl ResolveMiddleware for SharingMiddleware {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Sharing
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        ctx.advance_phase(PipelinePhase::Sharing);
        if ctx.registration().sharing() != InstanceSharing::Shared {
            return next.proceed(ctx);
        }
        let scope = ctx.activation_scope().clone();
        let id = ctx.registration().id();
        let component = ctx.registration().description();
        let canonical = scope.shared_instances().get_or_create(id, None, component, || {
            next.proceed(ctx)?;
            Ok(ctx.instance().cloned())
        })?;
        if let Some(instance) = canonical {
            ctx.set_instance(instance);
        }
        Ok(())
    }
}

/// Runs the registration's activator and registers owned disposables with the
/// selected scope's disposer.
pub(crate) struct ActivationMiddleware;

impl ResolveMiddleware for ActivationMiddleware {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Activation
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        ctx.advance_phase(PipelinePhase::Activation);
        let registration = ctx.registration().clone();
        let produced = registration.activate(ctx)?;
        if let Some(instance) = produced {
            if registration.ownership() == InstanceOwnership::OwnedByLifetimeScope {
                if let Some(hook) = registration.disposal_hook() {
                    hook(&instance, ctx.activation_scope().disposer())?;
                }
            }
            ctx.set_instance(instance);
        }
        next.proceed(ctx)
    }
}
