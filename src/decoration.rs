//! Decorator application and ordering.

use crate::context::{ResolveRequest, ResolveRequestContext};
use crate::error::DiResult;
use crate::pipeline::{Next, PipelinePhase, ResolveMiddleware};
use crate::registration::{AnyArc, InstanceSharing};
use crate::service::Service;

/// Qualifier under which the fully decorated instance of a shared
/// registration is canonicalized in the owning scope's store.
pub(crate) const DECORATED_QUALIFIER: usize = 1;

/// Ordered record of the decorator layers applied to a service.
///
/// The first entry is the undecorated base instance; each subsequent entry is
/// the instance produced by one decorator layer, in registration order. The
/// chain is surfaced on the
/// [`RequestCompletingEvent`](crate::RequestCompletingEvent) and through
/// [`ResolveRequestContext::decorator_context`].
#[derive(Clone)]
pub struct DecoratorContext {
    applied: Vec<(Service, AnyArc)>,
}

impl DecoratorContext {
    pub(crate) fn new(service: Service, base: AnyArc) -> Self {
        Self {
            applied: vec![(service, base)],
        }
    }

    pub(crate) fn push(&mut self, service: Service, instance: AnyArc) {
        self.applied.push((service, instance));
    }

    /// The outermost instance produced so far.
    pub fn current_instance(&self) -> &AnyArc {
        // The chain always holds at least the base entry.
        &self.applied[self.applied.len() - 1].1
    }

    /// The base instance followed by each decorator layer, in application
    /// order.
    pub fn applied_decorators(&self) -> &[(Service, AnyArc)] {
        &self.applied
    }

    /// Number of decorator layers applied (the base instance not counted).
    pub fn decorator_count(&self) -> usize {
        self.applied.len() - 1
    }
}

/// Wraps a freshly activated instance with the decorators registered for its
/// service, in registration order.
///
/// Shared registrations canonicalize the decorated instance under a qualified
/// store key, so repeated resolves surface the same decorated object rather
/// than re-wrapping the cached base.
pub(crate) struct DecorationMiddleware;

impl ResolveMiddleware for DecorationMiddleware {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Decoration
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        ctx.advance_phase(PipelinePhase::Decoration);
        if ctx.decorator_target().is_some() {
            // A decorator layer is itself never decorated further.
            return next.proceed(ctx);
        }
        next.proceed(ctx)?;

        let Some(base) = ctx.instance().cloned() else {
            return Ok(());
        };
        let decorators = ctx
            .activation_scope()
            .component_registry()
            .decorators_for(ctx.service());
        if decorators.is_empty() {
            return Ok(());
        }

        let shared = ctx.registration().sharing() == InstanceSharing::Shared;
        let id = ctx.registration().id();

        if !ctx.new_instance_activated() {
            // The base came out of the shared store; so did its decoration.
            if shared {
                if let Some(decorated) = ctx
                    .activation_scope()
                    .shared_instances()
                    .try_get_qualified(id, Some(DECORATED_QUALIFIER))
                {
                    ctx.set_instance(decorated);
                }
            }
            return Ok(());
        }

        let mut chain = DecoratorContext::new(ctx.service().clone(), base.clone());
        let mut current = base;
        for decorator in decorators {
            let request = ResolveRequest::new(ctx.service().clone(), decorator)
                .with_parameters(ctx.parameters().to_vec())
                .with_decorator_target(current.clone());
            let scope = ctx.activation_scope().clone();
            current = ctx.operation().get_or_create_instance(&scope, request)?;
            chain.push(ctx.service().clone(), current.clone());
        }

        if shared {
            current = ctx
                .activation_scope()
                .shared_instances()
                .get_or_insert_qualified(id, DECORATED_QUALIFIER, current);
        }
        ctx.set_decorator_context(chain);
        ctx.set_instance(current);
        Ok(())
    }
}
