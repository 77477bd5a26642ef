//! The resolve pipeline: staged middleware every request flows through.
//!
//! A pipeline is an ordered composition of middleware entries sorted by
//! [`PipelinePhase`]. Composition happens once, when the registration is
//! built; invocation threads the request context and a stage index through
//! the chain rather than allocating a closure per resolve.

pub(crate) mod middleware;

use std::sync::Arc;

use crate::context::ResolveRequestContext;
use crate::error::DiResult;

/// The ordered phases of a resolve pipeline.
///
/// Middleware declares the phase it belongs to; the composer orders stages by
/// phase (stable within a phase) and requests traverse them outermost first.
/// The framing phases (`ServicePipelineStart`/`End`,
/// `RegistrationPipelineStart`/`End`) carry no built-in stages; they exist so
/// user middleware can anchor itself around the service-wide and
/// registration-specific halves of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelinePhase {
    /// Outermost: the request has been created and nothing has run yet
    ResolveRequestStart,
    /// The lifetime policy selects the owning scope
    ScopeSelection,
    /// Decorators wrap the instance produced further in
    Decoration,
    /// The shared-instance store short-circuits or records activation
    Sharing,
    /// Start of the service-wide half of the chain
    ServicePipelineStart,
    /// End of the service-wide half of the chain
    ServicePipelineEnd,
    /// Start of the registration-specific half of the chain
    RegistrationPipelineStart,
    /// End of the registration-specific half of the chain
    RegistrationPipelineEnd,
    /// Innermost: the activator produces the raw instance
    Activation,
}

/// A stage in the resolve pipeline.
///
/// A middleware may mutate the context and choose to call
/// [`Next::proceed`] or short-circuit by returning without it. Errors
/// propagate unchanged to the resolve caller.
///
/// # Examples
///
/// ```rust
/// use arbor_di::{
///     ContainerBuilder, DiResult, Next, PipelinePhase, ResolveMiddleware, ResolveRequestContext,
/// };
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct CountingStage {
///     seen: AtomicUsize,
/// }
///
/// impl ResolveMiddleware for CountingStage {
///     fn phase(&self) -> PipelinePhase {
///         PipelinePhase::ResolveRequestStart
///     }
///
///     fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
///         self.seen.fetch_add(1, Ordering::Relaxed);
///         next.proceed(ctx)
///     }
/// }
///
/// let stage = Arc::new(CountingStage::default());
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register::<u32, _>(|_| Ok(1))
///     .with_middleware(stage.clone());
/// let container = builder.build();
/// let _ = container.resolve::<u32>().unwrap();
/// assert_eq!(stage.seen.load(Ordering::Relaxed), 1);
/// ```
pub trait ResolveMiddleware: Send + Sync {
    /// The phase this stage sorts into.
    fn phase(&self) -> PipelinePhase;

    /// Runs the stage against the request context.
    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()>;
}

/// Continuation handle a middleware uses to invoke the rest of the chain.
pub struct Next<'a> {
    pipeline: &'a ResolvePipeline,
    index: usize,
}

impl Next<'_> {
    /// Invokes the remaining stages. Not calling this short-circuits the
    /// pipeline.
    pub fn proceed(&self, ctx: &mut ResolveRequestContext<'_>) -> DiResult<()> {
        match self.pipeline.stages.get(self.index) {
            Some(stage) => stage.execute(
                ctx,
                Next {
                    pipeline: self.pipeline,
                    index: self.index + 1,
                },
            ),
            None => Ok(()),
        }
    }
}

/// The precomposed, phase-ordered middleware chain of one registration.
pub struct ResolvePipeline {
    stages: Vec<Arc<dyn ResolveMiddleware>>,
}

impl ResolvePipeline {
    pub(crate) fn build(mut stages: Vec<Arc<dyn ResolveMiddleware>>) -> Self {
        stages.sort_by_key(|stage| stage.phase());
        Self { stages }
    }

    /// Number of composed stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn invoke(&self, ctx: &mut ResolveRequestContext<'_>) -> DiResult<()> {
        Next {
            pipeline: self,
            index: 0,
        }
        .proceed(ctx)
    }
}
