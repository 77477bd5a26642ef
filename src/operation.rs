//! Per-resolve orchestration.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::context::{ResolveRequest, ResolveRequestContext};
use crate::diagnostics::DiagnosticHub;
use crate::error::{DiError, DiResult};
use crate::events::{
    CompletingHandler, OperationEndingEvent, OperationEndingHandler, RequestCompletingEvent,
};
use crate::internal::SegmentedStack;
use crate::registration::{AnyArc, RegistrationId};
use crate::scope::LifetimeScope;
use crate::service::Service;

/// Opaque handle returned by [`ResolveOperation::enter_segment`], restoring
/// the previous cycle-detection boundary on
/// [`exit_segment`](ResolveOperation::exit_segment).
pub struct SegmentToken(usize);

struct RequestFrame {
    registration: RegistrationId,
    service_name: &'static str,
}

/// A request context that produced an instance, retained until its completion
/// handlers fire.
pub(crate) struct CompletedRequest {
    service: Service,
    instance: AnyArc,
    decorator_context: Option<crate::decoration::DecoratorContext>,
    handlers: Vec<CompletingHandler>,
}

impl CompletedRequest {
    pub(crate) fn new(
        service: Service,
        instance: AnyArc,
        decorator_context: Option<crate::decoration::DecoratorContext>,
        handlers: Vec<CompletingHandler>,
    ) -> Self {
        Self {
            service,
            instance,
            decorator_context,
            handlers,
        }
    }

    pub(crate) fn instance(&self) -> AnyArc {
        self.instance.clone()
    }

    fn complete(self) {
        let event = RequestCompletingEvent {
            service: &self.service,
            instance: &self.instance,
            decorators: self.decorator_context.as_ref(),
        };
        for handler in self.handlers {
            handler(&event);
        }
    }
}

type RequestBeginningHandler = Arc<dyn for<'o> Fn(&mut ResolveRequestContext<'o>)>;

/// Orchestrates one user-initiated resolution and all of its nested
/// activations.
///
/// An operation is bound to the scope it started from, sequences requests
/// through their pipelines, tracks the in-progress request stack for cycle
/// detection, and fires completion callbacks in request order once the
/// outermost request has returned.
///
/// Operations are single-threaded: one operation runs on its carrier thread,
/// and nested resolves reuse that thread. They are created by
/// [`LifetimeScope::resolve`](crate::LifetimeScope::resolve) and surfaced to
/// user code through
/// [`on_resolve_operation_beginning`](crate::LifetimeScope::on_resolve_operation_beginning)
/// handlers.
pub struct ResolveOperation {
    scope: Arc<LifetimeScope>,
    root_scope: Arc<LifetimeScope>,
    current_scope: RefCell<Arc<LifetimeScope>>,
    stack: RefCell<SegmentedStack<RequestFrame>>,
    successful: RefCell<Vec<CompletedRequest>>,
    request_depth: Cell<usize>,
    ended: Cell<bool>,
    diagnostics: Arc<DiagnosticHub>,
    request_beginning: RefCell<Vec<RequestBeginningHandler>>,
    operation_ending: RefCell<Vec<OperationEndingHandler>>,
}

impl ResolveOperation {
    pub(crate) fn new(scope: &Arc<LifetimeScope>) -> Self {
        Self {
            scope: scope.clone(),
            root_scope: scope.root(),
            current_scope: RefCell::new(scope.clone()),
            stack: RefCell::new(SegmentedStack::new()),
            successful: RefCell::new(Vec::new()),
            request_depth: Cell::new(0),
            ended: Cell::new(false),
            diagnostics: scope.diagnostics().clone(),
            request_beginning: RefCell::new(Vec::new()),
            operation_ending: RefCell::new(Vec::new()),
        }
    }

    /// The root of the scope tree the operation started in.
    pub fn root_scope(&self) -> &Arc<LifetimeScope> {
        &self.root_scope
    }

    /// The scope the most nested in-flight request is resolving against.
    pub fn current_scope(&self) -> Arc<LifetimeScope> {
        self.current_scope.borrow().clone()
    }

    pub(crate) fn set_current_scope(&self, scope: Arc<LifetimeScope>) {
        *self.current_scope.borrow_mut() = scope;
    }

    /// Depth of the in-flight request nesting.
    pub fn request_depth(&self) -> usize {
        self.request_depth.get()
    }

    /// Whether the operation has ended.
    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    /// Registers a handler invoked with every request context created by this
    /// operation, before the context's pipeline begins.
    pub fn on_resolve_request_beginning(
        &self,
        handler: impl for<'o> Fn(&mut ResolveRequestContext<'o>) + 'static,
    ) {
        self.request_beginning.borrow_mut().push(Arc::new(handler));
    }

    /// Registers a handler invoked exactly once when the operation ends.
    pub fn on_operation_ending(
        &self,
        handler: impl for<'a> Fn(&OperationEndingEvent<'a>) + 'static,
    ) {
        self.operation_ending.borrow_mut().push(Arc::new(handler));
    }

    pub(crate) fn execute(&self, request: ResolveRequest) -> DiResult<AnyArc> {
        let service = request.service.clone();
        let enabled = self.diagnostics.enabled();
        if enabled {
            self.diagnostics.operation_start(&service);
        }
        match self.get_or_create_instance(&self.scope.clone(), request) {
            Ok(instance) => {
                self.end(None);
                if enabled {
                    self.diagnostics.operation_success(&service);
                }
                Ok(instance)
            }
            Err(error) => {
                self.end(Some(&error));
                if enabled {
                    self.diagnostics.operation_failure(&service, &error);
                }
                Err(error)
            }
        }
    }

    pub(crate) fn execute_optional(&self, request: ResolveRequest) -> DiResult<Option<AnyArc>> {
        let service = request.service.clone();
        let enabled = self.diagnostics.enabled();
        if enabled {
            self.diagnostics.operation_start(&service);
        }
        match self.try_get_or_create_instance(&self.scope.clone(), request) {
            Ok(instance) => {
                self.end(None);
                if enabled {
                    self.diagnostics.operation_success(&service);
                }
                Ok(instance)
            }
            Err(error) => {
                self.end(Some(&error));
                if enabled {
                    self.diagnostics.operation_failure(&service, &error);
                }
                Err(error)
            }
        }
    }

    /// Resolves a nested request, failing when its pipeline produces no
    /// instance. Middleware and activators use this to resolve dependencies
    /// within the same operation.
    pub fn get_or_create_instance(
        &self,
        scope: &Arc<LifetimeScope>,
        request: ResolveRequest,
    ) -> DiResult<AnyArc> {
        let service_name = request.service.display_name();
        self.dispatch(scope, request, true)?
            .ok_or(DiError::PipelineCompletedWithNoInstance(service_name))
    }

    /// Resolves a nested request, propagating a permitted absence instead of
    /// failing.
    pub fn try_get_or_create_instance(
        &self,
        scope: &Arc<LifetimeScope>,
        request: ResolveRequest,
    ) -> DiResult<Option<AnyArc>> {
        self.dispatch(scope, request, false)
    }

    /// Opens a fresh cycle-detection segment; requests issued until the token
    /// is returned through [`exit_segment`](Self::exit_segment) only see each
    /// other.
    pub fn enter_segment(&self) -> SegmentToken {
        SegmentToken(self.stack.borrow_mut().enter_segment())
    }

    /// Closes the segment opened by the matching
    /// [`enter_segment`](Self::enter_segment).
    pub fn exit_segment(&self, token: SegmentToken) {
        self.stack.borrow_mut().exit_segment(token.0);
    }

    fn dispatch(
        &self,
        scope: &Arc<LifetimeScope>,
        request: ResolveRequest,
        required: bool,
    ) -> DiResult<Option<AnyArc>> {
        if self.ended.get() {
            return Err(DiError::OperationDisposed);
        }
        scope.ensure_alive()?;

        let frame = RequestFrame {
            registration: request.registration.id(),
            service_name: request.service.display_name(),
        };
        {
            let stack = self.stack.borrow();
            if stack
                .current_segment()
                .iter()
                .any(|in_flight| in_flight.registration == frame.registration)
            {
                let mut path: Vec<&'static str> = stack
                    .current_segment()
                    .iter()
                    .map(|in_flight| in_flight.service_name)
                    .collect();
                path.push(frame.service_name);
                return Err(DiError::CircularDependency(path));
            }
        }

        let service = request.service.clone();
        let mut ctx = ResolveRequestContext::new(self, scope.clone(), request, required);
        let beginning: Vec<RequestBeginningHandler> = self.request_beginning.borrow().clone();
        for handler in &beginning {
            handler(&mut ctx);
        }

        let prior_scope = self.current_scope.replace(scope.clone());
        self.stack.borrow_mut().push(frame);
        self.request_depth.set(self.request_depth.get() + 1);
        let enabled = self.diagnostics.enabled();
        if enabled {
            self.diagnostics.request_start(&service);
        }

        let pipeline = ctx.registration().pipeline().clone();
        let result = pipeline.invoke(&mut ctx);

        self.stack.borrow_mut().pop();
        *self.current_scope.borrow_mut() = prior_scope;
        self.request_depth.set(self.request_depth.get() - 1);

        let outcome = match result {
            Ok(()) => match ctx.into_completed() {
                Some(completed) => {
                    let instance = completed.instance();
                    self.successful.borrow_mut().push(completed);
                    if enabled {
                        self.diagnostics.request_success(&service);
                    }
                    Ok(Some(instance))
                }
                None if required => {
                    let error = DiError::PipelineCompletedWithNoInstance(service.display_name());
                    if enabled {
                        self.diagnostics.request_failure(&service, &error);
                    }
                    Err(error)
                }
                None => {
                    if enabled {
                        self.diagnostics.request_success(&service);
                    }
                    Ok(None)
                }
            },
            Err(error) => {
                if enabled {
                    self.diagnostics.request_failure(&service, &error);
                }
                Err(error)
            }
        };

        if self.stack.borrow().is_empty() {
            self.run_completion_wave();
        }

        outcome
    }

    // Fires completion handlers in push order, each context exactly once,
    // even when a handler's own resolves add further successes.
    fn run_completion_wave(&self) {
        loop {
            let pending: Vec<CompletedRequest> = {
                let mut successful = self.successful.borrow_mut();
                if successful.is_empty() {
                    return;
                }
                successful.drain(..).collect()
            };
            for completed in pending {
                completed.complete();
            }
        }
    }

    fn end(&self, error: Option<&DiError>) {
        if self.ended.replace(true) {
            return;
        }
        let handlers: Vec<OperationEndingHandler> = self.operation_ending.borrow().clone();
        let event = OperationEndingEvent { error };
        for handler in &handlers {
            handler(&event);
        }
    }
}
