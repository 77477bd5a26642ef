//! Per-request resolution state.

use std::sync::Arc;

use crate::decoration::DecoratorContext;
use crate::error::{DiError, DiResult};
use crate::events::{CompletingHandler, RequestCompletingEvent};
use crate::operation::{CompletedRequest, ResolveOperation};
use crate::parameter::Parameter;
use crate::pipeline::PipelinePhase;
use crate::registration::{AnyArc, Registration};
use crate::scope::LifetimeScope;
use crate::service::Service;

/// Input to a resolve: the service asked for, the registration to activate it
/// with, and the parameters handed to the activator.
pub struct ResolveRequest {
    pub(crate) service: Service,
    pub(crate) registration: Arc<Registration>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) decorator_target: Option<AnyArc>,
}

impl ResolveRequest {
    /// A request for `service` through `registration`, with no parameters.
    pub fn new(service: Service, registration: Arc<Registration>) -> Self {
        Self {
            service,
            registration,
            parameters: Vec::new(),
            decorator_target: None,
        }
    }

    /// Attaches activation parameters.
    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub(crate) fn with_decorator_target(mut self, target: AnyArc) -> Self {
        self.decorator_target = Some(target);
        self
    }
}

/// Mutable state carried through a single request's pipeline traversal.
///
/// The context is what middleware stages mutate and what activator closures
/// receive; factories resolve their own dependencies through it, which routes
/// nested requests into the same [`ResolveOperation`].
pub struct ResolveRequestContext<'op> {
    operation: &'op ResolveOperation,
    activation_scope: Arc<LifetimeScope>,
    registration: Arc<Registration>,
    service: Service,
    parameters: Vec<Parameter>,
    instance: Option<AnyArc>,
    phase: PipelinePhase,
    decorator_target: Option<AnyArc>,
    decorator_context: Option<DecoratorContext>,
    required: bool,
    completing: Vec<CompletingHandler>,
}

impl<'op> ResolveRequestContext<'op> {
    pub(crate) fn new(
        operation: &'op ResolveOperation,
        activation_scope: Arc<LifetimeScope>,
        request: ResolveRequest,
        required: bool,
    ) -> Self {
        Self {
            operation,
            activation_scope,
            registration: request.registration,
            service: request.service,
            parameters: request.parameters,
            instance: None,
            phase: PipelinePhase::ResolveRequestStart,
            decorator_target: request.decorator_target,
            decorator_context: None,
            required,
            completing: Vec::new(),
        }
    }

    /// The operation this request belongs to.
    pub fn operation(&self) -> &'op ResolveOperation {
        self.operation
    }

    /// The scope the instance will be activated in. Scope selection replaces
    /// this with the owning scope chosen by the lifetime policy.
    pub fn activation_scope(&self) -> &Arc<LifetimeScope> {
        &self.activation_scope
    }

    /// The registration being resolved.
    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    /// The service the request asks for.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// The activation parameters, in request order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Replaces the parameter sequence for the remainder of the pipeline.
    pub fn change_parameters(&mut self, parameters: Vec<Parameter>) {
        self.parameters = parameters;
    }

    /// Re-targets the request at `scope` and records it as the operation's
    /// most nested scope.
    pub fn change_scope(&mut self, scope: Arc<LifetimeScope>) {
        self.operation.set_current_scope(scope.clone());
        self.activation_scope = scope;
    }

    /// The instance produced so far, if any.
    pub fn instance(&self) -> Option<&AnyArc> {
        self.instance.as_ref()
    }

    /// Sets the produced instance. An instance, once set, can be replaced by
    /// a canonical or decorated one but never removed.
    pub fn set_instance(&mut self, instance: AnyArc) {
        self.instance = Some(instance);
    }

    /// The furthest pipeline phase this request has reached.
    pub fn phase_reached(&self) -> PipelinePhase {
        self.phase
    }

    pub(crate) fn advance_phase(&mut self, phase: PipelinePhase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }

    /// `true` iff the instance was produced by this request's own activation
    /// rather than surfaced from a shared store.
    pub fn new_instance_activated(&self) -> bool {
        self.instance.is_some() && self.phase == PipelinePhase::Activation
    }

    /// Whether an absent instance is a failure for this request.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The instance this request is decorating, when the request represents a
    /// decorator layer.
    pub fn decorator_target(&self) -> Option<&AnyArc> {
        self.decorator_target.as_ref()
    }

    /// The decorator target downcast to a concrete type.
    pub fn decorator_target_as<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let target = self.decorator_target.clone().ok_or_else(|| {
            DiError::activation(
                self.registration.description(),
                "resolve request carries no decorator target",
            )
        })?;
        target
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// The decorator target downcast to a trait object.
    pub fn decorator_target_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let target = self.decorator_target.clone().ok_or_else(|| {
            DiError::activation(
                self.registration.description(),
                "resolve request carries no decorator target",
            )
        })?;
        target
            .downcast::<Arc<T>>()
            .map(|wrapped| (*wrapped).clone())
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// The decorator chain applied to this request's instance, when
    /// decoration ran.
    pub fn decorator_context(&self) -> Option<&DecoratorContext> {
        self.decorator_context.as_ref()
    }

    pub(crate) fn set_decorator_context(&mut self, context: DecoratorContext) {
        self.decorator_context = Some(context);
    }

    /// Registers a handler fired exactly once, after the operation's
    /// outermost request returns, if this request completes successfully.
    pub fn on_completing(
        &mut self,
        handler: impl for<'a> FnOnce(&RequestCompletingEvent<'a>) + 'static,
    ) {
        self.completing.push(Box::new(handler));
    }

    // --- Nested resolution, used by activator closures ---

    /// Resolves a concrete dependency from the activation scope.
    pub fn resolve<T: Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::of::<T>())?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete dependency, absent when unregistered or when its
    /// lifetime policy finds no owning scope.
    pub fn try_resolve<T: Send + Sync + 'static>(&mut self) -> DiResult<Option<Arc<T>>> {
        match self.try_resolve_service(&Service::of::<T>())? {
            Some(any) => any
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>())),
            None => Ok(None),
        }
    }

    /// Resolves a trait-object dependency.
    pub fn resolve_trait<T: ?Sized + Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::of_trait::<T>())?;
        any.downcast::<Arc<T>>()
            .map(|wrapped| (*wrapped).clone())
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a keyed concrete dependency.
    pub fn resolve_keyed<T: Send + Sync + 'static>(&mut self, key: &'static str) -> DiResult<Arc<T>> {
        let any = self.resolve_service(&Service::keyed::<T>(key))?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete dependency with explicit activation parameters.
    pub fn resolve_with_parameters<T: Send + Sync + 'static>(
        &mut self,
        parameters: Vec<Parameter>,
    ) -> DiResult<Arc<T>> {
        let service = Service::of::<T>();
        let registration = self.lookup(&service)?;
        let request = ResolveRequest::new(service, registration).with_parameters(parameters);
        let operation = self.operation;
        let any = operation.get_or_create_instance(&self.activation_scope, request)?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete dependency inside a fresh request segment, so the
    /// nested sub-graph's cycle detection ignores requests already in progress
    /// above it.
    pub fn resolve_isolated<T: Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        let operation = self.operation;
        let token = operation.enter_segment();
        let result = self.resolve::<T>();
        operation.exit_segment(token);
        result
    }

    /// Resolves an arbitrary service to its type-erased instance.
    pub fn resolve_service(&mut self, service: &Service) -> DiResult<AnyArc> {
        let registration = self.lookup(service)?;
        let request = ResolveRequest::new(service.clone(), registration);
        let operation = self.operation;
        operation.get_or_create_instance(&self.activation_scope, request)
    }

    /// Resolves an arbitrary service, absent when unregistered or when its
    /// lifetime policy finds no owning scope.
    pub fn try_resolve_service(&mut self, service: &Service) -> DiResult<Option<AnyArc>> {
        let Some(registration) = self
            .activation_scope
            .component_registry()
            .default_registration_for(service)
        else {
            return Ok(None);
        };
        let request = ResolveRequest::new(service.clone(), registration);
        let operation = self.operation;
        operation.try_get_or_create_instance(&self.activation_scope, request)
    }

    /// First parameter named `name` holding a `T`.
    pub fn parameter_named<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.parameters
            .iter()
            .find_map(|parameter| parameter.value_named::<T>(name))
    }

    /// First parameter typed as `T`.
    pub fn parameter_typed<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.parameters
            .iter()
            .find_map(|parameter| parameter.value_typed::<T>())
    }

    fn lookup(&self, service: &Service) -> DiResult<Arc<Registration>> {
        self.activation_scope
            .component_registry()
            .default_registration_for(service)
            .ok_or_else(|| DiError::NotRegistered(service.display_name()))
    }

    pub(crate) fn into_completed(self) -> Option<CompletedRequest> {
        let instance = self.instance?;
        Some(CompletedRequest::new(
            self.service,
            instance,
            self.decorator_context,
            self.completing,
        ))
    }
}
