use arbor_di::{
    ContainerBuilder, DiError, DiResult, DiagnosticSink, Next, PipelinePhase, ResolveMiddleware,
    ResolveRequestContext, Service,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct RecordingStage {
    phase: PipelinePhase,
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ResolveMiddleware for RecordingStage {
    fn phase(&self) -> PipelinePhase {
        self.phase
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        self.log.lock().unwrap().push(self.name);
        next.proceed(ctx)
    }
}

#[test]
fn test_middleware_runs_in_phase_order_regardless_of_insertion() {
    struct Widget;

    let log = Arc::new(Mutex::new(Vec::new()));
    let activation_log = log.clone();

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Widget, _>(move |_| {
            activation_log.lock().unwrap().push("activate");
            Ok(Widget)
        })
        // Added innermost-first; phase ordering puts them back in place.
        .with_middleware(Arc::new(RecordingStage {
            phase: PipelinePhase::RegistrationPipelineEnd,
            name: "late",
            log: log.clone(),
        }))
        .with_middleware(Arc::new(RecordingStage {
            phase: PipelinePhase::ResolveRequestStart,
            name: "early",
            log: log.clone(),
        }));

    let container = builder.build();
    let _ = container.resolve::<Widget>().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["early", "late", "activate"]);
}

struct ShortCircuitStage;

impl ResolveMiddleware for ShortCircuitStage {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ResolveRequestStart
    }

    fn execute(&self, _ctx: &mut ResolveRequestContext<'_>, _next: Next<'_>) -> DiResult<()> {
        Ok(())
    }
}

#[test]
fn test_short_circuit_without_instance() {
    struct Widget;

    let activations = Arc::new(AtomicUsize::new(0));
    let activations_clone = activations.clone();

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Widget, _>(move |_| {
            activations_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Widget)
        })
        .with_middleware(Arc::new(ShortCircuitStage));

    let container = builder.build();
    assert!(matches!(
        container.resolve::<Widget>(),
        Err(DiError::PipelineCompletedWithNoInstance(_))
    ));
    assert!(container.try_resolve::<Widget>().unwrap().is_none());
    assert_eq!(activations.load(Ordering::SeqCst), 0);
}

fn short_name(full: &str) -> String {
    full.rsplit("::").next().unwrap_or(full).to_string()
}

#[test]
fn test_completion_handlers_fire_in_push_order_after_outermost_returns() {
    struct A {
        _b: Arc<B>,
    }
    struct B;

    let mut builder = ContainerBuilder::new();
    builder.register::<A, _>(|ctx| Ok(A { _b: ctx.resolve::<B>()? }));
    builder.register::<B, _>(|_| Ok(B));
    let container = builder.build();

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let events_probe = events.clone();
    container
        .root_scope()
        .on_resolve_operation_beginning(move |operation| {
            let events = events_probe.clone();
            operation.on_resolve_request_beginning(move |ctx: &mut ResolveRequestContext<'_>| {
                let events = events.clone();
                let name = short_name(ctx.service().display_name());
                events.lock().unwrap().push(format!("begin:{}", name));
                ctx.on_completing(move |event: &arbor_di::RequestCompletingEvent<'_>| {
                    let name = short_name(event.service.display_name());
                    events.lock().unwrap().push(format!("complete:{}", name));
                });
            });
        });

    let _ = container.resolve::<A>().unwrap();

    let recorded = events.lock().unwrap();
    assert_eq!(
        *recorded,
        vec![
            "begin:A".to_string(),
            "begin:B".to_string(),
            "complete:B".to_string(),
            "complete:A".to_string(),
        ]
    );
}

#[test]
fn test_operation_ending_fires_exactly_once() {
    struct Flaky;

    let mut builder = ContainerBuilder::new();
    builder.register::<Flaky, _>(|_| Err(DiError::activation("Flaky", "boom")));
    builder.register::<u32, _>(|_| Ok(9));
    let container = builder.build();

    let endings = Arc::new(Mutex::new(Vec::new()));
    let endings_probe = endings.clone();
    container
        .root_scope()
        .on_resolve_operation_beginning(move |operation| {
            let endings = endings_probe.clone();
            operation.on_operation_ending(move |event: &arbor_di::OperationEndingEvent<'_>| {
                endings.lock().unwrap().push(event.error.is_some());
            });
        });

    assert!(container.resolve::<Flaky>().is_err());
    let _ = container.resolve::<u32>().unwrap();

    assert_eq!(*endings.lock().unwrap(), vec![true, false]);
}

#[test]
fn test_short_circuited_request_fires_no_completion() {
    struct UnitOfWork;

    let mut builder = ContainerBuilder::new();
    builder
        .register::<UnitOfWork, _>(|_| Ok(UnitOfWork))
        .instance_per_matching_scope(["unit"]);
    let container = builder.build();

    let completions = Arc::new(AtomicUsize::new(0));
    let stray = container.begin_lifetime_scope().unwrap();
    let completions_probe = completions.clone();
    stray.on_resolve_operation_beginning(move |operation| {
        let completions = completions_probe.clone();
        operation.on_resolve_request_beginning(move |ctx: &mut ResolveRequestContext<'_>| {
            let completions = completions.clone();
            ctx.on_completing(move |_: &arbor_di::RequestCompletingEvent<'_>| {
                completions.fetch_add(1, Ordering::SeqCst);
            });
        });
    });

    assert!(stray.try_resolve::<UnitOfWork>().unwrap().is_none());
    assert_eq!(completions.load(Ordering::SeqCst), 0);
}

#[derive(Default)]
struct CountingSink {
    operations: AtomicUsize,
    operation_failures: AtomicUsize,
    requests: AtomicUsize,
    request_failures: AtomicUsize,
}

impl DiagnosticSink for CountingSink {
    fn operation_start(&self, _service: &Service) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn operation_failure(&self, _service: &Service, _error: &DiError) {
        self.operation_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn request_start(&self, _service: &Service) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn request_failure(&self, _service: &Service, _error: &DiError) {
        self.request_failures.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_diagnostic_sink_observes_operations_and_requests() {
    struct A {
        _b: Arc<B>,
    }
    struct B;
    struct Flaky;

    let sink = Arc::new(CountingSink::default());

    let mut builder = ContainerBuilder::new();
    builder.register::<A, _>(|ctx| Ok(A { _b: ctx.resolve::<B>()? }));
    builder.register::<B, _>(|_| Ok(B));
    builder.register::<Flaky, _>(|_| Err(DiError::activation("Flaky", "boom")));
    builder.register_diagnostic_sink(sink.clone());
    let container = builder.build();

    let _ = container.resolve::<A>().unwrap();
    assert_eq!(sink.operations.load(Ordering::SeqCst), 1);
    assert_eq!(sink.requests.load(Ordering::SeqCst), 2);
    assert_eq!(sink.request_failures.load(Ordering::SeqCst), 0);

    assert!(container.resolve::<Flaky>().is_err());
    assert_eq!(sink.operations.load(Ordering::SeqCst), 2);
    assert_eq!(sink.operation_failures.load(Ordering::SeqCst), 1);
    assert_eq!(sink.request_failures.load(Ordering::SeqCst), 1);
}

struct ParameterInjectingStage;

impl ResolveMiddleware for ParameterInjectingStage {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::RegistrationPipelineStart
    }

    fn execute(&self, ctx: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        ctx.change_parameters(vec![arbor_di::Parameter::named(
            "source",
            "middleware".to_string(),
        )]);
        next.proceed(ctx)
    }
}

#[test]
fn test_middleware_can_rewrite_parameters() {
    struct Labeled {
        source: String,
    }

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Labeled, _>(|ctx| {
            Ok(Labeled {
                source: ctx
                    .parameter_named::<String>("source")
                    .map(|s| (*s).clone())
                    .unwrap_or_else(|| "default".to_string()),
            })
        })
        .with_middleware(Arc::new(ParameterInjectingStage));

    let container = builder.build();
    let labeled = container.resolve::<Labeled>().unwrap();
    assert_eq!(labeled.source, "middleware");
}

#[test]
fn test_operation_begins_with_no_requests_in_flight() {
    struct Widget;

    let mut builder = ContainerBuilder::new();
    builder.register::<Widget, _>(|_| Ok(Widget));
    let container = builder.build();

    let depth_seen = Arc::new(AtomicUsize::new(usize::MAX));
    let scope = container.begin_lifetime_scope().unwrap();
    let depth_probe = depth_seen.clone();
    scope.on_resolve_operation_beginning(move |operation| {
        // Subscribed before execution: nothing in flight yet.
        depth_probe.store(operation.request_depth(), Ordering::SeqCst);
    });

    let _ = scope.resolve::<Widget>().unwrap();
    assert_eq!(depth_seen.load(Ordering::SeqCst), 0);
}
