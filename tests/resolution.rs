use arbor_di::{ContainerBuilder, DiError, LifetimeScope, Parameter};
use std::sync::{Arc, Mutex};

#[test]
fn test_single_instance_shared_across_scopes() {
    struct Database {
        url: String,
    }

    let activations = Arc::new(Mutex::new(0));
    let activations_clone = activations.clone();

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Database, _>(move |_| {
            *activations_clone.lock().unwrap() += 1;
            Ok(Database {
                url: "postgres://localhost".to_string(),
            })
        })
        .single_instance();

    let container = builder.build();
    let scope = container.begin_lifetime_scope().unwrap();
    let nested = scope.begin_lifetime_scope().unwrap();

    let from_root = container.resolve::<Database>().unwrap();
    let from_scope = scope.resolve::<Database>().unwrap();
    let from_nested = nested.resolve::<Database>().unwrap();

    assert!(Arc::ptr_eq(&from_root, &from_scope));
    assert!(Arc::ptr_eq(&from_root, &from_nested));
    assert_eq!(*activations.lock().unwrap(), 1);
    assert_eq!(from_root.url, "postgres://localhost");
}

#[test]
fn test_instance_per_dependency_is_fresh_each_resolve() {
    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut builder = ContainerBuilder::new();
    builder.register::<String, _>(move |_| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        Ok(format!("value-{}", *c))
    });

    let container = builder.build();
    let a = container.resolve::<String>().unwrap();
    let b = container.resolve::<String>().unwrap();

    assert_eq!(a.as_str(), "value-1");
    assert_eq!(b.as_str(), "value-2");
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_instance_per_lifetime_scope_isolation() {
    struct RequestContext {
        id: String,
    }

    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut builder = ContainerBuilder::new();
    builder
        .register::<RequestContext, _>(move |_| {
            let mut c = counter_clone.lock().unwrap();
            *c += 1;
            Ok(RequestContext {
                id: format!("req-{}", *c),
            })
        })
        .instance_per_lifetime_scope();

    let container = builder.build();
    let scope1 = container.begin_lifetime_scope().unwrap();
    let scope2 = container.begin_lifetime_scope().unwrap();

    let ctx1a = scope1.resolve::<RequestContext>().unwrap();
    let ctx1b = scope1.resolve::<RequestContext>().unwrap();
    let ctx2 = scope2.resolve::<RequestContext>().unwrap();

    assert!(Arc::ptr_eq(&ctx1a, &ctx1b));
    assert!(!Arc::ptr_eq(&ctx1a, &ctx2));
    assert_eq!(ctx1a.id, "req-1");
    assert_eq!(ctx2.id, "req-2");
}

#[test]
fn test_nested_dependency_resolution() {
    struct Config {
        prefix: String,
    }

    struct Greeter {
        config: Arc<Config>,
    }

    let mut builder = ContainerBuilder::new();
    builder
        .register::<Config, _>(|_| {
            Ok(Config {
                prefix: "hello".to_string(),
            })
        })
        .single_instance();
    builder.register::<Greeter, _>(|ctx| {
        Ok(Greeter {
            config: ctx.resolve::<Config>()?,
        })
    });

    let container = builder.build();
    let greeter = container.resolve::<Greeter>().unwrap();
    assert_eq!(greeter.config.prefix, "hello");

    // The singleton dependency is the shared one.
    let config = container.resolve::<Config>().unwrap();
    assert!(Arc::ptr_eq(&greeter.config, &config));
}

#[test]
fn test_unregistered_service_errors() {
    let container = ContainerBuilder::new().build();
    assert!(matches!(
        container.resolve::<u64>(),
        Err(DiError::NotRegistered(_))
    ));
}

#[test]
fn test_try_resolve_absent_and_present() {
    let mut builder = ContainerBuilder::new();
    builder.register::<u32, _>(|_| Ok(5));
    let container = builder.build();

    assert!(container.try_resolve::<u64>().unwrap().is_none());
    assert_eq!(*container.try_resolve::<u32>().unwrap().unwrap(), 5);
}

#[test]
fn test_register_instance_is_shared() {
    struct Settings {
        retries: u32,
    }

    let mut builder = ContainerBuilder::new();
    builder.register_instance(Settings { retries: 3 });
    let container = builder.build();

    let a = container.resolve::<Settings>().unwrap();
    let b = container.resolve::<Settings>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.retries, 3);
}

#[test]
fn test_keyed_trait_resolution() {
    trait Transport: Send + Sync {
        fn scheme(&self) -> &'static str;
    }

    struct Http;
    impl Transport for Http {
        fn scheme(&self) -> &'static str {
            "http"
        }
    }

    struct Tls;
    impl Transport for Tls {
        fn scheme(&self) -> &'static str {
            "https"
        }
    }

    let mut builder = ContainerBuilder::new();
    builder
        .register_trait::<dyn Transport, _>(|_| Ok(Arc::new(Http)))
        .as_keyed("plain");
    builder
        .register_trait::<dyn Transport, _>(|_| Ok(Arc::new(Tls)))
        .as_keyed("secure");

    let container = builder.build();
    let plain = container
        .root_scope()
        .resolve_keyed_trait::<dyn Transport>("plain")
        .unwrap();
    let secure = container
        .root_scope()
        .resolve_keyed_trait::<dyn Transport>("secure")
        .unwrap();
    assert_eq!(plain.scheme(), "http");
    assert_eq!(secure.scheme(), "https");
}

#[test]
fn test_parameters_reach_the_activator() {
    struct Listener {
        port: u16,
        host: String,
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Listener, _>(|ctx| {
        let port = ctx.parameter_typed::<u16>().map(|p| *p).unwrap_or(8080);
        let host = ctx
            .parameter_named::<String>("host")
            .map(|h| (*h).clone())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        Ok(Listener { port, host })
    });

    let container = builder.build();
    let default = container.resolve::<Listener>().unwrap();
    assert_eq!(default.port, 8080);
    assert_eq!(default.host, "127.0.0.1");

    let custom = container
        .resolve_with_parameters::<Listener>(vec![
            Parameter::typed(9090u16),
            Parameter::named("host", "0.0.0.0".to_string()),
        ])
        .unwrap();
    assert_eq!(custom.port, 9090);
    assert_eq!(custom.host, "0.0.0.0");
}

#[test]
fn test_optional_binding() {
    struct Feature;

    let mut builder = ContainerBuilder::new();
    builder.register_optional::<Feature, _>(|_| Ok(None));
    let container = builder.build();

    // Required resolve of an absent binding fails.
    assert!(matches!(
        container.resolve::<Feature>(),
        Err(DiError::PipelineCompletedWithNoInstance(_))
    ));
    // Non-required resolve observes the permitted absence.
    assert!(container.try_resolve::<Feature>().unwrap().is_none());
}

#[test]
fn test_activator_failure_propagates() {
    struct Flaky;

    let mut builder = ContainerBuilder::new();
    builder.register::<Flaky, _>(|_| Err(DiError::activation("Flaky", "backing store offline")));
    let container = builder.build();

    match container.resolve::<Flaky>() {
        Err(DiError::ActivatorFailure { component, message }) => {
            assert_eq!(component, "Flaky");
            assert_eq!(message, "backing store offline");
        }
        other => panic!("unexpected outcome: {:?}", other.err()),
    }
}

#[test]
fn test_scope_resolves_itself_at_every_level() {
    let container = ContainerBuilder::new().build();
    let child = container.begin_lifetime_scope().unwrap();
    let grandchild = child.begin_lifetime_scope().unwrap();

    let resolved_root = container.root_scope().resolve::<LifetimeScope>().unwrap();
    let resolved_child = child.resolve::<LifetimeScope>().unwrap();
    let resolved_grandchild = grandchild.resolve::<LifetimeScope>().unwrap();

    assert!(Arc::ptr_eq(&resolved_root, container.root_scope()));
    assert!(Arc::ptr_eq(&resolved_child, &child));
    assert!(Arc::ptr_eq(&resolved_grandchild, &grandchild));
}

#[test]
fn test_resolve_from_disposed_scope_fails() {
    let mut builder = ContainerBuilder::new();
    builder.register::<u32, _>(|_| Ok(1));
    let container = builder.build();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.dispose().unwrap();
    assert!(matches!(
        scope.resolve::<u32>(),
        Err(DiError::ScopeDisposed)
    ));

    // Descendants of a disposed scope are unusable too.
    let parent = container.begin_lifetime_scope().unwrap();
    let child = parent.begin_lifetime_scope().unwrap();
    parent.dispose().unwrap();
    assert!(matches!(child.resolve::<u32>(), Err(DiError::ScopeDisposed)));
}

#[test]
fn test_last_registration_wins() {
    let mut builder = ContainerBuilder::new();
    builder.register::<u32, _>(|_| Ok(1));
    builder.register::<u32, _>(|_| Ok(2));
    let container = builder.build();
    assert_eq!(*container.resolve::<u32>().unwrap(), 2);
}

#[test]
fn test_singleton_dependencies_resolve_from_owning_scope() {
    // A singleton activated from a child scope must take its own scoped
    // dependencies from the root, not from the resolving child.
    struct Marker {
        scope_is_root: bool,
    }

    struct Holder {
        marker: Arc<Marker>,
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Marker, _>(|ctx| {
        Ok(Marker {
            scope_is_root: ctx.activation_scope().is_root(),
        })
    });
    builder
        .register::<Holder, _>(|ctx| {
            Ok(Holder {
                marker: ctx.resolve::<Marker>()?,
            })
        })
        .single_instance();

    let container = builder.build();
    let child = container.begin_lifetime_scope().unwrap();
    let holder = child.resolve::<Holder>().unwrap();
    assert!(holder.marker.scope_is_root);
}
