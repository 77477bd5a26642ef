use arbor_di::{
    ContainerBuilder, DiError, Registration, RegistrationAccessor, RegistrationSource, Service,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_parent_registrations_visible_to_descendants() {
    struct Shared;

    let mut builder = ContainerBuilder::new();
    builder.register::<Shared, _>(|_| Ok(Shared));
    let container = builder.build();

    let child = container.begin_lifetime_scope().unwrap();
    let grandchild = child.begin_lifetime_scope().unwrap();
    assert!(grandchild.resolve::<Shared>().is_ok());
}

#[test]
fn test_child_overlay_overrides_parent_registration() {
    let mut builder = ContainerBuilder::new();
    builder.register::<u32, _>(|_| Ok(1));
    let container = builder.build();

    let child = container
        .begin_lifetime_scope_with(None, |overlay| {
            overlay.register::<u32, _>(|_| Ok(2));
        })
        .unwrap();

    assert_eq!(*child.resolve::<u32>().unwrap(), 2);
    // The parent's view is untouched, and siblings cannot see the overlay.
    assert_eq!(*container.resolve::<u32>().unwrap(), 1);
    let sibling = container.begin_lifetime_scope().unwrap();
    assert_eq!(*sibling.resolve::<u32>().unwrap(), 1);
}

#[test]
fn test_overlay_only_components_are_gone_with_the_scope() {
    struct ScopedOnly;

    let container = ContainerBuilder::new().build();
    let child = container
        .begin_lifetime_scope_with(None, |overlay| {
            overlay.register::<ScopedOnly, _>(|_| Ok(ScopedOnly));
        })
        .unwrap();

    assert!(child.resolve::<ScopedOnly>().is_ok());
    assert!(matches!(
        container.resolve::<ScopedOnly>(),
        Err(DiError::NotRegistered(_))
    ));
}

#[test]
fn test_duplicate_tag_on_any_ancestor_fails() {
    let container = ContainerBuilder::new().build();
    let unit = container.begin_lifetime_scope_tagged("unit").unwrap();
    let inner = unit.begin_lifetime_scope().unwrap();

    assert!(matches!(
        inner.begin_lifetime_scope_tagged("unit"),
        Err(DiError::DuplicateScopeTag("unit"))
    ));
    // The root carries the well-known root tag.
    assert!(matches!(
        container.begin_lifetime_scope_tagged(arbor_di::ROOT_TAG),
        Err(DiError::DuplicateScopeTag(_))
    ));
    // Sibling subtrees may reuse the tag.
    assert!(container.begin_lifetime_scope_tagged("other").is_ok());
}

#[test]
fn test_anonymous_scopes_never_collide() {
    let container = ContainerBuilder::new().build();
    let a = container.begin_lifetime_scope().unwrap();
    let b = container.begin_lifetime_scope().unwrap();
    assert_ne!(a.tag(), b.tag());
    assert!(a.begin_lifetime_scope().is_ok());
}

#[test]
fn test_matching_scope_resolution() {
    struct UnitOfWork;

    let activations = Arc::new(Mutex::new(0));
    let activations_clone = activations.clone();

    let mut builder = ContainerBuilder::new();
    builder
        .register::<UnitOfWork, _>(move |_| {
            *activations_clone.lock().unwrap() += 1;
            Ok(UnitOfWork)
        })
        .instance_per_matching_scope(["unit"]);
    let container = builder.build();

    let unit = container.begin_lifetime_scope_tagged("unit").unwrap();
    let inner = unit.begin_lifetime_scope().unwrap();

    // Both resolves surface the instance owned by the "unit" ancestor.
    let a = inner.resolve::<UnitOfWork>().unwrap();
    let b = inner.resolve::<UnitOfWork>().unwrap();
    let c = unit.resolve::<UnitOfWork>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(*activations.lock().unwrap(), 1);
    assert_eq!(unit.shared_instances().shared_count(), 1);
    assert_eq!(inner.shared_instances().shared_count(), 0);
}

#[test]
fn test_matching_scope_without_ancestor_fails() {
    struct UnitOfWork;

    let mut builder = ContainerBuilder::new();
    builder
        .register::<UnitOfWork, _>(|_| Ok(UnitOfWork))
        .instance_per_matching_scope(["unit"]);
    let container = builder.build();

    let stray = container.begin_lifetime_scope().unwrap();
    match stray.resolve::<UnitOfWork>() {
        Err(DiError::MatchingScopeNotFound { searched }) => {
            assert_eq!(searched, vec!["unit"]);
        }
        other => panic!("unexpected outcome: {:?}", other.err()),
    }
    // The non-required form short-circuits instead of raising.
    assert!(stray.try_resolve::<UnitOfWork>().unwrap().is_none());
}

#[test]
fn test_child_scope_beginning_event() {
    let container = ContainerBuilder::new().build();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    container.root_scope().on_child_scope_beginning(
        move |event: &arbor_di::ChildScopeBeginningEvent<'_>| {
            seen_clone.lock().unwrap().push(format!("{}", event.child.tag()));
        },
    );

    container.begin_lifetime_scope_tagged("request").unwrap();
    container.begin_lifetime_scope_tagged("job").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["request", "job"]);
}

#[test]
fn test_scope_ending_fires_once_despite_double_dispose() {
    let container = ContainerBuilder::new().build();
    let scope = container.begin_lifetime_scope().unwrap();

    let endings = Arc::new(AtomicUsize::new(0));
    let endings_clone = endings.clone();
    scope.on_scope_ending(move |_| {
        endings_clone.fetch_add(1, Ordering::SeqCst);
    });

    scope.dispose().unwrap();
    scope.dispose().unwrap();
    assert_eq!(endings.load(Ordering::SeqCst), 1);
    assert!(scope.is_disposed());
}

#[test]
fn test_begin_child_from_disposed_scope_fails() {
    let container = ContainerBuilder::new().build();
    let scope = container.begin_lifetime_scope().unwrap();
    scope.dispose().unwrap();
    assert!(matches!(
        scope.begin_lifetime_scope(),
        Err(DiError::ScopeDisposed)
    ));
}

struct PortSource {
    adapter: bool,
}

impl RegistrationSource for PortSource {
    fn registrations_for(
        &self,
        service: &Service,
        _accessor: &RegistrationAccessor<'_>,
    ) -> Vec<Arc<Registration>> {
        if *service == Service::of::<u64>() {
            vec![Registration::component::<u64, _>(|_| Ok(4242))]
        } else {
            Vec::new()
        }
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        self.adapter
    }
}

#[test]
fn test_registration_source_provides_dynamic_registrations() {
    let mut builder = ContainerBuilder::new();
    builder.register_source(Arc::new(PortSource { adapter: false }));
    let container = builder.build();

    assert_eq!(*container.resolve::<u64>().unwrap(), 4242);
    // Plain children see the source through the shared registry.
    let child = container.begin_lifetime_scope().unwrap();
    assert_eq!(*child.resolve::<u64>().unwrap(), 4242);
    // Configured children reach it through the parent chain.
    let configured = container
        .begin_lifetime_scope_with(None, |overlay| {
            overlay.register::<u8, _>(|_| Ok(1));
        })
        .unwrap();
    assert_eq!(*configured.resolve::<u64>().unwrap(), 4242);
}

#[test]
fn test_isolated_scope_inherits_only_adapter_sources() {
    let mut builder = ContainerBuilder::new();
    builder.register_source(Arc::new(PortSource { adapter: false }));
    let container = builder.build();

    let isolated = container
        .begin_isolated_lifetime_scope(None, |_| {})
        .unwrap();
    assert!(matches!(
        isolated.resolve::<u64>(),
        Err(DiError::NotRegistered(_))
    ));

    let mut builder = ContainerBuilder::new();
    builder.register_source(Arc::new(PortSource { adapter: true }));
    let container = builder.build();

    let isolated = container
        .begin_isolated_lifetime_scope(None, |_| {})
        .unwrap();
    assert_eq!(*isolated.resolve::<u64>().unwrap(), 4242);
}

#[test]
fn test_registry_properties_chain_with_child_overrides() {
    let mut builder = ContainerBuilder::new();
    builder.set_property("environment", "production".to_string());
    builder.set_property("region", "eu-west".to_string());
    let container = builder.build();

    let child = container
        .begin_lifetime_scope_with(None, |overlay| {
            overlay.set_property("environment", "staging".to_string());
        })
        .unwrap();

    let environment = child
        .component_registry()
        .property("environment")
        .and_then(|v| v.downcast::<String>().ok())
        .unwrap();
    let region = child
        .component_registry()
        .property("region")
        .and_then(|v| v.downcast::<String>().ok())
        .unwrap();
    assert_eq!(*environment, "staging");
    assert_eq!(*region, "eu-west");
}

#[test]
fn test_scope_parent_and_root_links() {
    let container = ContainerBuilder::new().build();
    let child = container.begin_lifetime_scope().unwrap();
    let grandchild = child.begin_lifetime_scope().unwrap();

    assert!(container.root_scope().is_root());
    assert!(Arc::ptr_eq(&grandchild.root(), container.root_scope()));
    assert!(Arc::ptr_eq(grandchild.parent().unwrap(), &child));
    assert!(child.parent().unwrap().is_root());
}
