//! Component registries and registration sources.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::registration::{AnyArc, Registration};
use crate::service::Service;

/// Read-only view a registration source gets of the registry's statically
/// known registrations, so it can adapt them without re-entering other
/// sources.
pub struct RegistrationAccessor<'a> {
    registry: &'a ComponentRegistry,
}

impl RegistrationAccessor<'_> {
    /// All statically registered providers of `service`, nearest-overlay last.
    pub fn registrations_for(&self, service: &Service) -> Vec<Arc<Registration>> {
        let mut found = Vec::new();
        let mut current = Some(self.registry);
        while let Some(registry) = current {
            if let Some(registrations) = registry.local.get(service) {
                found.extend(registrations.iter().cloned());
            }
            current = registry.parent.as_deref();
        }
        found
    }
}

/// Dynamic provider of registrations, consulted when no static registration
/// covers a requested service.
///
/// Source output is cached per registry and per service, so each scope
/// overlay (and each isolated scope in particular) keeps its own adapter
/// state.
pub trait RegistrationSource: Send + Sync {
    /// Registrations this source can provide for `service`, in preference
    /// order (last wins as the default).
    fn registrations_for(
        &self,
        service: &Service,
        accessor: &RegistrationAccessor<'_>,
    ) -> Vec<Arc<Registration>>;

    /// Whether this source merely adapts individual component registrations
    /// (and is therefore safe to inherit into isolated child scopes).
    fn is_adapter_for_individual_components(&self) -> bool {
        false
    }

    /// Whether this source only serves the scope that registered it; child
    /// scopes will not consult it.
    fn is_per_scope(&self) -> bool {
        false
    }
}

/// A scope's view of the registrations visible to it.
///
/// Children created without extra registrations share their parent's registry
/// by reference. A child created with a `configure` closure gets an overlay
/// registry whose parent pointer surfaces the most-nested ancestor registry
/// that actually has local components; deeper ancestors are reached
/// transitively through it. Ancestor sources are consulted through that chain
/// rather than copied down, so an adapter source is never visited twice for
/// one lookup.
pub struct ComponentRegistry {
    local: HashMap<Service, Vec<Arc<Registration>>>,
    decorators: HashMap<Service, Vec<Arc<Registration>>>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    source_cache: RwLock<HashMap<Service, Vec<Arc<Registration>>>>,
    parent: Option<Arc<ComponentRegistry>>,
    properties: HashMap<String, AnyArc>,
    isolated: bool,
}

impl ComponentRegistry {
    pub(crate) fn new_root(
        local: HashMap<Service, Vec<Arc<Registration>>>,
        decorators: HashMap<Service, Vec<Arc<Registration>>>,
        sources: Vec<Arc<dyn RegistrationSource>>,
        properties: HashMap<String, AnyArc>,
    ) -> Self {
        Self {
            local,
            decorators,
            sources,
            source_cache: RwLock::new(HashMap::new()),
            parent: None,
            properties,
            isolated: false,
        }
    }

    pub(crate) fn new_child(
        parent: &Arc<ComponentRegistry>,
        local: HashMap<Service, Vec<Arc<Registration>>>,
        decorators: HashMap<Service, Vec<Arc<Registration>>>,
        own_sources: Vec<Arc<dyn RegistrationSource>>,
        properties: HashMap<String, AnyArc>,
        isolated: bool,
    ) -> Self {
        let mut effective = parent.clone();
        while !effective.has_local_components() {
            match &effective.parent {
                Some(grandparent) => effective = grandparent.clone(),
                None => break,
            }
        }
        // Non-isolated children reach ancestor sources through the parent
        // chain; isolated children keep per-scope copies of the adapter
        // sources alone.
        let mut sources: Vec<_> = if isolated {
            parent
                .sources
                .iter()
                .filter(|source| {
                    !source.is_per_scope() && source.is_adapter_for_individual_components()
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        sources.extend(own_sources);
        Self {
            local,
            decorators,
            sources,
            source_cache: RwLock::new(HashMap::new()),
            parent: Some(effective),
            properties,
            isolated,
        }
    }

    /// Whether this registry carries local registrations of its own.
    pub fn has_local_components(&self) -> bool {
        !self.local.is_empty() || !self.decorators.is_empty() || !self.sources.is_empty()
    }

    /// The registration a plain resolve of `service` uses: the most recent
    /// local one, else the sources' preferred one, else the parent chain's.
    pub fn default_registration_for(&self, service: &Service) -> Option<Arc<Registration>> {
        self.lookup(service, true, false)
    }

    fn lookup(
        &self,
        service: &Service,
        allow_sources: bool,
        from_child: bool,
    ) -> Option<Arc<Registration>> {
        if let Some(registrations) = self.local.get(service) {
            if let Some(registration) = registrations.last() {
                return Some(registration.clone());
            }
        }
        if allow_sources && !self.sources.is_empty() {
            if let Some(registration) = self.query_sources(service, from_child) {
                return Some(registration);
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.lookup(service, allow_sources && !self.isolated, true))
    }

    fn query_sources(&self, service: &Service, from_child: bool) -> Option<Arc<Registration>> {
        if from_child && self.sources.iter().any(|s| s.is_per_scope()) {
            // Per-scope sources serve only their own scope; child lookups
            // bypass the cache so the filtered view is never recorded.
            let accessor = RegistrationAccessor { registry: self };
            let mut produced = Vec::new();
            for source in self.sources.iter().filter(|s| !s.is_per_scope()) {
                produced.extend(source.registrations_for(service, &accessor));
            }
            return produced.last().cloned();
        }
        let cached = self.source_cache.read().get(service).cloned();
        let produced = match cached {
            Some(registrations) => registrations,
            None => {
                let accessor = RegistrationAccessor { registry: self };
                let mut produced = Vec::new();
                for source in &self.sources {
                    produced.extend(source.registrations_for(service, &accessor));
                }
                self.source_cache
                    .write()
                    .insert(service.clone(), produced.clone());
                produced
            }
        };
        produced.last().cloned()
    }

    /// Whether any visible registration provides `service`.
    pub fn is_registered(&self, service: &Service) -> bool {
        self.default_registration_for(service).is_some()
    }

    /// Decorators applicable to `service`, in registration order from the
    /// root registry down to this one.
    pub fn decorators_for(&self, service: &Service) -> Vec<Arc<Registration>> {
        let mut chain = match &self.parent {
            Some(parent) => parent.decorators_for(service),
            None => Vec::new(),
        };
        if let Some(local) = self.decorators.get(service) {
            chain.extend(local.iter().cloned());
        }
        chain
    }

    /// Looks up a property, falling back through the parent chain; child
    /// additions override parent values.
    pub fn property(&self, key: &str) -> Option<AnyArc> {
        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.property(key))
    }

    /// The registration sources owned by this registry view.
    pub fn sources(&self) -> &[Arc<dyn RegistrationSource>] {
        &self.sources
    }
}
