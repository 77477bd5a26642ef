//! Service identity types for the dependency injection container.

use std::any::TypeId;

/// Identifies what a resolve request asks for.
///
/// A service names the thing a registration provides: a concrete type, a trait
/// object, or either of those qualified by a string key. Services are cheap to
/// clone, equatable, hashable, and carry a human-readable description for
/// error messages.
///
/// # Examples
///
/// ```rust
/// use arbor_di::Service;
///
/// let by_type = Service::of::<u32>();
/// let by_key = Service::keyed::<u32>("port");
/// assert_ne!(by_type, by_key);
/// assert_eq!(by_type.display_name(), "u32");
/// assert_eq!(by_key.service_key(), Some("port"));
/// ```
#[derive(Debug, Clone)]
pub enum Service {
    /// Concrete type, identified by `TypeId` with the type name kept for diagnostics
    Type(TypeId, &'static str),
    /// Concrete type qualified by a string key
    KeyedType(TypeId, &'static str, &'static str),
    /// Trait object, identified by the trait's type name
    Trait(&'static str),
    /// Trait object qualified by a string key
    KeyedTrait(&'static str, &'static str),
}

impl Service {
    /// Service identity for a concrete type.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Service::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Service identity for a concrete type under a string key.
    #[inline]
    pub fn keyed<T: 'static>(key: &'static str) -> Self {
        Service::KeyedType(TypeId::of::<T>(), std::any::type_name::<T>(), key)
    }

    /// Service identity for a trait object.
    #[inline]
    pub fn of_trait<T: ?Sized + 'static>() -> Self {
        Service::Trait(std::any::type_name::<T>())
    }

    /// Service identity for a trait object under a string key.
    #[inline]
    pub fn keyed_trait<T: ?Sized + 'static>(key: &'static str) -> Self {
        Service::KeyedTrait(std::any::type_name::<T>(), key)
    }

    /// The type or trait name, for diagnostics and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::Type(_, name) => name,
            Service::KeyedType(_, name, _) => name,
            Service::Trait(name) => name,
            Service::KeyedTrait(name, _) => name,
        }
    }

    /// The string key for keyed services, `None` otherwise.
    pub fn service_key(&self) -> Option<&'static str> {
        match self {
            Service::Type(_, _) | Service::Trait(_) => None,
            Service::KeyedType(_, _, key) => Some(key),
            Service::KeyedTrait(_, key) => Some(key),
        }
    }
}

// TypeId-only comparison on the hot path; the name string is diagnostics-only.
impl PartialEq for Service {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Service::Type(a, _), Service::Type(b, _)) => a == b,
            (Service::KeyedType(a, _, ka), Service::KeyedType(b, _, kb)) => a == b && ka == kb,
            (Service::Trait(a), Service::Trait(b)) => a == b,
            (Service::KeyedTrait(a, ka), Service::KeyedTrait(b, kb)) => a == b && ka == kb,
            _ => false,
        }
    }
}

impl Eq for Service {}

impl std::hash::Hash for Service {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Service::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Service::KeyedType(id, _, key) => {
                1u8.hash(state);
                id.hash(state);
                key.hash(state);
            }
            Service::Trait(name) => {
                2u8.hash(state);
                name.hash(state);
            }
            Service::KeyedTrait(name, key) => {
                3u8.hash(state);
                name.hash(state);
                key.hash(state);
            }
        }
    }
}
