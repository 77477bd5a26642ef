//! Per-scope shared-instance store.

use std::collections::HashMap;

use parking_lot::{ReentrantMutex, RwLock};

use crate::error::{DiError, DiResult};
use crate::registration::{AnyArc, RegistrationId};

/// Concurrency-safe singleton cache owned by a lifetime scope.
///
/// Instances are keyed by `(RegistrationId, optional qualifier)`. Reads go
/// through an `RwLock` read guard and never wait on creation; creation is
/// double-checked under a reentrant mutex so that an activator resolving
/// *other* shared components of the same scope on the same thread proceeds,
/// while an activator that comes back around to its own key is caught as
/// [`DiError::SelfConstructingDependency`] at insertion time.
///
/// At most one live instance exists per key for the lifetime of the scope:
/// under contention exactly one creator wins and later callers observe the
/// winner.
pub struct SharedInstanceStore {
    by_id: RwLock<HashMap<RegistrationId, AnyArc>>,
    by_qualified: RwLock<HashMap<(RegistrationId, usize), AnyArc>>,
    creation: ReentrantMutex<()>,
}

impl SharedInstanceStore {
    pub(crate) fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_qualified: RwLock::new(HashMap::new()),
            creation: ReentrantMutex::new(()),
        }
    }

    /// Looks up an unqualified shared instance.
    pub fn try_get(&self, id: RegistrationId) -> Option<AnyArc> {
        self.by_id.read().get(&id).cloned()
    }

    /// Looks up a shared instance; an absent qualifier delegates to the
    /// single-key variant.
    pub fn try_get_qualified(&self, id: RegistrationId, qualifier: Option<usize>) -> Option<AnyArc> {
        match qualifier {
            None => self.try_get(id),
            Some(q) => self.by_qualified.read().get(&(id, q)).cloned(),
        }
    }

    /// Returns the cached instance for the key, or runs `creator` to produce
    /// one, with the double-checked discipline described on the type.
    ///
    /// A creator yielding `Ok(None)` records nothing and propagates the
    /// absence to the caller.
    pub fn get_or_create(
        &self,
        id: RegistrationId,
        qualifier: Option<usize>,
        component: &'static str,
        creator: impl FnOnce() -> DiResult<Option<AnyArc>>,
    ) -> DiResult<Option<AnyArc>> {
        if let Some(existing) = self.try_get_qualified(id, qualifier) {
            return Ok(Some(existing));
        }
        let _creating = self.creation.lock();
        if let Some(existing) = self.try_get_qualified(id, qualifier) {
            return Ok(Some(existing));
        }
        let Some(instance) = creator()? else {
            return Ok(None);
        };
        match qualifier {
            None => {
                let mut map = self.by_id.write();
                if map.contains_key(&id) {
                    return Err(DiError::SelfConstructingDependency(component));
                }
                map.insert(id, instance.clone());
            }
            Some(q) => {
                let mut map = self.by_qualified.write();
                if map.contains_key(&(id, q)) {
                    return Err(DiError::SelfConstructingDependency(component));
                }
                map.insert((id, q), instance.clone());
            }
        }
        Ok(Some(instance))
    }

    /// Inserts a qualified instance unless one is already present, returning
    /// the canonical value either way.
    pub fn get_or_insert_qualified(
        &self,
        id: RegistrationId,
        qualifier: usize,
        instance: AnyArc,
    ) -> AnyArc {
        self.by_qualified
            .write()
            .entry((id, qualifier))
            .or_insert(instance)
            .clone()
    }

    /// Number of cached instances across both key spaces.
    pub fn shared_count(&self) -> usize {
        self.by_id.read().len() + self.by_qualified.read().len()
    }

    pub(crate) fn clear(&self) {
        self.by_id.write().clear();
        self.by_qualified.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id() -> RegistrationId {
        RegistrationId::next()
    }

    #[test]
    fn get_or_create_caches_first_instance() {
        let store = SharedInstanceStore::new();
        let key = id();
        let first = store
            .get_or_create(key, None, "test", || Ok(Some(Arc::new(7usize) as AnyArc)))
            .unwrap()
            .unwrap();
        let second = store
            .get_or_create(key, None, "test", || panic!("creator must not rerun"))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.shared_count(), 1);
    }

    #[test]
    fn creator_yielding_none_records_nothing() {
        let store = SharedInstanceStore::new();
        let key = id();
        let missing = store.get_or_create(key, None, "test", || Ok(None)).unwrap();
        assert!(missing.is_none());
        assert_eq!(store.shared_count(), 0);
        assert!(store.try_get(key).is_none());
    }

    #[test]
    fn recursive_same_key_creation_is_self_constructing() {
        let store = SharedInstanceStore::new();
        let key = id();
        let result = store.get_or_create(key, None, "outer", || {
            // The same thread re-enters the store for the same key, as a
            // factory re-entering the container would.
            let inner = store
                .get_or_create(key, None, "inner", || Ok(Some(Arc::new(1usize) as AnyArc)))
                .unwrap();
            assert!(inner.is_some());
            Ok(Some(Arc::new(2usize) as AnyArc))
        });
        assert!(matches!(result, Err(DiError::SelfConstructingDependency(_))));
    }

    #[test]
    fn qualified_and_unqualified_keys_are_distinct() {
        let store = SharedInstanceStore::new();
        let key = id();
        store
            .get_or_create(key, None, "test", || Ok(Some(Arc::new(1usize) as AnyArc)))
            .unwrap();
        store
            .get_or_create(key, Some(1), "test", || Ok(Some(Arc::new(2usize) as AnyArc)))
            .unwrap();
        let plain = store.try_get(key).unwrap().downcast::<usize>().unwrap();
        let qualified = store
            .try_get_qualified(key, Some(1))
            .unwrap()
            .downcast::<usize>()
            .unwrap();
        assert_eq!(*plain, 1);
        assert_eq!(*qualified, 2);
    }
}
