//! Ordered disposal of scope-owned instances.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DiError, DiResult};

/// Future type for asynchronous release hooks.
pub(crate) type BoxFutureUnit = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Trait for synchronous resource release.
///
/// Implement this for components that need structured teardown (flushing
/// caches, closing connections). Registrations marked
/// [`owned_by_lifetime_scope`](crate::RegistrationBuilder::owned_by_lifetime_scope)
/// are released automatically when their owning scope is disposed, in reverse
/// activation order.
///
/// # Examples
///
/// ```rust
/// use arbor_di::{ContainerBuilder, Dispose};
///
/// struct Cache;
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         // flush and close
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register::<Cache, _>(|_| Ok(Cache))
///     .instance_per_lifetime_scope()
///     .owned_by_lifetime_scope();
/// let container = builder.build();
/// let _ = container.resolve::<Cache>().unwrap();
/// container.dispose().unwrap(); // Cache::dispose runs here
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}

/// Trait for asynchronous resource release.
///
/// Async release hooks are awaited one at a time during
/// [`LifetimeScope::dispose_async`](crate::LifetimeScope::dispose_async);
/// synchronous [`dispose`](crate::LifetimeScope::dispose) refuses them with
/// [`DiError::RequiresAsyncDisposal`] rather than blocking on a runtime.
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self);
}

enum DisposeEntry {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce() -> BoxFutureUnit + Send>),
}

#[derive(Default)]
struct DisposerState {
    entries: Vec<DisposeEntry>,
    disposed: bool,
}

/// Ordered collection of release hooks owned by a lifetime scope.
///
/// Hooks run in reverse insertion order when the scope is disposed. After full
/// disposal, further additions fail with [`DiError::ScopeDisposed`].
pub struct Disposer {
    state: Mutex<DisposerState>,
}

impl Disposer {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DisposerState::default()),
        }
    }

    /// Registers an instance for synchronous release on scope disposal.
    pub fn register<T>(&self, instance: Arc<T>) -> DiResult<()>
    where
        T: ?Sized + Dispose,
    {
        self.push(DisposeEntry::Sync(Box::new(move || instance.dispose())))
    }

    /// Registers an instance for asynchronous release on scope disposal.
    pub fn register_async<T>(&self, instance: Arc<T>) -> DiResult<()>
    where
        T: ?Sized + AsyncDispose,
    {
        self.push(DisposeEntry::Async(Box::new(move || {
            let instance = instance.clone();
            Box::pin(async move { instance.dispose().await }) as BoxFutureUnit
        })))
    }

    /// Defers an arbitrary synchronous cleanup action to scope disposal.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) -> DiResult<()> {
        self.push(DisposeEntry::Sync(Box::new(f)))
    }

    /// Defers an arbitrary asynchronous cleanup action to scope disposal.
    pub fn defer_async<F, Fut>(&self, f: F) -> DiResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(DisposeEntry::Async(Box::new(move || Box::pin(f()))))
    }

    fn push(&self, entry: DisposeEntry) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(DiError::ScopeDisposed);
        }
        state.entries.push(entry);
        Ok(())
    }

    /// Releases every entry in reverse insertion order.
    ///
    /// Async entries cannot run on the synchronous path; the first one
    /// encountered surfaces as [`DiError::RequiresAsyncDisposal`] after the
    /// remaining synchronous entries have still been released.
    pub fn dispose(&self) -> DiResult<()> {
        let entries = self.take_entries();
        let mut first_error = None;
        for entry in entries.into_iter().rev() {
            match entry {
                DisposeEntry::Sync(release) => release(),
                DisposeEntry::Async(_) => {
                    first_error.get_or_insert(DiError::RequiresAsyncDisposal);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Releases every entry in reverse insertion order, awaiting each
    /// asynchronous hook.
    pub async fn dispose_async(&self) {
        let entries = self.take_entries();
        for entry in entries.into_iter().rev() {
            match entry {
                DisposeEntry::Sync(release) => release(),
                DisposeEntry::Async(release) => release().await,
            }
        }
    }

    fn take_entries(&self) -> Vec<DisposeEntry> {
        let mut state = self.state.lock();
        state.disposed = true;
        std::mem::take(&mut state.entries)
    }

    /// Whether disposal has already run.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub(crate) fn has_pending(&self) -> bool {
        let state = self.state.lock();
        !state.disposed && !state.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[test]
    fn releases_in_reverse_insertion_order() {
        let order = Arc::new(PlMutex::new(Vec::new()));
        let disposer = Disposer::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            disposer.defer(move || order.lock().push(name)).unwrap();
        }
        disposer.dispose().unwrap();
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn add_after_dispose_fails() {
        let disposer = Disposer::new();
        disposer.dispose().unwrap();
        assert!(matches!(
            disposer.defer(|| {}),
            Err(DiError::ScopeDisposed)
        ));
    }

    #[test]
    fn sync_dispose_refuses_async_entries_but_drains_sync_ones() {
        let order = Arc::new(PlMutex::new(Vec::new()));
        let disposer = Disposer::new();
        let probe = order.clone();
        disposer.defer(move || probe.lock().push("sync")).unwrap();
        disposer.defer_async(|| async {}).unwrap();
        assert!(matches!(
            disposer.dispose(),
            Err(DiError::RequiresAsyncDisposal)
        ));
        assert_eq!(*order.lock(), vec!["sync"]);
    }
}
