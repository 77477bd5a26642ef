//! Component lifetime policies.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::scope::{LifetimeScope, ScopeTag};

/// Locates the scope that owns a component's shared instance.
///
/// Given the most nested scope visible to a resolve request, a lifetime policy
/// decides which ancestor (or the scope itself) holds the component's shared
/// instance and tracks its disposal.
///
/// # Policy behavior
///
/// - **CurrentScope**: the starting scope itself. Combined with shared
///   sharing this yields one instance per scope; without sharing it merely
///   anchors activation and disposal to the resolving scope.
/// - **RootScope**: the root of the scope tree. Combined with shared sharing
///   this is the classic application-wide singleton.
/// - **MatchingScope**: the nearest ancestor whose tag equals one of the
///   policy's tags; required requests fail with
///   [`DiError::MatchingScopeNotFound`] when no ancestor matches.
///
/// # Examples
///
/// ```rust
/// use arbor_di::ContainerBuilder;
///
/// struct UnitOfWork;
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register::<UnitOfWork, _>(|_| Ok(UnitOfWork))
///     .instance_per_matching_scope(["unit"]);
/// let container = builder.build();
///
/// let unit = container.root_scope().begin_lifetime_scope_tagged("unit").unwrap();
/// let inner = unit.begin_lifetime_scope().unwrap();
///
/// // Both resolves surface the instance owned by the "unit" scope.
/// let a = unit.resolve::<UnitOfWork>().unwrap();
/// let b = inner.resolve::<UnitOfWork>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentLifetime {
    /// The starting scope owns the instance
    CurrentScope,
    /// The root of the scope tree owns the instance
    RootScope,
    /// The nearest ancestor tagged with one of these tags owns the instance
    MatchingScope(Vec<&'static str>),
}

impl ComponentLifetime {
    /// Finds the owning scope starting from `most_nested`, failing when a
    /// matching-scope policy has no matching ancestor.
    pub fn find_scope(&self, most_nested: &Arc<LifetimeScope>) -> DiResult<Arc<LifetimeScope>> {
        match self {
            ComponentLifetime::CurrentScope => Ok(most_nested.clone()),
            ComponentLifetime::RootScope => Ok(most_nested.root()),
            ComponentLifetime::MatchingScope(tags) => {
                Self::walk_matching(most_nested, tags).ok_or_else(|| {
                    DiError::MatchingScopeNotFound {
                        searched: tags.clone(),
                    }
                })
            }
        }
    }

    /// As [`find_scope`](Self::find_scope), but absent instead of failing.
    /// Used for requests marked non-required.
    pub fn try_find_scope(&self, most_nested: &Arc<LifetimeScope>) -> Option<Arc<LifetimeScope>> {
        match self {
            ComponentLifetime::CurrentScope => Some(most_nested.clone()),
            ComponentLifetime::RootScope => Some(most_nested.root()),
            ComponentLifetime::MatchingScope(tags) => Self::walk_matching(most_nested, tags),
        }
    }

    fn walk_matching(
        most_nested: &Arc<LifetimeScope>,
        tags: &[&'static str],
    ) -> Option<Arc<LifetimeScope>> {
        let mut current = Some(most_nested.clone());
        while let Some(scope) = current {
            if let ScopeTag::Labeled(label) = *scope.tag() {
                if tags.contains(&label) {
                    return Some(scope);
                }
            }
            current = scope.parent().cloned();
        }
        None
    }
}
