//! Error types for the dependency injection container.

use std::fmt;

/// Dependency resolution errors.
///
/// Every operational failure in arbor-di funnels through this enum: resolution
/// failures, lifetime-policy misses, cycle detection, disposal misuse. Errors
/// raised inside a resolve pipeline propagate unchanged to the caller of
/// [`LifetimeScope::resolve`](crate::LifetimeScope::resolve).
///
/// # Examples
///
/// ```rust
/// use arbor_di::{ContainerBuilder, DiError};
///
/// let container = ContainerBuilder::new().build();
/// match container.resolve::<String>() {
///     Err(DiError::NotRegistered(name)) => {
///         assert_eq!(name, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// No registration provides the requested service
    NotRegistered(&'static str),
    /// Type downcast failed
    TypeMismatch(&'static str),
    /// Circular dependency detected within the current request segment (includes path)
    CircularDependency(Vec<&'static str>),
    /// A matching-scope lifetime found no tagged ancestor
    MatchingScopeNotFound {
        /// Tags the policy walked the ancestry for, in declaration order.
        searched: Vec<&'static str>,
    },
    /// A required request's pipeline returned without producing an instance
    PipelineCompletedWithNoInstance(&'static str),
    /// A shared component's activator resolved the component itself during construction
    SelfConstructingDependency(&'static str),
    /// The resolve operation has already ended
    OperationDisposed,
    /// The lifetime scope (or one of its ancestors) has been disposed
    ScopeDisposed,
    /// A non-anonymous tag is already present on an ancestor scope
    DuplicateScopeTag(&'static str),
    /// Synchronous disposal encountered an async-only release hook
    RequiresAsyncDisposal,
    /// A component activator failed
    ActivatorFailure {
        /// The implementing component the activator belongs to.
        component: &'static str,
        /// The activator's own failure description.
        message: String,
    },
}

impl DiError {
    /// Shorthand for activator failures raised from factory closures.
    pub fn activation(component: &'static str, message: impl Into<String>) -> Self {
        DiError::ActivatorFailure {
            component,
            message: message.into(),
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotRegistered(name) => write!(f, "service not registered: {}", name),
            DiError::TypeMismatch(name) => write!(f, "type mismatch for: {}", name),
            DiError::CircularDependency(path) => {
                write!(f, "circular dependency: {}", path.join(" -> "))
            }
            DiError::MatchingScopeNotFound { searched } => write!(
                f,
                "no lifetime scope with a tag matching any of [{}] is visible from the resolving scope",
                searched.join(", ")
            ),
            DiError::PipelineCompletedWithNoInstance(name) => write!(
                f,
                "resolve pipeline completed without producing an instance for {}",
                name
            ),
            DiError::SelfConstructingDependency(name) => write!(
                f,
                "component {} resolved itself while its shared instance was being constructed",
                name
            ),
            DiError::OperationDisposed => write!(f, "resolve operation has already ended"),
            DiError::ScopeDisposed => write!(f, "lifetime scope has been disposed"),
            DiError::DuplicateScopeTag(tag) => write!(
                f,
                "a lifetime scope tagged {:?} is already present in the ancestry",
                tag
            ),
            DiError::RequiresAsyncDisposal => {
                write!(f, "scope owns async disposables; use dispose_async")
            }
            DiError::ActivatorFailure { component, message } => {
                write!(f, "activator for {} failed: {}", component, message)
            }
        }
    }
}

impl std::error::Error for DiError {}

/// Result type for DI operations.
///
/// A convenience alias for `Result<T, DiError>` used throughout arbor-di.
pub type DiResult<T> = Result<T, DiError>;
