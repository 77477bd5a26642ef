//! Activation parameters.
//!
//! Parameters are tagged values supplied alongside a resolve request. The core
//! treats them as an opaque ordered sequence; activators alone interpret them,
//! matching by name or by type.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::registration::AnyArc;

/// A tagged value supplying a constructor input to an activator.
///
/// # Examples
///
/// ```rust
/// use arbor_di::{ContainerBuilder, Parameter};
///
/// struct Greeter {
///     name: String,
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register::<Greeter, _>(|ctx| {
///     let name = ctx
///         .parameter_named::<String>("name")
///         .map(|n| (*n).clone())
///         .unwrap_or_else(|| "world".to_string());
///     Ok(Greeter { name })
/// });
/// let container = builder.build();
///
/// let greeter = container
///     .root_scope()
///     .resolve_with_parameters::<Greeter>(vec![Parameter::named("name", "arbor".to_string())])
///     .unwrap();
/// assert_eq!(greeter.name, "arbor");
/// ```
#[derive(Clone)]
pub enum Parameter {
    /// Matched by parameter name
    Named(&'static str, AnyArc),
    /// Matched by value type
    Typed(TypeId, &'static str, AnyArc),
}

impl Parameter {
    /// A parameter matched by name.
    pub fn named<T: Send + Sync + 'static>(name: &'static str, value: T) -> Self {
        Parameter::Named(name, Arc::new(value))
    }

    /// A parameter matched by its value type.
    pub fn typed<T: Send + Sync + 'static>(value: T) -> Self {
        Parameter::Typed(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Arc::new(value),
        )
    }

    /// The value if this parameter is named `name` and holds a `T`.
    pub fn value_named<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        match self {
            Parameter::Named(n, value) if *n == name => value.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// The value if this parameter is typed as `T`.
    pub fn value_typed<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Parameter::Typed(id, _, value) if *id == TypeId::of::<T>() => {
                value.clone().downcast::<T>().ok()
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Named(name, _) => write!(f, "Parameter::Named({:?})", name),
            Parameter::Typed(_, type_name, _) => write!(f, "Parameter::Typed({})", type_name),
        }
    }
}
