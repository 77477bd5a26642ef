//! Lifecycle event payloads.
//!
//! Events are plain callback lists owned by their publisher ([`LifetimeScope`],
//! [`ResolveOperation`](crate::ResolveOperation), or a request context);
//! handlers run synchronously in subscription order. There is no global
//! subscription registry.

use std::sync::Arc;

use crate::decoration::DecoratorContext;
use crate::error::DiError;
use crate::operation::ResolveOperation;
use crate::registration::AnyArc;
use crate::scope::LifetimeScope;
use crate::service::Service;

/// Raised by a scope just after a child scope has been created.
pub struct ChildScopeBeginningEvent<'a> {
    /// The newly created child.
    pub child: &'a Arc<LifetimeScope>,
}

/// Raised by a scope when its disposal begins, before the disposer drains.
pub struct ScopeEndingEvent<'a> {
    /// The scope being disposed.
    pub scope: &'a LifetimeScope,
}

/// Raised by an operation exactly once, when it ends.
pub struct OperationEndingEvent<'a> {
    /// The failure that ended the operation, if any.
    pub error: Option<&'a DiError>,
}

/// Raised for each successful request context after the operation's outermost
/// request has returned.
pub struct RequestCompletingEvent<'a> {
    /// The service the completed request asked for.
    pub service: &'a Service,
    /// The instance the request produced.
    pub instance: &'a AnyArc,
    /// The decorator chain applied to the instance, when decorators ran.
    pub decorators: Option<&'a DecoratorContext>,
}

pub(crate) type ChildBeginningHandler =
    Arc<dyn for<'a> Fn(&ChildScopeBeginningEvent<'a>) + Send + Sync>;
pub(crate) type ScopeEndingHandler = Arc<dyn for<'a> Fn(&ScopeEndingEvent<'a>) + Send + Sync>;
pub(crate) type OperationBeginningHandler = Arc<dyn Fn(&ResolveOperation) + Send + Sync>;
pub(crate) type OperationEndingHandler = Arc<dyn for<'a> Fn(&OperationEndingEvent<'a>)>;
pub(crate) type CompletingHandler = Box<dyn for<'a> FnOnce(&RequestCompletingEvent<'a>)>;
