//! # arbor-di
//!
//! Hierarchical lifetime-scope dependency injection for Rust, with a staged
//! middleware pipeline at the heart of every resolve.
//!
//! ## Features
//!
//! - **Lifetime-scope hierarchy**: a tree of scopes, each with its own
//!   registry view, shared-instance cache and disposer; parents visible to
//!   children, siblings isolated
//! - **Lifetime policies**: per-dependency, per-lifetime-scope, single
//!   instance, and matching-scope (tag-addressed) sharing
//! - **Resolve pipeline**: every request flows through phase-ordered
//!   middleware — scope selection, decoration, sharing, activation — and
//!   registrations can contribute their own stages
//! - **Exact cycle detection**: circular dependencies are reported with the
//!   full path; factory re-entry through a fresh request segment stays legal
//! - **Deterministic disposal**: scope-owned instances are released in
//!   reverse activation order, synchronously or asynchronously
//! - **Thread-safe**: `Arc`-based sharing; concurrent resolves from the same
//!   or different scopes
//!
//! ## Quick Start
//!
//! ```rust
//! use arbor_di::ContainerBuilder;
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register::<Database, _>(|_| {
//!         Ok(Database {
//!             connection_string: "postgres://localhost".to_string(),
//!         })
//!     })
//!     .single_instance();
//! builder.register::<UserService, _>(|ctx| {
//!     Ok(UserService {
//!         db: ctx.resolve::<Database>()?,
//!     })
//! });
//!
//! let container = builder.build();
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Lifetime scopes
//!
//! ```rust
//! use arbor_di::ContainerBuilder;
//! use std::sync::Arc;
//!
//! struct RequestId(u64);
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register::<RequestId, _>(|_| Ok(RequestId(7)))
//!     .instance_per_lifetime_scope();
//! let container = builder.build();
//!
//! let request = container.begin_lifetime_scope().unwrap();
//! let a = request.resolve::<RequestId>().unwrap();
//! let b = request.resolve::<RequestId>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b)); // same scope, same instance
//!
//! let other = container.begin_lifetime_scope().unwrap();
//! let c = other.resolve::<RequestId>().unwrap();
//! assert!(!Arc::ptr_eq(&a, &c)); // sibling scopes are isolated
//! ```
//!
//! ## Matching scopes
//!
//! Components can bind their shared instance to the nearest ancestor scope
//! carrying a tag, failing loudly when no such ancestor exists:
//!
//! ```rust
//! use arbor_di::{ContainerBuilder, DiError};
//!
//! struct UnitOfWork;
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register::<UnitOfWork, _>(|_| Ok(UnitOfWork))
//!     .instance_per_matching_scope(["unit"]);
//! let container = builder.build();
//!
//! let unit = container.begin_lifetime_scope_tagged("unit").unwrap();
//! assert!(unit.resolve::<UnitOfWork>().is_ok());
//!
//! let stray = container.begin_lifetime_scope().unwrap();
//! assert!(matches!(
//!     stray.resolve::<UnitOfWork>(),
//!     Err(DiError::MatchingScopeNotFound { .. })
//! ));
//! ```

pub mod builder;
pub mod context;
pub mod decoration;
pub mod diagnostics;
pub mod disposer;
pub mod error;
pub mod events;
pub mod lifetime;
pub mod operation;
pub mod parameter;
pub mod pipeline;
pub mod registration;
pub mod registry;
pub mod scope;
pub mod service;
pub mod store;

mod internal;

pub use builder::{Container, ContainerBuilder, RegistrationBuilder, TraitRegistrationBuilder};
pub use context::{ResolveRequest, ResolveRequestContext};
pub use decoration::DecoratorContext;
pub use diagnostics::{DiagnosticSink, LoggingDiagnosticSink};
pub use disposer::{AsyncDispose, Dispose, Disposer};
pub use error::{DiError, DiResult};
pub use events::{
    ChildScopeBeginningEvent, OperationEndingEvent, RequestCompletingEvent, ScopeEndingEvent,
};
pub use lifetime::ComponentLifetime;
pub use operation::{ResolveOperation, SegmentToken};
pub use parameter::Parameter;
pub use pipeline::{Next, PipelinePhase, ResolveMiddleware, ResolvePipeline};
pub use registration::{
    AnyArc, InstanceOwnership, InstanceSharing, Registration, RegistrationId,
};
pub use registry::{ComponentRegistry, RegistrationAccessor, RegistrationSource};
pub use scope::{LifetimeScope, ScopeTag, ROOT_TAG};
pub use service::Service;
pub use store::SharedInstanceStore;
