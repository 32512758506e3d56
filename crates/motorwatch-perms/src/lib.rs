//! Motorwatch Permissions
//!
//! Declarative, name-based authorization for request handlers. Policies are
//! registered once at start-up under a unique name and then required by
//! endpoints; each guarded call is decided as Actor + optional Subject +
//! Policy = Allow or Deny.
//!
//! Key features:
//! - Registry-wide defaults (staff/superuser bypass, anonymous access,
//!   login redirect, recognised context types), overridable per policy
//! - Staff/superuser bypass short-circuits before the predicate or any
//!   subject lookup runs
//! - Anonymous actors are routed to an unauthenticated handler, never to
//!   the endpoint; authenticated denials surface as a typed error carrying
//!   the policy name
//! - Class-style views are protected as one unit through their dispatch
//!   routine, or per method through explicit wiring
//! - Every policy doubles as a boolean template filter

pub mod engine;
pub mod error;
pub mod filters;
pub mod guard;
pub mod lookup;
pub mod registry;
pub mod types;
pub mod view;

pub use engine::{evaluate, evaluate_direct, SubjectSource};
pub use error::{PermsError, PermsErrorKind, PermsResult};
pub use filters::TemplateFilters;
pub use guard::{Admission, Endpoint, Guard, GuardTarget};
pub use lookup::{InMemoryLookup, NoLookup, SubjectLookup};
pub use registry::{Policy, PolicyCheck, PolicyEntry, Registry};
pub use types::{
    AllowReason, Arg, Call, ContextRef, Decision, DenyReason, EvaluationContext, LoginRedirect,
    Predicate, RegistrySettings, RequestContext, SubjectRef, SubjectType,
    UnauthenticatedHandler, HTTP_CONTEXT, RESERVED_POLICY_NAME,
};
pub use view::{wire_permissions, View};

pub use motorwatch_core::{Actor, EndpointId};
