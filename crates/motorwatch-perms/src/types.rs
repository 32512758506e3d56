use motorwatch_core::EndpointId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Context type of the hosting framework's own HTTP request. Always
/// recognised, whatever the configuration says.
pub const HTTP_CONTEXT: &str = "http";

/// Name of the registration operation itself; never a valid policy name.
pub const RESERVED_POLICY_NAME: &str = "register";

/// Names a predicate may not claim as extra parameters; they are already
/// provided positionally through `EvaluationContext`.
pub const RESERVED_PARAM_NAMES: [&str; 3] = ["actor", "subject", "context"];

/// How many leading positional arguments are scanned for the request
/// context: `(context, ...)` or `(receiver, context, ...)`.
pub const CONTEXT_SCAN_DEPTH: usize = 2;

// ---------------------------------------------------------------------------
// RequestContext -- what the hosting framework hands every endpoint
// ---------------------------------------------------------------------------

/// A per-request context object from which the acting principal is reachable.
pub trait RequestContext<U>: Send + Sync {
    /// Type name matched against the registry's recognised context types.
    fn context_type(&self) -> &str;

    /// The acting principal, if the framework resolved one.
    fn actor(&self) -> Option<&U>;

    /// HTTP method, used by class-style views to route `dispatch`.
    fn method(&self) -> &str;

    /// Request path, used to build the `next` parameter of login redirects.
    fn path(&self) -> &str;
}

pub type ContextRef<U> = Arc<dyn RequestContext<U>>;

// ---------------------------------------------------------------------------
// Call -- the arguments of one endpoint invocation
// ---------------------------------------------------------------------------

/// One argument of an endpoint invocation.
pub enum Arg<U> {
    /// The view instance a bound method was invoked on.
    Receiver(EndpointId),
    Context(ContextRef<U>),
    Value(Value),
}

impl<U> Clone for Arg<U> {
    fn clone(&self) -> Self {
        match self {
            Arg::Receiver(id) => Arg::Receiver(id.clone()),
            Arg::Context(ctx) => Arg::Context(Arc::clone(ctx)),
            Arg::Value(v) => Arg::Value(v.clone()),
        }
    }
}

impl<U> fmt::Debug for Arg<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Receiver(id) => write!(f, "Receiver({})", id),
            Arg::Context(ctx) => write!(f, "Context({})", ctx.context_type()),
            Arg::Value(v) => write!(f, "Value({})", v),
        }
    }
}

impl<U> Arg<U> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Positional and keyword arguments of a single endpoint invocation.
pub struct Call<U> {
    pub args: Vec<Arg<U>>,
    pub kwargs: BTreeMap<String, Arg<U>>,
}

impl<U> Clone for Call<U> {
    fn clone(&self) -> Self {
        Self {
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
        }
    }
}

impl<U> fmt::Debug for Call<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

impl<U> Default for Call<U> {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }
}

impl<U> Call<U> {
    /// A plain function call `(context)`.
    pub fn new(context: ContextRef<U>) -> Self {
        Self {
            args: vec![Arg::Context(context)],
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), Arg::Value(value.into()));
        self
    }

    /// The same call as a bound method invocation `(receiver, ...)`.
    pub fn bound(&self, receiver: EndpointId) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(Arg::Receiver(receiver));
        args.extend(self.args.iter().cloned());
        Self {
            args,
            kwargs: self.kwargs.clone(),
        }
    }

    /// Find the request context among the leading positional arguments.
    /// Returns its position and the context itself.
    pub fn locate_context(
        &self,
        accepts: impl Fn(&str) -> bool,
    ) -> Option<(usize, &ContextRef<U>)> {
        self.args
            .iter()
            .take(CONTEXT_SCAN_DEPTH)
            .enumerate()
            .find_map(|(i, arg)| match arg {
                Arg::Context(ctx) if accepts(ctx.context_type()) => Some((i, ctx)),
                _ => None,
            })
    }

    /// Named view of the call: keyword arguments plus the positional
    /// arguments after position `after`, paired with `params` in order.
    pub fn named_values(&self, after: usize, params: &[String]) -> BTreeMap<String, Value> {
        let mut named: BTreeMap<String, Value> = self
            .kwargs
            .iter()
            .filter_map(|(k, a)| a.as_value().map(|v| (k.clone(), v.clone())))
            .collect();
        for (name, arg) in params.iter().zip(self.args.iter().skip(after + 1)) {
            if let Some(v) = arg.as_value() {
                named.insert(name.clone(), v.clone());
            }
        }
        named
    }
}

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// A resolved domain object a policy is evaluated against.
pub type SubjectRef = Arc<dyn Any + Send + Sync>;

/// Type descriptor declared by policies that operate on a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectType {
    name: &'static str,
    type_id: TypeId,
}

impl SubjectType {
    pub fn of<T: Any>() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self {
            name,
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Whether `subject` is an instance of this type.
    pub fn matches(&self, subject: &SubjectRef) -> bool {
        let inner: &(dyn Any + Send + Sync) = &**subject;
        inner.type_id() == self.type_id
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// EvaluationContext -- the uniform predicate input
// ---------------------------------------------------------------------------

/// Everything a predicate may look at: the actor, the subject (when the
/// policy declares one), the named extras it declared at registration, and
/// the request context when evaluated behind a guard.
pub struct EvaluationContext<'a, U> {
    actor: &'a U,
    subject: Option<&'a SubjectRef>,
    extras: &'a BTreeMap<String, Value>,
    context: Option<&'a dyn RequestContext<U>>,
}

impl<'a, U> EvaluationContext<'a, U> {
    pub fn new(
        actor: &'a U,
        subject: Option<&'a SubjectRef>,
        extras: &'a BTreeMap<String, Value>,
        context: Option<&'a dyn RequestContext<U>>,
    ) -> Self {
        Self {
            actor,
            subject,
            extras,
            context,
        }
    }

    pub fn actor(&self) -> &'a U {
        self.actor
    }

    pub fn has_subject(&self) -> bool {
        self.subject.is_some()
    }

    /// The subject downcast to `T`; `None` when absent or of another type.
    pub fn subject<T: Any>(&self) -> Option<&'a T> {
        self.subject.and_then(|s| (**s).downcast_ref::<T>())
    }

    /// A declared extra parameter, when the call supplied it. Predicates
    /// fall back to their own default otherwise.
    pub fn extra(&self, name: &str) -> Option<&'a Value> {
        self.extras.get(name)
    }

    pub fn context(&self) -> Option<&'a dyn RequestContext<U>> {
        self.context
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

pub type PredicateFn<U> = dyn Fn(&EvaluationContext<'_, U>) -> bool + Send + Sync;

/// A boolean rule over an `EvaluationContext`, plus the names of the extra
/// call arguments it wants to see.
pub struct Predicate<U> {
    func: Arc<PredicateFn<U>>,
    params: Vec<String>,
}

impl<U> Clone for Predicate<U> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            params: self.params.clone(),
        }
    }
}

impl<U> fmt::Debug for Predicate<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<U: 'static> Predicate<U> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&EvaluationContext<'_, U>) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            params: Vec::new(),
        }
    }

    /// A predicate over the actor alone.
    pub fn actor<F>(func: F) -> Self
    where
        F: Fn(&U) -> bool + Send + Sync + 'static,
    {
        Self::new(move |ctx| func(ctx.actor()))
    }

    /// A predicate over the actor and a subject of type `T`. Denies when the
    /// subject is missing or of another type.
    pub fn subject<T, F>(func: F) -> Self
    where
        T: Any,
        F: Fn(&U, &T) -> bool + Send + Sync + 'static,
    {
        Self::new(move |ctx| match ctx.subject::<T>() {
            Some(subject) => func(ctx.actor(), subject),
            None => false,
        })
    }

    /// Declare the extra call arguments this predicate reads.
    pub fn with_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }
}

impl<U> Predicate<U> {
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn test(&self, ctx: &EvaluationContext<'_, U>) -> bool {
        (self.func)(ctx)
    }

    /// Check the declared parameter names: non-empty, unique, not reserved.
    pub fn validate_params(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for name in &self.params {
            if name.is_empty() {
                return Err("predicate parameter names must not be empty".to_string());
            }
            if RESERVED_PARAM_NAMES.contains(&name.as_str()) {
                return Err(format!("predicate parameter name '{}' is reserved", name));
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("predicate parameter '{}' declared twice", name));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    StaffBypass,
    SuperuserBypass,
    Predicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoActor,
    Anonymous,
    Predicate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow(AllowReason::StaffBypass) => write!(f, "ALLOW: staff bypass"),
            Decision::Allow(AllowReason::SuperuserBypass) => write!(f, "ALLOW: superuser bypass"),
            Decision::Allow(AllowReason::Predicate) => write!(f, "ALLOW: predicate"),
            Decision::Deny(DenyReason::NoActor) => write!(f, "DENY: no actor"),
            Decision::Deny(DenyReason::Anonymous) => write!(f, "DENY: anonymous"),
            Decision::Deny(DenyReason::Predicate) => write!(f, "DENY: predicate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry-wide settings and the unauthenticated path
// ---------------------------------------------------------------------------

/// Registry-level defaults, used wherever a policy does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Staff actors pass every policy without the predicate running.
    #[serde(default)]
    pub allow_staff: bool,

    /// Superusers pass every policy without the predicate running.
    #[serde(default)]
    pub allow_superuser: bool,

    /// Let anonymous actors reach the predicate instead of being sent to
    /// the unauthenticated handler straight away.
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Target of the default unauthenticated handler.
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Context types recognised as carrying the actor.
    #[serde(default = "default_context_types")]
    pub context_types: BTreeSet<String>,
}

fn default_login_url() -> String {
    "/login/".to_string()
}

fn default_context_types() -> BTreeSet<String> {
    BTreeSet::from([HTTP_CONTEXT.to_string()])
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            allow_staff: false,
            allow_superuser: false,
            allow_anonymous: false,
            login_url: default_login_url(),
            context_types: default_context_types(),
        }
    }
}

impl RegistrySettings {
    /// The configured context types with the framework's own always added.
    pub fn effective_context_types(&self) -> BTreeSet<String> {
        let mut types = self.context_types.clone();
        types.insert(HTTP_CONTEXT.to_string());
        types
    }
}

/// Invoked with the request context when an anonymous actor is turned away.
pub type UnauthenticatedHandler<U, R> = Arc<dyn Fn(&dyn RequestContext<U>) -> R + Send + Sync>;

/// Responses that can express "go log in first".
pub trait LoginRedirect {
    fn login_redirect(location: &str) -> Self;
}

/// `login_url?next=<path>`, with `next` form-encoded.
pub fn login_location(login_url: &str, next: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    let sep = if login_url.contains('?') { '&' } else { '?' };
    format!("{}{}next={}", login_url, sep, encoded)
}
