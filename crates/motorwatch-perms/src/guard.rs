use motorwatch_core::{Actor, EndpointId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::{evaluate, SubjectSource};
use crate::error::{PermsError, PermsResult};
use crate::lookup::SubjectLookup;
use crate::registry::PolicyEntry;
use crate::types::{Arg, Call, RequestContext, SubjectType, CONTEXT_SCAN_DEPTH};
use crate::view::View;

/// Lookup field used for subjects when the guard is not told otherwise.
pub const DEFAULT_SUBJECT_FIELD: &str = "pk";

pub type EndpointFn<U, R, E> = dyn Fn(&Call<U>) -> Result<R, E> + Send + Sync;

// ---------------------------------------------------------------------------
// Endpoint -- a named callable taking one `Call`
// ---------------------------------------------------------------------------

/// A request handler plus the names of its positional parameters after the
/// context, in order. The names let predicates pick extras by name.
pub struct Endpoint<U, R, E> {
    id: EndpointId,
    params: Vec<String>,
    handler: Arc<EndpointFn<U, R, E>>,
}

impl<U, R, E> Clone for Endpoint<U, R, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            params: self.params.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<U, R, E> fmt::Debug for Endpoint<U, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<U, R, E> Endpoint<U, R, E> {
    pub fn new<F>(id: impl Into<EndpointId>, handler: F) -> Self
    where
        F: Fn(&Call<U>) -> Result<R, E> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            params: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_id(mut self, id: EndpointId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn call(&self, call: &Call<U>) -> Result<R, E> {
        (self.handler)(call)
    }
}

/// What a guard can be applied to.
pub enum GuardTarget<U, R, E> {
    Function(Endpoint<U, R, E>),
    /// Class-style endpoint: protected as a whole through its dispatch.
    View(View<U, R, E>),
    /// A named value with nothing to call, such as a constant mounted on a
    /// route table. Guarding one is a configuration error.
    Fixed(EndpointId),
}

impl<U, R, E> GuardTarget<U, R, E> {
    pub fn id(&self) -> &EndpointId {
        match self {
            GuardTarget::Function(endpoint) => endpoint.id(),
            GuardTarget::View(view) => view.id(),
            GuardTarget::Fixed(id) => id,
        }
    }

    pub fn into_endpoint(self) -> Option<Endpoint<U, R, E>> {
        match self {
            GuardTarget::Function(endpoint) => Some(endpoint),
            _ => None,
        }
    }

    pub fn into_view(self) -> Option<View<U, R, E>> {
        match self {
            GuardTarget::View(view) => Some(view),
            _ => None,
        }
    }
}

/// Outcome of the pre-call half of a guard.
#[derive(Debug)]
pub enum Admission<R> {
    /// Call the endpoint with the original arguments.
    Proceed,
    /// Return this response instead; the endpoint is not called.
    Respond(R),
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Guard factory bound to one registered policy. Obtained from
/// `Registry::require`; reusable across any number of endpoints.
pub struct Guard<U, R> {
    entry: Arc<PolicyEntry<U, R>>,
    lookup: Arc<dyn SubjectLookup>,
    field: String,
    subject_arg: Option<String>,
}

impl<U, R> Clone for Guard<U, R> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            lookup: Arc::clone(&self.lookup),
            field: self.field.clone(),
            subject_arg: self.subject_arg.clone(),
        }
    }
}

impl<U, R> fmt::Debug for Guard<U, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("policy", &self.entry.name())
            .field("field", &self.field)
            .field("subject_arg", &self.subject_arg)
            .finish()
    }
}

impl<U, R> Guard<U, R> {
    pub(crate) fn new(entry: Arc<PolicyEntry<U, R>>, lookup: Arc<dyn SubjectLookup>) -> Self {
        Self {
            entry,
            lookup,
            field: DEFAULT_SUBJECT_FIELD.to_string(),
            subject_arg: None,
        }
    }

    /// Field the subject lookup matches the key against, `pk` by default.
    /// Also the keyword argument consulted when no positional key is given.
    pub fn by_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Take the subject key from the named endpoint parameter instead of
    /// guessing from argument positions.
    pub fn subject_from(mut self, param: impl Into<String>) -> Self {
        self.subject_arg = Some(param.into());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn policy(&self) -> &Arc<PolicyEntry<U, R>> {
        &self.entry
    }

    /// Subject key for this call: the explicitly mapped parameter when one
    /// was declared, else the first positional argument after the context,
    /// else the keyword argument named after the lookup field.
    fn subject_key(&self, call: &Call<U>, position: usize, params: &[String]) -> PermsResult<Value> {
        if let Some(name) = &self.subject_arg {
            return call
                .named_values(position, params)
                .remove(name)
                .ok_or_else(|| {
                    PermsError::GuardContext(format!(
                        "{} expects the subject key in argument '{}'",
                        self.entry.name(),
                        name
                    ))
                });
        }
        call.args
            .get(position + 1)
            .and_then(Arg::as_value)
            .or_else(|| call.kwargs.get(&self.field).and_then(Arg::as_value))
            .cloned()
            .ok_or_else(|| {
                PermsError::GuardContext(format!(
                    "{} needs a subject key, positional or '{}'",
                    self.entry.name(),
                    self.field
                ))
            })
    }
}

impl<U, R> Guard<U, R>
where
    U: Actor + 'static,
    R: 'static,
{
    /// Apply the guard. Functions come back wrapped; views come back as the
    /// same view with their dispatch protected.
    pub fn wrap<E>(&self, target: GuardTarget<U, R, E>) -> PermsResult<GuardTarget<U, R, E>>
    where
        E: From<PermsError> + 'static,
    {
        match target {
            GuardTarget::Function(endpoint) => Ok(GuardTarget::Function(self.wrap_endpoint(endpoint)?)),
            GuardTarget::View(mut view) => {
                self.entry.record_endpoint(view.id().clone())?;
                self.entry.record_endpoint(view.id().member("dispatch"))?;
                view.guard_dispatch(self.clone());
                debug!(policy = %self.entry.name(), view = %view.id(), "guarded view dispatch");
                Ok(GuardTarget::View(view))
            }
            GuardTarget::Fixed(id) => Err(PermsError::InvalidGuardTarget(id.to_string())),
        }
    }

    /// Wrap one endpoint; the result keeps its id and parameter names.
    pub fn wrap_endpoint<E>(&self, endpoint: Endpoint<U, R, E>) -> PermsResult<Endpoint<U, R, E>>
    where
        E: From<PermsError> + 'static,
    {
        self.entry.record_endpoint(endpoint.id.clone())?;
        debug!(policy = %self.entry.name(), endpoint = %endpoint.id, "guarded endpoint");

        let guard = self.clone();
        let inner = Arc::clone(&endpoint.handler);
        let params = endpoint.params.clone();
        Ok(Endpoint {
            id: endpoint.id,
            params: endpoint.params,
            handler: Arc::new(move |call: &Call<U>| match guard.admit(call, &params)? {
                Admission::Proceed => inner(call),
                Admission::Respond(response) => Ok(response),
            }),
        })
    }

    /// The decision half of a guarded call: locate the context, route
    /// anonymous actors, resolve the subject and evaluate. `params` names
    /// the endpoint's positional parameters after the context.
    pub fn admit(&self, call: &Call<U>, params: &[String]) -> PermsResult<Admission<R>> {
        let (position, context) = call
            .locate_context(|t| self.entry.accepts_context(t))
            .ok_or_else(|| {
                PermsError::GuardContext(format!(
                    "{} expects a context of type {:?} within the first {} arguments",
                    self.entry.name(),
                    self.entry.context_types(),
                    CONTEXT_SCAN_DEPTH
                ))
            })?;
        let context: &dyn RequestContext<U> = &**context;
        let actor = context.actor();
        let anonymous = actor.map_or(true, |a| a.is_anonymous());

        if anonymous && !self.entry.allow_anonymous() {
            debug!(policy = %self.entry.name(), path = %context.path(), "anonymous request routed to login");
            return Ok(Admission::Respond(self.entry.unauthenticated(context)));
        }

        let subject = if self.entry.subject_type().is_some() {
            SubjectSource::Resolve(Box::new(move |ty: &SubjectType| {
                let key = self.subject_key(call, position, params)?;
                self.lookup.lookup(ty, &self.field, &key)
            }))
        } else {
            SubjectSource::Absent
        };
        let available = call.named_values(position, params);
        let decision = evaluate(&self.entry, actor, subject, &available, Some(context))?;

        if decision.is_allowed() {
            return Ok(Admission::Proceed);
        }
        if anonymous {
            return Ok(Admission::Respond(self.entry.unauthenticated(context)));
        }
        warn!(
            policy = %self.entry.name(),
            path = %context.path(),
            decision = %decision,
            "permission denied"
        );
        Err(PermsError::PermissionDenied {
            policy: self.entry.name().to_string(),
        })
    }
}
