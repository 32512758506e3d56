use motorwatch_core::{Actor, EndpointId};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{PermsError, PermsResult};
use crate::guard::{Admission, Endpoint, Guard};
use crate::registry::Registry;
use crate::types::Call;

// ---------------------------------------------------------------------------
// View -- class-style endpoint group routed by HTTP method
// ---------------------------------------------------------------------------

/// A group of method handlers behind one identity. Calls enter through
/// `dispatch`, which routes on the context's HTTP method. Handlers receive
/// the call bound to the view, so the context sits at position 1.
pub struct View<U, R, E> {
    id: EndpointId,
    methods: BTreeMap<String, Endpoint<U, R, E>>,
    dispatch_guards: Vec<Guard<U, R>>,
}

impl<U, R, E> fmt::Debug for View<U, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("dispatch_guards", &self.dispatch_guards)
            .finish()
    }
}

impl<U, R, E> View<U, R, E> {
    pub fn new(id: impl Into<EndpointId>) -> Self {
        Self {
            id: id.into(),
            methods: BTreeMap::new(),
            dispatch_guards: Vec::new(),
        }
    }

    /// Add a handler for `name` (`get`, `post`, ...). The endpoint takes the
    /// view-qualified identity `View.name`.
    pub fn method(mut self, name: &str, endpoint: Endpoint<U, R, E>) -> Self {
        let name = name.to_ascii_lowercase();
        let endpoint = endpoint.with_id(self.id.member(&name));
        self.methods.insert(name, endpoint);
        self
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn handler(&self, method: &str) -> Option<&Endpoint<U, R, E>> {
        self.methods.get(&method.to_ascii_lowercase())
    }

    /// The handler for a lowercased method name. HEAD is served by the GET
    /// handler unless the view defines its own.
    fn route(&self, method: &str) -> Option<&Endpoint<U, R, E>> {
        self.methods
            .get(method)
            .or_else(|| (method == "head").then(|| self.methods.get("get")).flatten())
    }

    pub(crate) fn guard_dispatch(&mut self, guard: Guard<U, R>) {
        self.dispatch_guards.push(guard);
    }
}

impl<U, R, E> View<U, R, E>
where
    U: Actor + 'static,
    R: 'static,
    E: From<PermsError>,
{
    /// Route the call to the handler for its HTTP method. Dispatch guards
    /// run first, so every method is covered whether or not it exists.
    pub fn dispatch(&self, call: &Call<U>) -> Result<R, E> {
        let bound = call.bound(self.id.clone());
        let method = bound
            .locate_context(|_| true)
            .map(|(_, ctx)| ctx.method().to_ascii_lowercase())
            .ok_or_else(|| {
                PermsError::GuardContext(format!("{} was dispatched without a context", self.id))
            })?;
        let endpoint = self.route(&method);
        let params = endpoint.map(Endpoint::params).unwrap_or(&[]);

        for guard in &self.dispatch_guards {
            if let Admission::Respond(response) = guard.admit(&bound, params)? {
                return Ok(response);
            }
        }

        let endpoint = endpoint.ok_or_else(|| PermsError::UnknownMethod {
            endpoint: self.id.to_string(),
            method: method.to_ascii_uppercase(),
        })?;
        endpoint.call(&bound)
    }
}

/// Explicit replacement for declaring `{method: policy}` on the view type:
/// wraps each named method in the guard for its policy.
pub fn wire_permissions<U, R, E>(
    registry: &Registry<U, R>,
    mut view: View<U, R, E>,
    wiring: &[(&str, &str)],
) -> PermsResult<View<U, R, E>>
where
    U: Actor + 'static,
    R: 'static,
    E: From<PermsError> + 'static,
{
    for (method, policy) in wiring {
        let guard = registry.require(policy)?;
        let name = method.to_ascii_lowercase();
        let endpoint = view.methods.remove(&name).ok_or_else(|| {
            PermsError::Configuration(format!("{} has no method '{}'", view.id, name))
        })?;
        let endpoint = guard.wrap_endpoint(endpoint)?;
        debug!(view = %view.id, method = %name, policy = %policy, "wired permission");
        view.methods.insert(name, endpoint);
    }
    Ok(view)
}
