use motorwatch_core::{Actor, EndpointId};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::engine::evaluate_direct;
use crate::error::{PermsError, PermsResult};
use crate::filters::TemplateFilters;
use crate::guard::Guard;
use crate::lookup::{NoLookup, SubjectLookup};
use crate::types::{
    login_location, LoginRedirect, Predicate, RegistrySettings, RequestContext, SubjectRef,
    SubjectType, UnauthenticatedHandler, RESERVED_POLICY_NAME,
};

// ---------------------------------------------------------------------------
// Policy -- registration request
// ---------------------------------------------------------------------------

/// A policy as declared by the caller. Unset flags fall back to the
/// registry-level defaults when registered.
pub struct Policy<U, R> {
    name: String,
    predicate: Predicate<U>,
    subject_type: Option<SubjectType>,
    allow_staff: Option<bool>,
    allow_superuser: Option<bool>,
    allow_anonymous: Option<bool>,
    unauthenticated_handler: Option<UnauthenticatedHandler<U, R>>,
    context_types: Option<BTreeSet<String>>,
    replace: bool,
}

impl<U, R> Policy<U, R> {
    pub fn new(name: impl Into<String>, predicate: Predicate<U>) -> Self {
        Self {
            name: name.into(),
            predicate,
            subject_type: None,
            allow_staff: None,
            allow_superuser: None,
            allow_anonymous: None,
            unauthenticated_handler: None,
            context_types: None,
            replace: false,
        }
    }

    /// Declare the subject type the predicate operates on. Guards resolve an
    /// instance of it before evaluation.
    pub fn subject<T: Any>(mut self) -> Self {
        self.subject_type = Some(SubjectType::of::<T>());
        self
    }

    pub fn allow_staff(mut self, allow: bool) -> Self {
        self.allow_staff = Some(allow);
        self
    }

    pub fn allow_superuser(mut self, allow: bool) -> Self {
        self.allow_superuser = Some(allow);
        self
    }

    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = Some(allow);
        self
    }

    pub fn unauthenticated_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&dyn RequestContext<U>) -> R + Send + Sync + 'static,
    {
        self.unauthenticated_handler = Some(Arc::new(handler));
        self
    }

    /// Extra context types this policy recognises on top of the registry's.
    pub fn context_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Supersede an existing policy of the same name instead of failing.
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// PolicyEntry -- a registered policy with defaults filled in
// ---------------------------------------------------------------------------

/// One named authorization rule as stored in a `Registry`.
pub struct PolicyEntry<U, R> {
    name: String,
    predicate: Predicate<U>,
    subject_type: Option<SubjectType>,
    allow_staff: bool,
    allow_superuser: bool,
    allow_anonymous: bool,
    unauthenticated_handler: UnauthenticatedHandler<U, R>,
    context_types: BTreeSet<String>,
    protected: RwLock<BTreeSet<EndpointId>>,
}

impl<U, R> PolicyEntry<U, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predicate(&self) -> &Predicate<U> {
        &self.predicate
    }

    pub fn subject_type(&self) -> Option<&SubjectType> {
        self.subject_type.as_ref()
    }

    pub fn allow_staff(&self) -> bool {
        self.allow_staff
    }

    pub fn allow_superuser(&self) -> bool {
        self.allow_superuser
    }

    pub fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    pub fn context_types(&self) -> &BTreeSet<String> {
        &self.context_types
    }

    /// Whether a context of type `context_type` carries the actor for this
    /// policy.
    pub fn accepts_context(&self, context_type: &str) -> bool {
        self.context_types.contains(context_type)
    }

    /// Run the unauthenticated handler for `context`.
    pub fn unauthenticated(&self, context: &dyn RequestContext<U>) -> R {
        (self.unauthenticated_handler)(context)
    }

    pub fn protects(&self, endpoint: &EndpointId) -> bool {
        self.protected
            .read()
            .map(|set| set.contains(endpoint))
            .unwrap_or(false)
    }

    /// Snapshot of the endpoints currently guarded by this policy.
    pub fn protected_endpoints(&self) -> Vec<EndpointId> {
        self.protected
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn record_endpoint(&self, endpoint: EndpointId) -> PermsResult<()> {
        self.protected
            .write()
            .map_err(|_| PermsError::Internal("protected endpoint set poisoned".to_string()))?
            .insert(endpoint);
        Ok(())
    }
}

impl<U, R> fmt::Debug for PolicyEntry<U, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEntry")
            .field("name", &self.name)
            .field("subject_type", &self.subject_type)
            .field("allow_staff", &self.allow_staff)
            .field("allow_superuser", &self.allow_superuser)
            .field("allow_anonymous", &self.allow_anonymous)
            .field("context_types", &self.context_types)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PolicyCheck -- direct decision outside any endpoint
// ---------------------------------------------------------------------------

/// Bound decision callable for one policy, usable wherever there is no
/// endpoint call to scan (templates, background jobs, other policies).
pub struct PolicyCheck<U, R> {
    entry: Arc<PolicyEntry<U, R>>,
}

impl<U, R> Clone for PolicyCheck<U, R> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<U: Actor, R> PolicyCheck<U, R> {
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// Decide for a policy without a subject.
    pub fn allows(&self, actor: Option<&U>) -> bool {
        evaluate_direct(&self.entry, actor, None).is_allowed()
    }

    /// Decide against an explicit subject instance.
    pub fn allows_on(&self, actor: Option<&U>, subject: &SubjectRef) -> bool {
        evaluate_direct(&self.entry, actor, Some(subject)).is_allowed()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mapping from policy name to entry plus the registry-wide defaults.
///
/// Built once at start-up and handed to whoever installs guards. Entries are
/// never removed; `replace` swaps the stored entry but guards already
/// installed keep the entry they were built from.
pub struct Registry<U, R> {
    settings: RegistrySettings,
    unauthenticated_handler: UnauthenticatedHandler<U, R>,
    lookup: Arc<dyn SubjectLookup>,
    entries: BTreeMap<String, Arc<PolicyEntry<U, R>>>,
}

impl<U, R> Registry<U, R>
where
    U: 'static,
    R: LoginRedirect + 'static,
{
    /// A registry whose default unauthenticated handler redirects to
    /// `settings.login_url` with the request path as `next`.
    pub fn new(settings: RegistrySettings) -> Self {
        let login_url = settings.login_url.clone();
        Self::with_handler(settings, move |ctx: &dyn RequestContext<U>| {
            R::login_redirect(&login_location(&login_url, ctx.path()))
        })
    }
}

impl<U, R> Registry<U, R> {
    pub fn with_handler<F>(settings: RegistrySettings, handler: F) -> Self
    where
        F: Fn(&dyn RequestContext<U>) -> R + Send + Sync + 'static,
    {
        Self {
            settings,
            unauthenticated_handler: Arc::new(handler),
            lookup: Arc::new(NoLookup),
            entries: BTreeMap::new(),
        }
    }

    /// Set the collaborator used to resolve subjects for typed policies.
    pub fn with_lookup(mut self, lookup: Arc<dyn SubjectLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn lookup(&self) -> &Arc<dyn SubjectLookup> {
        &self.lookup
    }

    /// Store a policy, filling unset flags from the registry defaults.
    pub fn register(&mut self, policy: Policy<U, R>) -> PermsResult<Arc<PolicyEntry<U, R>>> {
        if policy.name.is_empty() {
            return Err(PermsError::Configuration(
                "policy name must not be empty".to_string(),
            ));
        }
        if policy.name == RESERVED_POLICY_NAME {
            return Err(PermsError::Configuration(format!(
                "\"{}\" is reserved and cannot name a policy",
                RESERVED_POLICY_NAME
            )));
        }
        if self.entries.contains_key(&policy.name) && !policy.replace {
            return Err(PermsError::DuplicatePolicy(policy.name));
        }
        policy
            .predicate
            .validate_params()
            .map_err(|e| PermsError::Configuration(format!("{}: {}", policy.name, e)))?;

        let mut context_types = self.settings.effective_context_types();
        if let Some(extra) = policy.context_types {
            context_types.extend(extra);
        }

        let entry = Arc::new(PolicyEntry {
            name: policy.name.clone(),
            predicate: policy.predicate,
            subject_type: policy.subject_type,
            allow_staff: policy.allow_staff.unwrap_or(self.settings.allow_staff),
            allow_superuser: policy.allow_superuser.unwrap_or(self.settings.allow_superuser),
            allow_anonymous: policy.allow_anonymous.unwrap_or(self.settings.allow_anonymous),
            unauthenticated_handler: policy
                .unauthenticated_handler
                .unwrap_or_else(|| Arc::clone(&self.unauthenticated_handler)),
            context_types,
            protected: RwLock::new(BTreeSet::new()),
        });

        debug!(
            policy = %entry.name,
            subject = ?entry.subject_type.map(|t| t.name()),
            replace = policy.replace,
            "registered permission"
        );
        self.entries.insert(policy.name, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn entry(&self, name: &str) -> PermsResult<&Arc<PolicyEntry<U, R>>> {
        self.entries
            .get(name)
            .ok_or_else(|| PermsError::NoSuchPolicy(name.to_string()))
    }

    /// A guard factory bound to the named policy.
    pub fn require(&self, name: &str) -> PermsResult<Guard<U, R>> {
        let entry = self.entry(name)?;
        Ok(Guard::new(Arc::clone(entry), Arc::clone(&self.lookup)))
    }

    /// The named entry, but only if `endpoint` is currently guarded by it.
    pub fn entry_for_endpoint(
        &self,
        endpoint: &EndpointId,
        name: &str,
    ) -> PermsResult<Option<&Arc<PolicyEntry<U, R>>>> {
        let entry = self.entry(name)?;
        Ok(entry.protects(endpoint).then_some(entry))
    }

    /// Bound decision callable for direct use.
    pub fn check(&self, name: &str) -> PermsResult<PolicyCheck<U, R>> {
        Ok(PolicyCheck {
            entry: Arc::clone(self.entry(name)?),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registered policy as a boolean test for the presentation layer.
    pub fn filters(&self) -> TemplateFilters<'_, U, R>
    where
        U: Actor,
    {
        TemplateFilters::new(self)
    }
}
