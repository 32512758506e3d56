use motorwatch_core::Actor;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{PermsError, PermsResult};
use crate::registry::PolicyEntry;
use crate::types::{
    AllowReason, Decision, DenyReason, EvaluationContext, RequestContext, SubjectRef, SubjectType,
};

/// Where the subject comes from, if the policy needs one.
pub enum SubjectSource<'a> {
    /// No subject available.
    Absent,
    /// Passed explicitly by the caller (direct checks, template filters).
    Given(SubjectRef),
    /// Resolved on demand. Only invoked when the policy declares a subject
    /// type and no bypass applied.
    Resolve(Box<dyn FnOnce(&SubjectType) -> PermsResult<SubjectRef> + 'a>),
}

impl<'a> SubjectSource<'a> {
    fn resolve(self, subject_type: Option<&SubjectType>) -> PermsResult<Option<SubjectRef>> {
        match (self, subject_type) {
            (SubjectSource::Absent, _) => Ok(None),
            (SubjectSource::Given(subject), _) => Ok(Some(subject)),
            (SubjectSource::Resolve(resolver), Some(ty)) => {
                let subject = resolver(ty)?;
                if !ty.matches(&subject) {
                    return Err(PermsError::Internal(format!(
                        "subject lookup returned an instance that is not a {}",
                        ty
                    )));
                }
                Ok(Some(subject))
            }
            (SubjectSource::Resolve(_), None) => Ok(None),
        }
    }
}

/// Outcome of the short-circuit rules that run before any predicate.
enum Gate<'u, U> {
    Decided(Decision),
    Predicate(&'u U),
}

/// Steps 1-4: no actor, anonymous, staff bypass, superuser bypass.
fn gate<'u, U: Actor, R>(entry: &PolicyEntry<U, R>, actor: Option<&'u U>) -> Gate<'u, U> {
    let actor = match actor {
        Some(actor) => actor,
        None => return Gate::Decided(Decision::Deny(DenyReason::NoActor)),
    };
    if actor.is_anonymous() && !entry.allow_anonymous() {
        return Gate::Decided(Decision::Deny(DenyReason::Anonymous));
    }
    if entry.allow_staff() && actor.is_staff() {
        return Gate::Decided(Decision::Allow(AllowReason::StaffBypass));
    }
    if entry.allow_superuser() && actor.is_superuser() {
        return Gate::Decided(Decision::Allow(AllowReason::SuperuserBypass));
    }
    Gate::Predicate(actor)
}

/// Keep only the call arguments the predicate declared, by name.
fn select_extras(params: &[String], available: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    params
        .iter()
        .filter_map(|name| available.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

fn run_predicate<U, R>(
    entry: &PolicyEntry<U, R>,
    actor: &U,
    subject: Option<&SubjectRef>,
    available: &BTreeMap<String, Value>,
    context: Option<&dyn RequestContext<U>>,
) -> Decision {
    let extras = select_extras(entry.predicate().params(), available);
    let ctx = EvaluationContext::new(actor, subject, &extras, context);
    if entry.predicate().test(&ctx) {
        Decision::Allow(AllowReason::Predicate)
    } else {
        Decision::Deny(DenyReason::Predicate)
    }
}

/// Decide whether `actor` satisfies `entry`.
///
/// Rules, first match wins:
/// 1. no actor → deny
/// 2. anonymous actor on a policy that disallows anonymous → deny
/// 3. staff bypass (predicate never invoked)
/// 4. superuser bypass (predicate never invoked)
/// 5. resolve the subject if the policy declares a type, then the predicate
///    decides
///
/// `available` holds the named call arguments; the predicate sees only the
/// ones it declared. Evaluation mutates nothing, so identical inputs always
/// give identical decisions.
pub fn evaluate<U: Actor, R>(
    entry: &PolicyEntry<U, R>,
    actor: Option<&U>,
    subject: SubjectSource<'_>,
    available: &BTreeMap<String, Value>,
    context: Option<&dyn RequestContext<U>>,
) -> PermsResult<Decision> {
    let decision = match gate(entry, actor) {
        Gate::Decided(decision) => decision,
        Gate::Predicate(actor) => {
            let subject = subject.resolve(entry.subject_type())?;
            run_predicate(entry, actor, subject.as_ref(), available, context)
        }
    };
    debug!(policy = %entry.name(), decision = %decision, "permission evaluated");
    Ok(decision)
}

/// Direct-call decision: the same rules with the subject supplied by the
/// caller, outside any endpoint context.
pub fn evaluate_direct<U: Actor, R>(
    entry: &PolicyEntry<U, R>,
    actor: Option<&U>,
    subject: Option<&SubjectRef>,
) -> Decision {
    match gate(entry, actor) {
        Gate::Decided(decision) => decision,
        Gate::Predicate(actor) => run_predicate(entry, actor, subject, &BTreeMap::new(), None),
    }
}
