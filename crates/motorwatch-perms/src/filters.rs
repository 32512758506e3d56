use motorwatch_core::Actor;

use crate::error::PermsResult;
use crate::registry::Registry;
use crate::types::SubjectRef;

/// Registered policies exposed as boolean tests for the presentation layer,
/// e.g. to decide whether to render an "edit" button. Same rules as a
/// guarded call, minus the argument scanning.
pub struct TemplateFilters<'a, U, R> {
    registry: &'a Registry<U, R>,
}

impl<'a, U: Actor, R> TemplateFilters<'a, U, R> {
    pub fn new(registry: &'a Registry<U, R>) -> Self {
        Self { registry }
    }

    /// One-argument form, for policies without a subject. A missing actor
    /// is simply false.
    pub fn apply(&self, name: &str, actor: Option<&U>) -> PermsResult<bool> {
        let check = self.registry.check(name)?;
        Ok(actor.is_some() && check.allows(actor))
    }

    /// Two-argument form, against a subject instance.
    pub fn apply_with(&self, name: &str, actor: Option<&U>, subject: &SubjectRef) -> PermsResult<bool> {
        let check = self.registry.check(name)?;
        Ok(actor.is_some() && check.allows_on(actor, subject))
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        self.registry.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PermsError;
    use crate::registry::Policy;
    use crate::types::{Predicate, RegistrySettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct User {
        id: u64,
    }

    impl Actor for User {
        fn is_anonymous(&self) -> bool {
            false
        }
    }

    struct Record {
        owner_id: u64,
    }

    #[test]
    fn test_filters_follow_policies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut reg: Registry<User, ()> = Registry::with_handler(RegistrySettings::default(), |_| ());
        reg.register(Policy::new(
            "is_admin",
            Predicate::actor(move |u: &User| {
                counter.fetch_add(1, Ordering::SeqCst);
                u.id == 1
            }),
        ))
        .unwrap();
        reg.register(
            Policy::new(
                "owns",
                Predicate::subject(|u: &User, r: &Record| u.id == r.owner_id),
            )
            .subject::<Record>(),
        )
        .unwrap();

        let filters = reg.filters();
        assert!(filters.apply("is_admin", Some(&User { id: 1 })).unwrap());
        assert!(!filters.apply("is_admin", Some(&User { id: 2 })).unwrap());
        assert!(!filters.apply("is_admin", None).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let record: SubjectRef = Arc::new(Record { owner_id: 5 });
        assert!(filters.apply_with("owns", Some(&User { id: 5 }), &record).unwrap());
        assert!(!filters.apply_with("owns", Some(&User { id: 6 }), &record).unwrap());

        let err = filters.apply("nope", None).unwrap_err();
        assert!(matches!(err, PermsError::NoSuchPolicy(_)));
        assert_eq!(filters.names().collect::<Vec<_>>(), vec!["is_admin", "owns"]);
    }
}
