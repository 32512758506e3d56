// ---------------------------------------------------------------------------
// Actor -- the requesting principal
//
// Supplied by the hosting layer on every call. Only the anonymity flag is
// mandatory; staff/superuser default to false for principals that have no
// such notion.
// ---------------------------------------------------------------------------

pub trait Actor: Send + Sync {
    fn is_anonymous(&self) -> bool;

    fn is_staff(&self) -> bool {
        false
    }

    fn is_superuser(&self) -> bool {
        false
    }
}

impl<A: Actor + ?Sized> Actor for &A {
    fn is_anonymous(&self) -> bool {
        (**self).is_anonymous()
    }

    fn is_staff(&self) -> bool {
        (**self).is_staff()
    }

    fn is_superuser(&self) -> bool {
        (**self).is_superuser()
    }
}

impl<A: Actor + ?Sized> Actor for std::sync::Arc<A> {
    fn is_anonymous(&self) -> bool {
        (**self).is_anonymous()
    }

    fn is_staff(&self) -> bool {
        (**self).is_staff()
    }

    fn is_superuser(&self) -> bool {
        (**self).is_superuser()
    }
}
