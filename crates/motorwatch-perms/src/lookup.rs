use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{PermsError, PermsResult};
use crate::types::{SubjectRef, SubjectType};

/// Resolves a subject instance from a lookup criterion (`field = key`).
///
/// Supplied by the data-access layer. Implementations signal a missing
/// instance with `PermsError::SubjectNotFound`; the guard propagates it
/// unchanged.
pub trait SubjectLookup: Send + Sync {
    fn lookup(&self, subject_type: &SubjectType, field: &str, key: &Value)
        -> PermsResult<SubjectRef>;
}

/// Canonical string form of a lookup key, so `7` and `"7"` address the
/// same record (path segments arrive as strings).
pub fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn not_found(subject_type: &SubjectType, field: &str, key: &Value) -> PermsError {
    PermsError::SubjectNotFound {
        subject_type: subject_type.name().to_string(),
        field: field.to_string(),
        key: key_string(key),
    }
}

/// Lookup used when none is configured: every subject is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl SubjectLookup for NoLookup {
    fn lookup(
        &self,
        subject_type: &SubjectType,
        field: &str,
        key: &Value,
    ) -> PermsResult<SubjectRef> {
        Err(not_found(subject_type, field, key))
    }
}

type LookupKey = (TypeId, String, String);

/// In-memory lookup keyed by (type, field, key), for tests and fixtures.
#[derive(Default)]
pub struct InMemoryLookup {
    records: RwLock<HashMap<LookupKey, SubjectRef>>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(
        &self,
        field: &str,
        key: impl Into<Value>,
        subject: T,
    ) -> PermsResult<()> {
        let key = (TypeId::of::<T>(), field.to_string(), key_string(&key.into()));
        self.records
            .write()
            .map_err(|_| PermsError::Internal("lookup lock poisoned".to_string()))?
            .insert(key, Arc::new(subject));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubjectLookup for InMemoryLookup {
    fn lookup(
        &self,
        subject_type: &SubjectType,
        field: &str,
        key: &Value,
    ) -> PermsResult<SubjectRef> {
        let records = self
            .records
            .read()
            .map_err(|_| PermsError::Internal("lookup lock poisoned".to_string()))?;
        records
            .get(&(subject_type.type_id(), field.to_string(), key_string(key)))
            .cloned()
            .ok_or_else(|| not_found(subject_type, field, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Record {
        owner_id: u64,
    }

    #[test]
    fn test_key_string_normalises_numbers_and_strings() {
        assert_eq!(key_string(&Value::from(7)), "7");
        assert_eq!(key_string(&Value::from("7")), "7");
        assert_eq!(key_string(&Value::Bool(true)), "true");
    }

    #[test]
    fn test_in_memory_lookup_roundtrip() {
        let lookup = InMemoryLookup::new();
        lookup.insert("pk", 7, Record { owner_id: 42 }).unwrap();
        assert_eq!(lookup.len(), 1);

        let ty = SubjectType::of::<Record>();
        let found = lookup.lookup(&ty, "pk", &Value::from("7")).unwrap();
        assert_eq!(found.downcast_ref::<Record>().unwrap().owner_id, 42);
    }

    #[test]
    fn test_in_memory_lookup_distinguishes_field_and_type() {
        let lookup = InMemoryLookup::new();
        lookup.insert("pk", 7, Record { owner_id: 42 }).unwrap();

        let ty = SubjectType::of::<Record>();
        let err = lookup.lookup(&ty, "alt_id", &Value::from(7)).unwrap_err();
        assert!(matches!(err, PermsError::SubjectNotFound { .. }));

        let other = SubjectType::of::<String>();
        assert!(lookup.lookup(&other, "pk", &Value::from(7)).is_err());
    }

    #[test]
    fn test_no_lookup_always_not_found() {
        let ty = SubjectType::of::<Record>();
        let err = NoLookup.lookup(&ty, "pk", &Value::from(1)).unwrap_err();
        assert_eq!(err.to_string(), "Record with pk=1 not found");
    }
}
