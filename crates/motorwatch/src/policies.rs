//! Policies protecting the HTTP surface, and the guarded endpoints built
//! from them at start-up.

use motorwatch_core::MotorId;
use motorwatch_perms::{
    lookup, wire_permissions, Arg, Call, Endpoint, Guard, GuardTarget, LoginRedirect,
    PermsError, PermsResult, Policy, Predicate, Registry, RegistrySettings, SubjectLookup,
    SubjectRef, SubjectType, View,
};
use motorwatch_telemetry::{MotorReading, ReadingStore};
use serde_json::{json, Value};
use std::any::TypeId;
use std::sync::Arc;

use crate::actor::{User, CAP_INGEST, CAP_VIEW_READINGS};
use crate::error::RootError;

pub const CAN_VIEW_READINGS: &str = "can_view_readings";
pub const CAN_VIEW_READING: &str = "can_view_reading";
pub const CAN_INGEST: &str = "can_ingest";

/// How many readings the listing shows.
pub const LATEST_READINGS: usize = 6;

/// Fixed coordinates of the monitored site.
pub const SITE_LAT: f64 = 12.940538;
pub const SITE_LON: f64 = 77.566287;

/// What a guarded endpoint produces; rendered by the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Value),
    Text(String),
    Redirect(String),
}

impl LoginRedirect for Reply {
    fn login_redirect(location: &str) -> Self {
        Reply::Redirect(location.to_string())
    }
}

pub type AppRegistry = Registry<User, Reply>;
pub type AppEndpoint = Endpoint<User, Reply, RootError>;

// ---------------------------------------------------------------------------
// Subject lookup backed by the reading store
// ---------------------------------------------------------------------------

/// Resolves `MotorReading` subjects by primary key.
pub struct ReadingLookup {
    store: Arc<ReadingStore>,
}

impl ReadingLookup {
    pub fn new(store: Arc<ReadingStore>) -> Self {
        Self { store }
    }
}

impl SubjectLookup for ReadingLookup {
    fn lookup(
        &self,
        subject_type: &SubjectType,
        field: &str,
        key: &Value,
    ) -> PermsResult<SubjectRef> {
        if subject_type.type_id() != TypeId::of::<MotorReading>() || field != "pk" {
            return Err(lookup::not_found(subject_type, field, key));
        }
        let id: i64 = lookup::key_string(key)
            .parse()
            .map_err(|_| lookup::not_found(subject_type, field, key))?;
        match self.store.get(id) {
            Ok(Some(reading)) => Ok(Arc::new(reading)),
            Ok(None) => Err(lookup::not_found(subject_type, field, key)),
            Err(e) => Err(PermsError::Internal(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Register every policy the HTTP surface requires.
pub fn build_registry(
    settings: RegistrySettings,
    store: Arc<ReadingStore>,
) -> PermsResult<AppRegistry> {
    let mut registry =
        Registry::new(settings).with_lookup(Arc::new(ReadingLookup::new(store)));

    registry.register(Policy::new(
        CAN_VIEW_READINGS,
        Predicate::actor(|u: &User| u.can(CAP_VIEW_READINGS)),
    ))?;

    registry.register(
        Policy::new(
            CAN_VIEW_READING,
            Predicate::subject(|u: &User, r: &MotorReading| {
                u.can(CAP_VIEW_READINGS) && u.sees_motor(r.motor_id.as_str())
            }),
        )
        .subject::<MotorReading>(),
    )?;

    // Operators run ingestion by hand; staff always may.
    registry.register(
        Policy::new(CAN_INGEST, Predicate::actor(|u: &User| u.can(CAP_INGEST))).allow_staff(true),
    )?;

    Ok(registry)
}

// ---------------------------------------------------------------------------
// Guarded endpoints
// ---------------------------------------------------------------------------

/// The synchronous endpoints, already wrapped in their guards, plus the
/// guard for the async ingestion handler.
pub struct Endpoints {
    pub readings: AppEndpoint,
    pub location: AppEndpoint,
    pub reading: View<User, Reply, RootError>,
    pub ingest: Guard<User, Reply>,
}

impl Endpoints {
    /// Install the guards. Fails if a policy is missing from `registry`.
    pub fn install(
        registry: &AppRegistry,
        store: Arc<ReadingStore>,
        motor_id: MotorId,
    ) -> PermsResult<Self> {
        let readings: AppEndpoint = {
            let store = Arc::clone(&store);
            Endpoint::new("readings.list", move |_: &Call<User>| {
                let readings = store.latest(LATEST_READINGS)?;
                Ok(Reply::Json(json!({ "readings": readings })))
            })
        };
        let readings = registry.require(CAN_VIEW_READINGS)?.wrap_endpoint(readings)?;

        let location: AppEndpoint = Endpoint::new("location", move |_: &Call<User>| {
            Ok(Reply::Json(json!({
                "motor_id": motor_id.as_str(),
                "lat": SITE_LAT,
                "lon": SITE_LON,
            })))
        });
        let location = registry
            .require(CAN_VIEW_READINGS)?
            .wrap(GuardTarget::Function(location))?
            .into_endpoint()
            .ok_or_else(|| PermsError::Internal("location guard lost its endpoint".into()))?;

        let detail: AppEndpoint = Endpoint::new("get", move |call: &Call<User>| {
            let id = reading_id(call)?;
            let reading = store
                .get(id)?
                .ok_or(motorwatch_telemetry::TelemetryError::NotFound(id))?;
            Ok(Reply::Json(json!({ "reading": reading })))
        })
        .with_params(["pk"]);
        let reading = wire_permissions(
            registry,
            View::new("ReadingView").method("get", detail),
            &[("get", CAN_VIEW_READING)],
        )?;

        Ok(Self {
            readings,
            location,
            reading,
            ingest: registry.require(CAN_INGEST)?,
        })
    }
}

/// Reading id from a bound call `(view, context, pk)`.
fn reading_id(call: &Call<User>) -> Result<i64, RootError> {
    let raw = call
        .args
        .iter()
        .find_map(Arg::as_value)
        .ok_or_else(|| RootError::BadRequest("missing reading id".into()))?;
    lookup::key_string(raw)
        .parse()
        .map_err(|_| RootError::BadRequest(format!("invalid reading id: {}", raw)))
}
