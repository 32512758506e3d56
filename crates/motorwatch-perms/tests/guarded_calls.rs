//! Guarded-call scenarios: "Who gets through, and what happens to the rest?"
//!
//! The story follows one registry through start-up and a handful of requests:
//!
//! 1. Policies are registered; duplicates, reserved names and unknown names
//!    fail loudly at configuration time
//! 2. A plain endpoint is guarded by `can_view`
//! 3. A record endpoint is guarded by `can_edit`, which needs the record
//! 4. Staff bypass the predicate entirely
//! 5. Anonymous visitors only ever reach the unauthenticated handler
//! 6. Predicates pick up the named call arguments they declared
//! 7. A class-style view is protected as a unit and per method

use motorwatch_perms::{
    wire_permissions, Actor, Call, ContextRef, Endpoint, EndpointId, EvaluationContext,
    GuardTarget, InMemoryLookup, PermsError, Policy, Predicate, Registry, RegistrySettings,
    RequestContext, View, HTTP_CONTEXT,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct Member {
    id: u64,
    anonymous: bool,
    staff: bool,
    can_view: bool,
}

impl Actor for Member {
    fn is_anonymous(&self) -> bool {
        self.anonymous
    }
    fn is_staff(&self) -> bool {
        self.staff
    }
}

struct HttpRequest {
    method: &'static str,
    path: &'static str,
    member: Option<Member>,
}

impl RequestContext<Member> for HttpRequest {
    fn context_type(&self) -> &str {
        HTTP_CONTEXT
    }
    fn actor(&self) -> Option<&Member> {
        self.member.as_ref()
    }
    fn method(&self) -> &str {
        self.method
    }
    fn path(&self) -> &str {
        self.path
    }
}

#[derive(Debug, PartialEq)]
enum Page {
    Content(String),
    Redirect(String),
}

impl motorwatch_perms::LoginRedirect for Page {
    fn login_redirect(location: &str) -> Self {
        Page::Redirect(location.to_string())
    }
}

struct Record {
    owner_id: u64,
}

fn request(path: &'static str, member: Member) -> ContextRef<Member> {
    Arc::new(HttpRequest {
        method: "GET",
        path,
        member: Some(member),
    })
}

fn anonymous(path: &'static str) -> ContextRef<Member> {
    request(
        path,
        Member {
            anonymous: true,
            ..Member::default()
        },
    )
}

/// Endpoint that counts how often it actually ran.
fn counted(
    id: &str,
    body: &'static str,
    calls: &Arc<AtomicUsize>,
) -> Endpoint<Member, Page, PermsError> {
    let calls = Arc::clone(calls);
    Endpoint::new(id, move |_: &Call<Member>| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Page::Content(body.to_string()))
    })
}

fn registry(settings: RegistrySettings) -> Registry<Member, Page> {
    let lookup = InMemoryLookup::new();
    lookup.insert("pk", 7, Record { owner_id: 42 }).unwrap();
    let mut reg = Registry::new(settings).with_lookup(Arc::new(lookup));
    reg.register(Policy::new(
        "can_view",
        Predicate::actor(|m: &Member| m.can_view),
    ))
    .unwrap();
    reg.register(
        Policy::new(
            "can_edit",
            Predicate::subject(|m: &Member, r: &Record| m.id == r.owner_id),
        )
        .subject::<Record>(),
    )
    .unwrap();
    reg
}

// ============================================================================
// Chapter 1: configuration-time failures
// ============================================================================

#[test]
fn chapter_1_registration_rules() {
    let mut reg = registry(RegistrySettings::default());

    let err = reg
        .register(Policy::new("can_view", Predicate::actor(|_: &Member| true)))
        .unwrap_err();
    assert!(matches!(err, PermsError::DuplicatePolicy(ref n) if n == "can_view"));

    // Replacement supersedes the first registration.
    reg.register(Policy::new("can_view", Predicate::actor(|_: &Member| true)).replace())
        .unwrap();
    let check = reg.check("can_view").unwrap();
    assert!(check.allows(Some(&Member::default())));

    let err = reg
        .register(Policy::new("register", Predicate::actor(|_: &Member| true)))
        .unwrap_err();
    assert!(matches!(err, PermsError::Configuration(_)));

    let err = reg.require("nope").unwrap_err();
    assert!(matches!(err, PermsError::NoSuchPolicy(ref n) if n == "nope"));
}

// ============================================================================
// Chapter 2: can_view on a plain endpoint
// ============================================================================

#[test]
fn chapter_2_can_view_passes_result_through() {
    let reg = registry(RegistrySettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let get_thing = reg
        .require("can_view")
        .unwrap()
        .wrap_endpoint(counted("get_thing", "the thing", &calls))
        .unwrap();

    let denied = Member {
        id: 1,
        ..Member::default()
    };
    let err = get_thing
        .call(&Call::new(request("/thing", denied)))
        .unwrap_err();
    assert_eq!(err.policy_name(), Some("can_view"));
    assert_eq!(
        err.to_string(),
        "the \"can_view\" permission is required to access this resource"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let allowed = Member {
        id: 1,
        can_view: true,
        ..Member::default()
    };
    let page = get_thing.call(&Call::new(request("/thing", allowed))).unwrap();
    assert_eq!(page, Page::Content("the thing".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let id = EndpointId::new("get_thing");
    assert!(reg.entry_for_endpoint(&id, "can_view").unwrap().is_some());
    assert!(reg.entry_for_endpoint(&id, "can_edit").unwrap().is_none());
}

// ============================================================================
// Chapter 3: can_edit resolves the record first
// ============================================================================

#[test]
fn chapter_3_can_edit_checks_record_owner() {
    let reg = registry(RegistrySettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let edit_record = reg
        .require("can_edit")
        .unwrap()
        .wrap_endpoint(counted("edit_record", "saved", &calls).with_params(["record_id"]))
        .unwrap();

    let owner = Member {
        id: 42,
        ..Member::default()
    };
    assert!(edit_record
        .call(&Call::new(request("/records/7", owner)).arg(7))
        .is_ok());

    let stranger = Member {
        id: 1,
        ..Member::default()
    };
    let err = edit_record
        .call(&Call::new(request("/records/7", stranger)).arg(7))
        .unwrap_err();
    assert_eq!(err.policy_name(), Some("can_edit"));

    // Path segments arrive as strings; the key still matches.
    let owner = Member {
        id: 42,
        ..Member::default()
    };
    assert!(edit_record
        .call(&Call::new(request("/records/7", owner)).kwarg("pk", "7"))
        .is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Chapter 4: staff bypass
// ============================================================================

#[test]
fn chapter_4_staff_never_reach_the_predicate() {
    let mut reg = registry(RegistrySettings {
        allow_staff: true,
        ..RegistrySettings::default()
    });
    reg.register(
        Policy::new(
            "tripwire",
            Predicate::subject(|_: &Member, _: &Record| panic!("predicate must not run")),
        )
        .subject::<Record>(),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = reg
        .require("tripwire")
        .unwrap()
        .wrap_endpoint(counted("audit", "ok", &calls))
        .unwrap();

    // No subject key at all: a bypass must not even try to resolve one.
    let staff = Member {
        staff: true,
        ..Member::default()
    };
    assert!(endpoint.call(&Call::new(request("/audit", staff))).is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Chapter 5: anonymous visitors
// ============================================================================

#[test]
fn chapter_5_anonymous_only_reach_the_handler() {
    let mut reg = registry(RegistrySettings::default());
    let predicate_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&predicate_calls);
    reg.register(Policy::new(
        "counted",
        Predicate::actor(move |_: &Member| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }),
    ))
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = reg
        .require("counted")
        .unwrap()
        .wrap_endpoint(counted("dashboard", "hi", &calls))
        .unwrap();

    let page = endpoint
        .call(&Call::new(anonymous("/dashboard/")))
        .unwrap();
    assert_eq!(page, Page::Redirect("/login/?next=%2Fdashboard%2F".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(predicate_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn chapter_5b_anonymous_allowed_but_denied_still_redirects() {
    let mut reg = registry(RegistrySettings::default());
    reg.register(
        Policy::new("members_only", Predicate::actor(|m: &Member| !m.anonymous))
            .allow_anonymous(true)
            .unauthenticated_handler(|_| Page::Content("please sign in".to_string())),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = reg
        .require("members_only")
        .unwrap()
        .wrap_endpoint(counted("feed", "feed", &calls))
        .unwrap();

    let page = endpoint.call(&Call::new(anonymous("/feed"))).unwrap();
    assert_eq!(page, Page::Content("please sign in".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Chapter 6: named extras
// ============================================================================

#[test]
fn chapter_6_predicates_see_declared_extras() {
    let mut reg = registry(RegistrySettings::default());
    reg.register(Policy::new(
        "page_limit",
        Predicate::new(|ctx: &EvaluationContext<'_, Member>| {
            let page = ctx.extra("page").and_then(Value::as_u64).unwrap_or(1);
            page <= 3 && ctx.extra("secret").is_none()
        })
        .with_params(["page"]),
    ))
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = reg
        .require("page_limit")
        .unwrap()
        .wrap_endpoint(counted("list", "rows", &calls).with_params(["page"]))
        .unwrap();

    let member = || Member {
        id: 3,
        ..Member::default()
    };
    // Unsupplied extra falls back to the predicate's own default.
    assert!(endpoint.call(&Call::new(request("/list", member()))).is_ok());
    assert!(endpoint
        .call(&Call::new(request("/list", member())).arg(2).kwarg("secret", "x"))
        .is_ok());
    assert!(endpoint
        .call(&Call::new(request("/list", member())).kwarg("page", 9))
        .is_err());
}

// ============================================================================
// Chapter 7: class-style views
// ============================================================================

#[test]
fn chapter_7_views_guarded_whole_or_per_method() {
    let reg = registry(RegistrySettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let build = || {
        View::new("RecordView")
            .method("get", counted("get", "record", &calls))
            .method("post", counted("post", "updated", &calls).with_params(["pk"]))
    };

    let whole = reg
        .require("can_view")
        .unwrap()
        .wrap(GuardTarget::View(build()))
        .unwrap()
        .into_view()
        .unwrap();
    let viewer = Member {
        can_view: true,
        ..Member::default()
    };
    assert!(whole.dispatch(&Call::new(request("/records/7", viewer))).is_ok());
    let err = whole
        .dispatch(&Call::new(request("/records/7", Member::default())))
        .unwrap_err();
    assert_eq!(err.policy_name(), Some("can_view"));

    // Explicit wiring: only POST needs ownership of the record.
    let wired = wire_permissions(&reg, build(), &[("post", "can_edit")]).unwrap();
    let post = |member: Member| -> ContextRef<Member> {
        Arc::new(HttpRequest {
            method: "POST",
            path: "/records/7",
            member: Some(member),
        })
    };
    assert!(wired
        .dispatch(&Call::new(request("/records/7", Member::default())))
        .is_ok());
    assert!(wired
        .dispatch(&Call::new(post(Member {
            id: 42,
            ..Member::default()
        }))
        .arg(7))
        .is_ok());
    assert!(wired
        .dispatch(&Call::new(post(Member {
            id: 5,
            ..Member::default()
        }))
        .arg(7))
        .is_err());
    assert!(reg
        .entry_for_endpoint(&EndpointId::new("RecordView.post"), "can_edit")
        .unwrap()
        .is_some());
}

// ============================================================================
// Chapter 8: decisions have no memory
// ============================================================================

#[test]
fn chapter_8_repeated_checks_agree() {
    let reg = registry(RegistrySettings::default());
    let check = reg.check("can_edit").unwrap();
    let owner = Member {
        id: 42,
        ..Member::default()
    };
    let record: motorwatch_perms::SubjectRef = Arc::new(Record { owner_id: 42 });
    let first = check.allows_on(Some(&owner), &record);
    assert!(first);
    for _ in 0..5 {
        assert_eq!(check.allows_on(Some(&owner), &record), first);
    }
    assert!(!check.allows(Some(&owner)), "missing subject denies");
}
