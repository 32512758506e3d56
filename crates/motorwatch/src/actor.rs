use motorwatch_perms::{Actor, RequestContext, HTTP_CONTEXT};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::UserConfig;

pub const CAP_VIEW_READINGS: &str = "view_readings";
pub const CAP_INGEST: &str = "ingest";

/// The acting principal of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub anonymous: bool,
    pub staff: bool,
    pub superuser: bool,
    pub capabilities: BTreeSet<String>,
    pub motors: BTreeSet<String>,
}

impl User {
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn can(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether readings of `motor_id` are visible to this user.
    pub fn sees_motor(&self, motor_id: &str) -> bool {
        self.motors.is_empty() || self.motors.contains(motor_id)
    }
}

impl Actor for User {
    fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn is_staff(&self) -> bool {
        self.staff
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }
}

impl From<&UserConfig> for User {
    fn from(cfg: &UserConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            anonymous: false,
            staff: cfg.staff,
            superuser: cfg.superuser,
            capabilities: cfg.capabilities.clone(),
            motors: cfg.motors.clone(),
        }
    }
}

/// Bearer-token lookup for the configured users.
#[derive(Debug)]
pub struct UserDirectory {
    by_token: HashMap<String, Arc<User>>,
    anonymous: Arc<User>,
}

impl UserDirectory {
    pub fn new(users: &[UserConfig]) -> Self {
        Self {
            by_token: users
                .iter()
                .map(|u| (u.token.clone(), Arc::new(User::from(u))))
                .collect(),
            anonymous: Arc::new(User::anonymous()),
        }
    }

    /// The user owning `token`; anonymous for a missing or unknown token.
    pub fn resolve(&self, token: Option<&str>) -> Arc<User> {
        token
            .and_then(|t| self.by_token.get(t))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.anonymous))
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

/// Per-request context handed to guarded endpoints.
pub struct HttpContext {
    pub method: String,
    pub path: String,
    pub user: Arc<User>,
}

impl RequestContext<User> for HttpContext {
    fn context_type(&self) -> &str {
        HTTP_CONTEXT
    }

    fn actor(&self) -> Option<&User> {
        Some(&*self.user)
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }
}
