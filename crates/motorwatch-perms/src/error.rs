use std::fmt;
use thiserror::Error;

/// Single error enum for registration, guarding and evaluation.
///
/// Configuration-time variants (duplicate/unknown/reserved names, bad guard
/// targets) are meant to abort start-up. Anonymous denials are not errors:
/// they resolve to the unauthenticated handler's response.
#[derive(Debug, Error)]
pub enum PermsError {
    #[error("permission exists: {0}")]
    DuplicatePolicy(String),

    #[error("permission not registered: {0}")]
    NoSuchPolicy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("bad call to permissions guard: {0} is not callable")]
    InvalidGuardTarget(String),

    #[error("could not find request context in call arguments: {0}")]
    GuardContext(String),

    #[error("{subject_type} with {field}={key} not found")]
    SubjectNotFound {
        subject_type: String,
        field: String,
        key: String,
    },

    #[error("the \"{policy}\" permission is required to access this resource")]
    PermissionDenied { policy: String },

    #[error("{endpoint} has no handler for method {method}")]
    UnknownMethod { endpoint: String, method: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PermsError {
    pub fn kind(&self) -> PermsErrorKind {
        match self {
            PermsError::DuplicatePolicy(_) => PermsErrorKind::DuplicatePolicy,
            PermsError::NoSuchPolicy(_) => PermsErrorKind::NoSuchPolicy,
            PermsError::Configuration(_) => PermsErrorKind::Configuration,
            PermsError::InvalidGuardTarget(_) => PermsErrorKind::InvalidGuardTarget,
            PermsError::GuardContext(_) => PermsErrorKind::GuardContext,
            PermsError::SubjectNotFound { .. } => PermsErrorKind::SubjectNotFound,
            PermsError::PermissionDenied { .. } => PermsErrorKind::PermissionDenied,
            PermsError::UnknownMethod { .. } => PermsErrorKind::UnknownMethod,
            PermsError::Internal(_) => PermsErrorKind::Internal,
        }
    }

    /// Name of the policy that denied the call, for error pages.
    pub fn policy_name(&self) -> Option<&str> {
        match self {
            PermsError::PermissionDenied { policy } => Some(policy),
            _ => None,
        }
    }

    /// True for the errors raised while building the registry or wrapping
    /// endpoints, as opposed to per-request outcomes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.kind(),
            PermsErrorKind::DuplicatePolicy
                | PermsErrorKind::NoSuchPolicy
                | PermsErrorKind::Configuration
                | PermsErrorKind::InvalidGuardTarget
        )
    }
}

/// Discriminator for PermsError variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermsErrorKind {
    DuplicatePolicy,
    NoSuchPolicy,
    Configuration,
    InvalidGuardTarget,
    GuardContext,
    SubjectNotFound,
    PermissionDenied,
    UnknownMethod,
    Internal,
}

impl fmt::Display for PermsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermsErrorKind::DuplicatePolicy => write!(f, "DuplicatePolicy"),
            PermsErrorKind::NoSuchPolicy => write!(f, "NoSuchPolicy"),
            PermsErrorKind::Configuration => write!(f, "Configuration"),
            PermsErrorKind::InvalidGuardTarget => write!(f, "InvalidGuardTarget"),
            PermsErrorKind::GuardContext => write!(f, "GuardContext"),
            PermsErrorKind::SubjectNotFound => write!(f, "SubjectNotFound"),
            PermsErrorKind::PermissionDenied => write!(f, "PermissionDenied"),
            PermsErrorKind::UnknownMethod => write!(f, "UnknownMethod"),
            PermsErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

pub type PermsResult<T> = Result<T, PermsError>;
