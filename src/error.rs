//! Error types for the control plane.
//!
//! Each component boundary gets its own `thiserror` enum (mirroring how the
//! rest of this crate scopes errors per subsystem rather than sharing one
//! global enum). [`AdmissionError`] is the outermost error surfaced to a
//! peer; it carries enough structure to render the wire `error.code`
//! taxonomy without string matching.

use std::time::Duration;

use crate::model::ConnectionPhase;

/// Errors from the state store (C1).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PutSession` with `onlyIfAbsent = true` raced an existing record.
    #[error("session already exists")]
    AlreadyExists,

    /// An `UpdateSession` condition did not hold.
    #[error("condition failed")]
    ConditionFailed,

    /// The requested record does not exist.
    #[error("not found")]
    NotFound,

    /// The backend failed after exhausting the retry budget.
    #[error("backend unavailable after retries: {0}")]
    Unavailable(String),
}

/// Errors from the session ID generator (C2).
#[derive(Debug, thiserror::Error)]
pub enum IdGenerationError {
    /// All `maxAttempts` candidates collided with an existing session ID.
    #[error("collision exhausted after {attempts} attempts")]
    CollisionExhausted {
        /// Number of candidates tried.
        attempts: u32,
    },

    /// The store probe used to check existence failed.
    #[error("existence probe failed: {0}")]
    ProbeFailed(#[from] StoreError),
}

/// The five-way denial taxonomy for the authorizer (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthDenyReason {
    /// No bearer token was presented.
    #[error("missing token")]
    MissingToken,
    /// The token's `exp` claim is in the past.
    #[error("token expired")]
    Expired,
    /// Signature verification against the JWKS failed.
    #[error("bad signature")]
    BadSignature,
    /// `iss` did not match the configured issuer.
    #[error("wrong issuer")]
    WrongIssuer,
    /// The token could not be parsed, or a required claim is missing/wrong
    /// shape (`aud`, `token_use`).
    #[error("malformed token")]
    Malformed,
}

/// Errors from the authorizer (C3).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credential was rejected; see [`AuthDenyReason`] for the kind.
    #[error("authorization denied: {0}")]
    Denied(#[from] AuthDenyReason),

    /// The JWKS could not be fetched or refreshed in time.
    #[error("JWKS unavailable: {0}")]
    JwksUnavailable(String),
}

/// Errors from input validation (C5). Carries only the offending field
/// name — never raw user input.
#[derive(Debug, thiserror::Error)]
#[error("invalid input: {field}")]
pub struct ValidationError {
    /// Name of the field that failed validation.
    pub field: &'static str,
}

impl ValidationError {
    /// Build a validation error for `field`.
    #[must_use]
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

/// Errors from the rate limiter (C4).
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The identifier has exceeded its window limit.
    #[error("rate limited, retry after {retry_after:?}")]
    Limited {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },

    /// The backend was unavailable and the operation's policy is fail-closed.
    #[error("rate limiter backend unavailable (fail-closed)")]
    BackendUnavailable,
}

/// Errors surfaced by the session/connection lifecycle handlers (C6-C9).
#[derive(Debug, thiserror::Error)]
pub enum SessionLifecycleError {
    /// The session does not exist, or is no longer active.
    #[error("session not found")]
    NotFound,

    /// The session has reached `maxListenersPerSession`.
    #[error("session full")]
    Full,

    /// The (source, target) language pair is not supported downstream.
    #[error("unsupported language pair")]
    UnsupportedLanguage,

    /// A state transition was attempted that the session's current state
    /// does not permit.
    #[error("invalid transition from {from:?}")]
    InvalidTransition {
        /// The state the connection was in when the transition was attempted.
        from: ConnectionPhase,
    },

    /// The store reported an error that isn't one of the above.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The outermost error surfaced to a peer over the wire, one variant per
/// `error.code` in the spec's external-interfaces section.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// -> `UNAUTHORIZED`
    #[error("unauthorized")]
    Unauthorized,

    /// -> `INVALID_INPUT`
    #[error("invalid input: {field}")]
    InvalidInput {
        /// Name of the offending field.
        field: &'static str,
    },

    /// -> `RATE_LIMITED`
    #[error("rate limited")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// -> `SESSION_NOT_FOUND`
    #[error("session not found")]
    SessionNotFound,

    /// -> `SESSION_FULL`
    #[error("session full")]
    SessionFull,

    /// -> `UNSUPPORTED_LANGUAGE`
    #[error("unsupported language")]
    UnsupportedLanguage,

    /// -> `INTERNAL_ERROR`
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// The wire `error.code` this variant renders as.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionFull => "SESSION_FULL",
            Self::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// `retryAfter` seconds to include in the `error` frame, if any.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<ValidationError> for AdmissionError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidInput { field: e.field }
    }
}

impl From<AuthError> for AdmissionError {
    fn from(_: AuthError) -> Self {
        // Never leak the denial kind to the peer; admission only ever shows
        // a single opaque "Unauthorized" surface (spec C3 contract).
        Self::Unauthorized
    }
}

impl From<RateLimitError> for AdmissionError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Limited { retry_after } => Self::RateLimited {
                retry_after_secs: retry_after.as_secs(),
            },
            RateLimitError::BackendUnavailable => {
                Self::Internal("rate limiter unavailable".into())
            }
        }
    }
}

impl From<SessionLifecycleError> for AdmissionError {
    fn from(e: SessionLifecycleError) -> Self {
        match e {
            SessionLifecycleError::NotFound => Self::SessionNotFound,
            SessionLifecycleError::Full => Self::SessionFull,
            SessionLifecycleError::UnsupportedLanguage => Self::UnsupportedLanguage,
            SessionLifecycleError::InvalidTransition { .. } => {
                Self::InvalidInput { field: "action" }
            }
            SessionLifecycleError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<IdGenerationError> for AdmissionError {
    fn from(e: IdGenerationError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}
