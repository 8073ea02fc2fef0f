//! C5: pure input validators, plus the language-support lookup service.
//!
//! Validators never touch the store or the network; they only decide
//! whether a piece of wire input has the right shape. `LanguageSupport` is
//! the one stateful piece in this module — a cached lookup against a
//! downstream capability, kept separate so the pure validators stay pure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ValidationError;
use crate::model::{LanguageCode, QualityTier};

/// Validate an ISO-639-1 language code: exactly two lowercase ASCII
/// letters.
pub fn validate_language(s: &str) -> Result<LanguageCode, ValidationError> {
    let bytes = s.as_bytes();
    if bytes.len() == 2 && bytes.iter().all(u8::is_ascii_lowercase) {
        Ok(LanguageCode::from_bytes_unchecked([bytes[0], bytes[1]]))
    } else {
        Err(ValidationError::new("language"))
    }
}

/// Validate a session ID against the canonical
/// `<adjective>-<noun>-<3-digit-number>` shape: three non-empty
/// dash-separated components, each alphanumeric and starting with a
/// letter, total length <= 48.
pub fn validate_session_id(s: &str) -> Result<(), ValidationError> {
    if s.len() > 48 {
        return Err(ValidationError::new("sessionId"));
    }
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::new("sessionId"));
    }
    let shape_ok = parts.iter().enumerate().all(|(i, p)| {
        let mut chars = p.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric());
        if i == 2 {
            p.len() == 3 && p.chars().all(|c| c.is_ascii_digit()) && p.parse::<u32>().is_ok_and(|n| (100..=999).contains(&n))
        } else {
            first.is_ascii_lowercase() && rest_ok
        }
    });
    if shape_ok {
        Ok(())
    } else {
        Err(ValidationError::new("sessionId"))
    }
}

/// Validate a quality tier string.
pub fn validate_quality_tier(s: &str) -> Result<QualityTier, ValidationError> {
    QualityTier::parse(s).ok_or_else(|| ValidationError::new("qualityTier"))
}

/// A wire `action` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start a new session as the speaker.
    CreateSession,
    /// Join an existing session as a listener.
    JoinSession,
    /// Replace a connection slot without losing the session.
    RefreshConnection,
    /// Liveness frame.
    Heartbeat,
}

/// Validate a wire `action` string.
pub fn validate_action(s: &str) -> Result<Action, ValidationError> {
    match s {
        "createSession" => Ok(Action::CreateSession),
        "joinSession" => Ok(Action::JoinSession),
        "refreshConnection" => Ok(Action::RefreshConnection),
        "heartbeat" => Ok(Action::Heartbeat),
        _ => Err(ValidationError::new("action")),
    }
}

/// Backing lookup for whether a downstream subsystem supports translating
/// from `source` to `target`. Abstracted so tests can supply a fixed
/// answer without a real downstream dependency.
#[async_trait]
pub trait LanguagePairSource: Send + Sync {
    /// Whether `(source, target)` is supported.
    async fn supports(&self, source: LanguageCode, target: LanguageCode) -> bool;
}

/// A source that supports every pair — useful for local/dev deployments
/// with no downstream translation subsystem.
pub struct AllowAllLanguages;

#[async_trait]
impl LanguagePairSource for AllowAllLanguages {
    async fn supports(&self, _source: LanguageCode, _target: LanguageCode) -> bool {
        true
    }
}

struct CacheEntry {
    supported: bool,
    cached_at: Instant,
}

/// Process-local cache over a [`LanguagePairSource`], with a minimum TTL
/// and a lookup budget: a lookup that doesn't resolve within the budget is
/// treated as unsupported (conservative policy per C5).
pub struct LanguageSupport {
    source: Arc<dyn LanguagePairSource>,
    ttl: Duration,
    lookup_budget: Duration,
    cache: RwLock<std::collections::HashMap<(LanguageCode, LanguageCode), CacheEntry>>,
}

impl LanguageSupport {
    /// Build a language-support cache. `ttl` should be at least 10 minutes
    /// per the support contract; `lookup_budget` bounds how long admission
    /// waits on a cache miss before rejecting conservatively.
    #[must_use]
    pub fn new(source: Arc<dyn LanguagePairSource>, ttl: Duration, lookup_budget: Duration) -> Self {
        Self {
            source,
            ttl,
            lookup_budget,
            cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Whether `(source, target)` is supported, consulting the cache first
    /// and falling back to a budgeted lookup on a miss or stale entry.
    pub async fn is_supported(&self, source: LanguageCode, target: LanguageCode) -> bool {
        let key = (source, target);
        if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.cached_at.elapsed() < self.ttl {
                return entry.supported;
            }
        }

        let lookup = self.source.supports(source, target);
        let supported = match tokio::time::timeout(self.lookup_budget, lookup).await {
            Ok(supported) => supported,
            Err(_) => {
                tracing::warn!(%source, %target, "language support lookup exceeded budget, rejecting");
                return false;
            }
        };

        self.cache.write().await.insert(
            key,
            CacheEntry {
                supported,
                cached_at: Instant::now(),
            },
        );
        supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_language_accepts_only_two_lowercase_letters() {
        assert!(validate_language("en").is_ok());
        assert!(validate_language("EN").is_err());
        assert!(validate_language("eng").is_err());
        assert!(validate_language("").is_err());
    }

    #[test]
    fn validate_session_id_accepts_canonical_shape() {
        assert!(validate_session_id("amber-anchor-123").is_ok());
        assert!(validate_session_id("Amber-anchor-123").is_err());
        assert!(validate_session_id("amber-anchor-12a").is_err());
        assert!(validate_session_id("amber-anchor").is_err());
        assert!(validate_session_id("a-b-100-extra").is_err());
        assert!(validate_session_id(&"a".repeat(49)).is_err());
        assert!(validate_session_id("amber-anchor-12").is_err());
        assert!(validate_session_id("amber-anchor-1234").is_err());
        assert!(validate_session_id("amber-anchor-099").is_err());
    }

    #[test]
    fn validate_quality_tier_rejects_unknown() {
        assert!(validate_quality_tier("standard").is_ok());
        assert!(validate_quality_tier("gold").is_err());
    }

    #[test]
    fn validate_action_covers_all_four_actions() {
        assert!(validate_action("createSession").is_ok());
        assert!(validate_action("joinSession").is_ok());
        assert!(validate_action("refreshConnection").is_ok());
        assert!(validate_action("heartbeat").is_ok());
        assert!(validate_action("other").is_err());
    }

    struct FixedSupport(bool);

    #[async_trait]
    impl LanguagePairSource for FixedSupport {
        async fn supports(&self, _source: LanguageCode, _target: LanguageCode) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn caches_result_across_lookups() {
        let support = LanguageSupport::new(
            Arc::new(FixedSupport(true)),
            Duration::from_secs(600),
            Duration::from_millis(500),
        );
        let en = validate_language("en").unwrap();
        let es = validate_language("es").unwrap();
        assert!(support.is_supported(en, es).await);
        assert!(support.is_supported(en, es).await);
    }

    struct SlowSupport;

    #[async_trait]
    impl LanguagePairSource for SlowSupport {
        async fn supports(&self, _source: LanguageCode, _target: LanguageCode) -> bool {
            tokio::time::sleep(Duration::from_secs(5)).await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_exceeding_budget_is_rejected_conservatively() {
        let support = LanguageSupport::new(
            Arc::new(SlowSupport),
            Duration::from_secs(600),
            Duration::from_millis(500),
        );
        let en = validate_language("en").unwrap();
        let fr = validate_language("fr").unwrap();
        assert!(!support.is_supported(en, fr).await);
    }
}
