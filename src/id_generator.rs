//! C2: human-readable session ID generation.
//!
//! `<adjective>-<noun>-<3-digit-number>`, sampled uniformly from fixed word
//! lists, screened against a small profanity blacklist, retried against an
//! existence probe under exponential backoff. Memoryless: nothing here
//! remembers which IDs were already handed out, that's C1's job.

use rand::Rng;

use crate::error::IdGenerationError;
use crate::store::retry::RetryPolicy;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "calm", "dusty", "eager", "fuzzy", "gentle", "happy", "icy", "jolly",
    "keen", "lively", "misty", "noble", "orange", "plain", "quiet", "rapid", "sunny", "tidy",
    "urban", "vivid", "warm", "young", "zesty", "brave", "crisp", "deep", "even", "fresh",
    "grand", "humble", "inner", "jumpy", "kind", "level", "mellow", "nimble", "open", "proud",
];

const NOUNS: &[&str] = &[
    "anchor", "badge", "canyon", "delta", "ember", "falcon", "glacier", "harbor", "island",
    "jungle", "kernel", "lantern", "meadow", "nugget", "oasis", "prairie", "quarry", "river",
    "summit", "thicket", "umbra", "valley", "willow", "xenon", "yonder", "zephyr", "boulder",
    "current", "dune", "forest", "grove", "hollow", "inlet", "knoll", "ledge", "marsh", "notch",
    "orchard", "peak", "ridge",
];

/// Combined tokens (whole words or exact adjective+noun pairs) that must
/// never appear in a generated ID, screened case-insensitively. None of
/// these currently overlap [`ADJECTIVES`]/[`NOUNS`]; the list exists so a
/// deployment extending either word list has a single place to register
/// additions that must never be sampled.
const BLACKLIST: &[&str] = &["admin", "root", "null", "undefined"];

/// Generate a unique session ID by sampling candidates and probing
/// existence via `exists_probe`, retrying up to `max_attempts` times with
/// exponential backoff. `exists_probe` returning `Ok(true)` means the
/// candidate is already taken.
pub async fn new_session_id<F, Fut>(
    max_attempts: u32,
    mut exists_probe: F,
) -> Result<String, IdGenerationError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<bool, IdGenerationError>>,
{
    let policy = RetryPolicy {
        base: std::time::Duration::from_millis(100),
        cap: std::time::Duration::from_millis(3200),
        max_attempts,
    };
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let candidate = sample_candidate();
        match exists_probe(candidate.clone()).await {
            Ok(false) => return Ok(candidate),
            Ok(true) => {
                tracing::debug!(attempt, "session id candidate collided, retrying");
                if attempt >= max_attempts {
                    return Err(IdGenerationError::CollisionExhausted { attempts: attempt });
                }
                let delay = policy_delay(&policy, attempt - 1);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn policy_delay(policy: &RetryPolicy, attempt: u32) -> std::time::Duration {
    let exp = policy
        .base
        .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    exp.min(policy.cap)
}

/// Sample one candidate ID, resampling locally until it clears the
/// blacklist (the blacklist is small relative to the word lists, so this
/// converges in O(1) expected iterations).
fn sample_candidate() -> String {
    loop {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
        let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
        let number = rng.gen_range(100..=999);
        let candidate = format!("{adjective}-{noun}-{number}");
        if !is_blacklisted(adjective, noun, &candidate) {
            return candidate;
        }
    }
}

fn is_blacklisted(adjective: &str, noun: &str, combined: &str) -> bool {
    BLACKLIST.iter().any(|w| {
        w.eq_ignore_ascii_case(adjective) || w.eq_ignore_ascii_case(noun) || w.eq_ignore_ascii_case(combined)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn sampled_candidate_matches_canonical_shape() {
        for _ in 0..200 {
            let id = sample_candidate();
            let parts: Vec<&str> = id.split('-').collect();
            assert_eq!(parts.len(), 3);
            assert!(parts[0].chars().next().unwrap().is_ascii_lowercase());
            assert!(parts[1].chars().next().unwrap().is_ascii_lowercase());
            let n: u32 = parts[2].parse().unwrap();
            assert!((100..=999).contains(&n));
        }
    }

    #[tokio::test]
    async fn retries_on_collision_then_succeeds() {
        let calls = AtomicU32::new(0);
        let id = new_session_id(10, |_candidate| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(n < 2)
        })
        .await
        .unwrap();
        assert!(!id.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_fails() {
        let err = new_session_id(3, |_candidate| async { Ok(true) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdGenerationError::CollisionExhausted { attempts: 3 }
        ));
    }

    #[test]
    fn blacklisted_words_are_screened_case_insensitively() {
        assert!(is_blacklisted("admin", "anchor", "admin-anchor-123"));
        assert!(is_blacklisted("ADMIN", "anchor", "ADMIN-anchor-123"));
        assert!(!is_blacklisted("amber", "anchor", "amber-anchor-123"));
    }

    #[tokio::test]
    async fn probe_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let err = new_session_id(10, |_candidate| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IdGenerationError::ProbeFailed(crate::error::StoreError::Unavailable(
                "down".into(),
            )))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IdGenerationError::ProbeFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
