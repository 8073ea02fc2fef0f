//! Control plane configuration (§6 defaults).
//!
//! Plain struct + builder, in the same shape the receiver side of this
//! crate already uses for its config — no config-file crate, since every
//! knob here has a sane default and the handful of deployments that need to
//! override one reach for environment variables instead.

use std::time::Duration;

/// Tunable limits and timeouts for the control plane. Construct via
/// [`ControlPlaneConfig::default`], the builder methods, or
/// [`ControlPlaneConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Maximum concurrent listener connections per session.
    pub max_listeners_per_session: u32,
    /// Hard ceiling on a connection's lifetime before forced close.
    pub max_connection_duration: Duration,
    /// When to emit `connectionWarning` before the hard ceiling.
    pub connection_warning_at: Duration,
    /// Minimum connection age before a refresh is accepted.
    pub connection_refresh_at: Duration,
    /// How long a session record survives after going inactive.
    pub session_retention: Duration,
    /// `createSession` rate limit: (window, max requests).
    pub rate_limit_create_session: (Duration, u32),
    /// `joinSession` rate limit: (window, max requests).
    pub rate_limit_join_session: (Duration, u32),
    /// Max candidate IDs tried before `createSession` gives up.
    pub id_generator_max_attempts: u32,
    /// Max connections fanned out to concurrently per broadcast.
    pub broadcast_max_parallel: usize,
    /// TTL for the authorizer's JWKS cache.
    pub authorizer_cache_ttl: Duration,
    /// Overall deadline for a single admission flow (§5 Concurrency &
    /// Resource Model). On expiry the transport closes with a
    /// policy-violation code and any partially-applied state is
    /// compensated the same way a `PutConnection` failure after a
    /// successful join increment is.
    pub admission_deadline: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            max_listeners_per_session: 500,
            max_connection_duration: Duration::from_secs(7200),
            connection_warning_at: Duration::from_secs(6300),
            connection_refresh_at: Duration::from_secs(6000),
            session_retention: Duration::from_secs(43_200),
            rate_limit_create_session: (Duration::from_secs(60), 5),
            rate_limit_join_session: (Duration::from_secs(60), 30),
            id_generator_max_attempts: 10,
            broadcast_max_parallel: 32,
            authorizer_cache_ttl: Duration::from_secs(3600),
            admission_deadline: Duration::from_secs(5),
        }
    }
}

impl ControlPlaneConfig {
    /// Override `max_listeners_per_session`.
    #[must_use]
    pub fn max_listeners_per_session(mut self, n: u32) -> Self {
        self.max_listeners_per_session = n;
        self
    }

    /// Override `max_connection_duration`.
    #[must_use]
    pub fn max_connection_duration(mut self, d: Duration) -> Self {
        self.max_connection_duration = d;
        self
    }

    /// Override `connection_warning_at`.
    #[must_use]
    pub fn connection_warning_at(mut self, d: Duration) -> Self {
        self.connection_warning_at = d;
        self
    }

    /// Override `connection_refresh_at`.
    #[must_use]
    pub fn connection_refresh_at(mut self, d: Duration) -> Self {
        self.connection_refresh_at = d;
        self
    }

    /// Override `session_retention`.
    #[must_use]
    pub fn session_retention(mut self, d: Duration) -> Self {
        self.session_retention = d;
        self
    }

    /// Override `broadcast_max_parallel`.
    #[must_use]
    pub fn broadcast_max_parallel(mut self, n: usize) -> Self {
        self.broadcast_max_parallel = n;
        self
    }

    /// Build from `BABELCAST_*` environment variables, falling back to
    /// [`ControlPlaneConfig::default`] for anything unset or unparsable.
    ///
    /// Recognized variables: `BABELCAST_MAX_LISTENERS_PER_SESSION`,
    /// `BABELCAST_MAX_CONNECTION_DURATION_SECS`,
    /// `BABELCAST_CONNECTION_WARNING_SECS`,
    /// `BABELCAST_CONNECTION_REFRESH_SECS`,
    /// `BABELCAST_SESSION_RETENTION_SECS`,
    /// `BABELCAST_ID_GENERATOR_MAX_ATTEMPTS`,
    /// `BABELCAST_BROADCAST_MAX_PARALLEL`,
    /// `BABELCAST_ADMISSION_DEADLINE_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u32("BABELCAST_MAX_LISTENERS_PER_SESSION") {
            cfg.max_listeners_per_session = v;
        }
        if let Some(v) = env_u64("BABELCAST_MAX_CONNECTION_DURATION_SECS") {
            cfg.max_connection_duration = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("BABELCAST_CONNECTION_WARNING_SECS") {
            cfg.connection_warning_at = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("BABELCAST_CONNECTION_REFRESH_SECS") {
            cfg.connection_refresh_at = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("BABELCAST_SESSION_RETENTION_SECS") {
            cfg.session_retention = Duration::from_secs(v);
        }
        if let Some(v) = env_u32("BABELCAST_ID_GENERATOR_MAX_ATTEMPTS") {
            cfg.id_generator_max_attempts = v;
        }
        if let Some(v) = env_u32("BABELCAST_BROADCAST_MAX_PARALLEL") {
            cfg.broadcast_max_parallel = v as usize;
        }
        if let Some(v) = env_u64("BABELCAST_ADMISSION_DEADLINE_SECS") {
            cfg.admission_deadline = Duration::from_secs(v);
        }

        cfg
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = ControlPlaneConfig::default();
        assert_eq!(cfg.max_listeners_per_session, 500);
        assert_eq!(cfg.max_connection_duration, Duration::from_secs(7200));
        assert_eq!(cfg.rate_limit_create_session, (Duration::from_secs(60), 5));
        assert_eq!(cfg.rate_limit_join_session, (Duration::from_secs(60), 30));
    }

    #[test]
    fn builder_overrides_one_field_at_a_time() {
        let cfg = ControlPlaneConfig::default().max_listeners_per_session(10);
        assert_eq!(cfg.max_listeners_per_session, 10);
        assert_eq!(cfg.max_connection_duration, Duration::from_secs(7200));
    }
}
