//! Mutable helper state and diagnostics snapshots.
//!
//! Two pieces of state live here. [`RefreshState`] is owned by whichever task
//! holds the refresh mutex and carries what the next fetch needs.
//! [`StatusRecord`] is a short-lived copy of the same bookkeeping kept behind
//! a `std` lock so diagnostics never wait on an in-flight fetch.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::client::PollToken;
use crate::policy::RefreshPolicyState;

/// Lifecycle of the cached configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    /// No configuration has been committed yet.
    Uninitialized,
    /// A configuration is cached and the last attempt succeeded.
    Warm,
    /// A configuration is cached but the last attempt failed; it is still served.
    Stale,
}

impl HelperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Warm => "warm",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for HelperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State guarded by the refresh mutex.
#[derive(Debug, Default)]
pub(crate) struct RefreshState {
    pub(crate) policy_state: RefreshPolicyState,
    /// Token carried into the next fetch; `None` starts a new session.
    pub(crate) poll_token: Option<PollToken>,
    /// Latest poll interval recommended by the service.
    pub(crate) next_poll_interval: Option<Duration>,
}

/// Bookkeeping mirrored for lock-free diagnostics.
#[derive(Debug, Default, Clone)]
pub(crate) struct StatusRecord {
    pub(crate) last_attempt_at: Option<Instant>,
    pub(crate) last_error: Option<String>,
    pub(crate) consecutive_failures: u32,
    pub(crate) next_poll_interval: Option<Duration>,
    pub(crate) has_poll_token: bool,
}

impl StatusRecord {
    pub(crate) fn record_success(&mut self, state: &RefreshState) {
        self.sync(state);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, state: &RefreshState, error: String) {
        self.sync(state);
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    fn sync(&mut self, state: &RefreshState) {
        self.last_attempt_at = state.policy_state.last_attempt_at();
        self.next_poll_interval = state.next_poll_interval;
        self.has_poll_token = state.poll_token.is_some();
    }
}

/// Diagnostics view of a helper, returned by [`crate::AppConfigHelper::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Coarse lifecycle state derived from the cache and the failure streak.
    pub state: HelperState,
    /// Message of the most recent failed attempt, cleared by the next success.
    pub last_error: Option<String>,
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Time elapsed since the last attempt started.
    pub last_attempt_age: Option<Duration>,
    /// Poll interval last recommended by the service.
    pub next_poll_interval: Option<Duration>,
    /// Whether the next fetch continues an existing session.
    pub has_poll_token: bool,
    /// Version label of the cached configuration.
    pub version_label: Option<String>,
}

impl StatusSnapshot {
    pub(crate) fn from_record(
        record: &StatusRecord,
        cached: bool,
        version_label: Option<String>,
        now: Instant,
    ) -> Self {
        let state = match (cached, record.consecutive_failures) {
            (false, _) => HelperState::Uninitialized,
            (true, 0) => HelperState::Warm,
            (true, _) => HelperState::Stale,
        };
        Self {
            state,
            last_error: record.last_error.clone(),
            consecutive_failures: record.consecutive_failures,
            last_attempt_age: record
                .last_attempt_at
                .map(|at| now.saturating_duration_since(at)),
            next_poll_interval: record.next_poll_interval,
            has_poll_token: record.has_poll_token,
            version_label,
        }
    }

    /// Renders the snapshot as JSON for status endpoints.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("state".into(), Value::from(self.state.as_str()));
        map.insert(
            "lastError".into(),
            self.last_error.clone().map_or(Value::Null, Value::from),
        );
        map.insert(
            "consecutiveFailures".into(),
            Value::from(self.consecutive_failures),
        );
        map.insert(
            "lastAttemptAgeSeconds".into(),
            self.last_attempt_age
                .map_or(Value::Null, |age| Value::from(age.as_secs())),
        );
        map.insert(
            "nextPollIntervalSeconds".into(),
            self.next_poll_interval
                .map_or(Value::Null, |interval| Value::from(interval.as_secs())),
        );
        map.insert("hasPollToken".into(), Value::from(self.has_poll_token));
        map.insert(
            "versionLabel".into(),
            self.version_label.clone().map_or(Value::Null, Value::from),
        );
        Value::Object(map)
    }
}
