//! Anti-forgery state values binding an authorization request to its
//! callback.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// How callback state values are checked against the registry.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StateValidation {
    /// Reject any state the registry does not hold. The default.
    Strict,
    /// Accept unknown states with a warning. Development only; this weakens
    /// CSRF protection on the callback.
    Permissive,
}

/// Registry of pending anti-forgery state values.
///
/// Values are single-use: a lookup removes the value whether or not it was
/// pending, so replaying a consumed state never succeeds.
pub struct StateRegistry {
    pending: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl StateRegistry {
    /// Creates a registry with the default ten-minute lifetime.
    pub fn new() -> StateRegistry {
        StateRegistry::with_ttl(Duration::minutes(10))
    }

    pub fn with_ttl(ttl: Duration) -> StateRegistry {
        StateRegistry {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a new opaque state value and records it as pending.
    pub fn issue(&self) -> String {
        let value = Uuid::new_v4().to_string();
        let mut pending = self.pending.lock().unwrap();
        pending.insert(value.clone(), Utc::now());
        value
    }

    /// Consumes a state value, returning whether it was pending and
    /// unexpired.
    pub fn consume(&self, value: &str) -> bool {
        let mut pending = self.pending.lock().unwrap();

        match pending.remove(value) {
            Some(issued_at) => Utc::now() - issued_at <= self.ttl,
            None => false,
        }
    }
}

impl Default for StateRegistry {
    fn default() -> StateRegistry {
        StateRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_state_is_accepted_once() {
        let registry = StateRegistry::new();

        let state = registry.issue();
        assert!(!state.is_empty());

        assert!(registry.consume(&state));
        // Consumed, so a replay must fail.
        assert!(!registry.consume(&state));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let registry = StateRegistry::new();
        assert!(!registry.consume("never-issued"));
    }

    #[test]
    fn expired_state_is_rejected_and_still_consumed() {
        let registry = StateRegistry::with_ttl(Duration::seconds(-1));

        let state = registry.issue();
        assert!(!registry.consume(&state));
        assert!(!registry.consume(&state));
    }

    #[test]
    fn states_are_independent() {
        let registry = StateRegistry::new();

        let first = registry.issue();
        let second = registry.issue();
        assert_ne!(first, second);

        assert!(registry.consume(&second));
        assert!(registry.consume(&first));
    }
}
