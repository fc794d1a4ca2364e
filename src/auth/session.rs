//! Logged-in browser sessions.
//!
//! Sessions live in process memory and are transported as an opaque id in an
//! HttpOnly cookie. A successful OAuth callback creates one; logout destroys
//! it.

use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "termine_session";

/// Registry mapping session ids to user identities.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, String>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }

    /// Creates a session for `user_id` and returns its id.
    pub fn create(&self, user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(id.clone(), user_id.to_string());
        id
    }

    /// Resolves a session id to the user it belongs to.
    pub fn user_for(&self, session_id: &str) -> Option<String> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Destroys a session. Returns whether it existed.
    pub fn destroy(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_destroy() {
        let registry = SessionRegistry::new();

        let id = registry.create("local");
        assert_eq!(registry.user_for(&id), Some("local".to_string()));

        assert!(registry.destroy(&id));
        assert_eq!(registry.user_for(&id), None);
        assert!(!registry.destroy(&id));
    }

    #[test]
    fn unknown_session_resolves_to_none() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.user_for("missing"), None);
    }
}
