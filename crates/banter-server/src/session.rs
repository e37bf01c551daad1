//! In-RAM session registry.
//!
//! Sessions map random cookie ids to user ids with a sliding TTL. The
//! registry is shared across clones; expired entries are invisible to
//! lookups and reclaimed by `sweep`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use banter_hub::UserId;

/// A live session as handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque cookie value.
    pub id: String,
    /// Authenticated user.
    pub user_id: UserId,
}

struct SessionRec {
    user_id: UserId,
    expires_at: Instant,
}

/// Shared session store with a sliding per-session TTL.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, SessionRec>>>,
    ttl: Duration,
}

#[allow(clippy::expect_used)]
impl SessionRegistry {
    /// Create a registry whose sessions live `ttl` past their last touch.
    pub fn new(ttl: Duration) -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Open a fresh session for a user.
    pub fn new_session(&self, user_id: UserId) -> Session {
        let id = format!("{:032x}", rand::random::<u128>());
        let rec = SessionRec { user_id, expires_at: Instant::now() + self.ttl };
        self.inner.write().expect("lock poisoned").insert(id.clone(), rec);
        Session { id, user_id }
    }

    /// Look a session up. Expired sessions are reported absent.
    pub fn session(&self, id: &str) -> Option<Session> {
        let inner = self.inner.read().expect("lock poisoned");
        let rec = inner.get(id)?;
        if rec.expires_at <= Instant::now() {
            return None;
        }
        Some(Session { id: id.to_string(), user_id: rec.user_id })
    }

    /// Slide a session's expiry forward. Returns whether it was alive.
    pub fn touch(&self, id: &str) -> bool {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.get_mut(id) {
            Some(rec) if rec.expires_at > Instant::now() => {
                rec.expires_at = Instant::now() + self.ttl;
                true
            },
            _ => false,
        }
    }

    /// Drop a session.
    pub fn delete(&self, id: &str) {
        self.inner.write().expect("lock poisoned").remove(id);
    }

    /// Reclaim expired sessions.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.inner.write().expect("lock poisoned").retain(|_, rec| rec.expires_at > now);
    }

    /// Number of stored sessions, expired ones included until `sweep`.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    /// Whether the registry holds no sessions at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_round_trip() {
        let registry = SessionRegistry::new(Duration::from_secs(60));

        let session = registry.new_session(7);
        assert_eq!(session.id.len(), 32);

        let found = registry.session(&session.id).expect("session should exist");
        assert_eq!(found.user_id, 7);
        assert!(registry.touch(&session.id));

        registry.delete(&session.id);
        assert!(registry.session(&session.id).is_none());
        assert!(!registry.touch(&session.id));
    }

    #[test]
    fn ids_are_unique() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let a = registry.new_session(1);
        let b = registry.new_session(1);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn expired_sessions_disappear() {
        let registry = SessionRegistry::new(Duration::from_millis(0));

        let session = registry.new_session(7);
        assert!(registry.session(&session.id).is_none());
        assert!(!registry.touch(&session.id));

        // Still stored until swept.
        assert_eq!(registry.len(), 1);
        registry.sweep();
        assert!(registry.is_empty());
    }
}
