use super::jwt;
use super::storage::{KeyValueStore, MemoryStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::UserProfile;
use std::sync::Arc;

const SESSION_KEY: &str = "session";
const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserProfile,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

// What goes into the durable session slot. Tokens have their own slots.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    user: UserProfile,
}

/// Identity and token slots for the signed-in user.
///
/// `durable` outlives the process, `ephemeral` does not. Access tokens only
/// ever go to `ephemeral`; refresh tokens reach `durable` only when the user
/// asked to be remembered.
#[derive(Clone)]
pub struct SessionStore {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn profile(&self) -> Option<UserProfile> {
        let raw = read_slot(self.durable.as_ref(), SESSION_KEY)?;
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) => Some(stored.user),
            Err(e) => {
                log::warn!("Ignoring malformed stored session: {}", e);
                None
            }
        }
    }

    pub fn session(&self) -> Option<Session> {
        let user = self.profile()?;
        Some(Session {
            user,
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        })
    }

    pub fn save_profile(&self, user: &UserProfile) -> Result<(), StorageError> {
        let stored = serde_json::to_string(&StoredSession { user: user.clone() })?;
        self.durable.set(SESSION_KEY, &stored)
    }

    /// Writes the tokens from a successful sign-in or sign-up.
    ///
    /// Without `remember`, any refresh token left in durable storage by an
    /// earlier remembered sign-in is purged.
    pub fn store_tokens(
        &self,
        access: Option<&str>,
        refresh: Option<&str>,
        remember: bool,
    ) -> Result<(), StorageError> {
        match access {
            Some(token) => self.ephemeral.set(ACCESS_TOKEN_KEY, token)?,
            None => self.ephemeral.remove(ACCESS_TOKEN_KEY)?,
        }

        match refresh {
            Some(token) => self.ephemeral.set(REFRESH_TOKEN_KEY, token)?,
            None => self.ephemeral.remove(REFRESH_TOKEN_KEY)?,
        }

        match (refresh, remember) {
            (Some(token), true) => self.durable.set(REFRESH_TOKEN_KEY, token)?,
            _ => self.durable.remove(REFRESH_TOKEN_KEY)?,
        }

        log::debug!(
            "Stored tokens (access: {}, refresh: {}, remembered: {})",
            access.is_some(),
            refresh.is_some(),
            remember && refresh.is_some()
        );
        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        read_slot(self.ephemeral.as_ref(), ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        read_slot(self.ephemeral.as_ref(), REFRESH_TOKEN_KEY)
            .or_else(|| self.durable_refresh_token())
    }

    pub fn durable_refresh_token(&self) -> Option<String> {
        read_slot(self.durable.as_ref(), REFRESH_TOKEN_KEY)
    }

    pub fn access_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token()
            .map(|token| jwt::is_expired(&token, now))
            .unwrap_or(true)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.durable.remove(SESSION_KEY)?;
        self.durable.remove(REFRESH_TOKEN_KEY)?;
        self.ephemeral.remove(ACCESS_TOKEN_KEY)?;
        self.ephemeral.remove(REFRESH_TOKEN_KEY)?;
        Ok(())
    }
}

fn read_slot(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            log::warn!("Failed to read {} slot: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::FileStore;
    use chrono::Duration;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use serde_json::json;

    fn profile() -> UserProfile {
        UserProfile {
            email: "jane@example.com".into(),
            fullname: "Jane Doe".into(),
        }
    }

    #[test]
    fn empty_store_has_no_session() {
        let store = SessionStore::in_memory();
        assert!(store.session().is_none());
        assert!(store.access_token_expired(Utc::now()));
    }

    #[test]
    fn malformed_snapshot_reads_as_no_session() {
        let durable = Arc::new(MemoryStore::new());
        durable.set(SESSION_KEY, "{not json").unwrap();
        let store = SessionStore::new(durable.clone(), Arc::new(MemoryStore::new()));
        assert!(store.profile().is_none());

        durable.set(SESSION_KEY, r#"{"user": {"email": 5}}"#).unwrap();
        assert!(store.session().is_none());
    }

    #[test]
    fn snapshot_holds_only_the_profile() {
        let durable = Arc::new(MemoryStore::new());
        let store = SessionStore::new(durable.clone(), Arc::new(MemoryStore::new()));
        store.save_profile(&profile()).unwrap();
        store
            .store_tokens(Some("access"), Some("refresh"), true)
            .unwrap();

        let raw = durable.get(SESSION_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({"user": {"email": "jane@example.com", "fullname": "Jane Doe"}})
        );

        let session = store.session().unwrap();
        assert_eq!(session.access_token.as_deref(), Some("access"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn remember_gates_durable_refresh_token() {
        let store = SessionStore::in_memory();
        store.store_tokens(Some("a1"), Some("r1"), true).unwrap();
        assert_eq!(store.durable_refresh_token().as_deref(), Some("r1"));

        store.store_tokens(Some("a2"), Some("r2"), false).unwrap();
        assert_eq!(store.durable_refresh_token(), None);
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert_eq!(store.access_token().as_deref(), Some("a2"));
    }

    #[test]
    fn durable_state_survives_a_restart_but_access_token_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let first_run = SessionStore::new(
            Arc::new(FileStore::new(dir.path())),
            Arc::new(MemoryStore::new()),
        );
        first_run.save_profile(&profile()).unwrap();
        first_run
            .store_tokens(Some("access"), Some("refresh"), true)
            .unwrap();

        let second_run = SessionStore::new(
            Arc::new(FileStore::new(dir.path())),
            Arc::new(MemoryStore::new()),
        );
        let session = second_run.session().unwrap();
        assert_eq!(session.user, profile());
        assert_eq!(session.access_token, None);
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn clear_removes_every_slot() {
        let store = SessionStore::in_memory();
        store.save_profile(&profile()).unwrap();
        store.store_tokens(Some("a"), Some("r"), true).unwrap();

        store.clear().unwrap();
        assert!(store.session().is_none());
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn access_token_expiry_uses_exp_claim() {
        let now = Utc::now();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"exp": (now + Duration::minutes(10)).timestamp()}),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();

        let store = SessionStore::in_memory();
        store.store_tokens(Some(&token), None, false).unwrap();
        assert!(!store.access_token_expired(now));
        assert!(store.access_token_expired(now + Duration::minutes(11)));
    }
}
