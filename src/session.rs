use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::auth::{AuthorizationRequest, Flow as AuthFlow, Session as AuthSession};
use crate::reddit::TokenProvider;
use crate::storage::Store;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("stored token could not be read: {0}")]
    CorruptToken(String),
}

/// Owns the signed-in session. At most one account is signed in at a time.
pub struct Manager {
    store: Arc<Store>,
    flow: Arc<AuthFlow>,
    active: RwLock<Option<AuthSession>>,
}

impl Manager {
    pub fn new(store: Arc<Store>, flow: Arc<AuthFlow>) -> Self {
        Self {
            store,
            flow,
            active: RwLock::new(None),
        }
    }

    /// Restores the session from the stored token, if any. A token that
    /// cannot be decoded is discarded so the user is sent to sign in again.
    pub fn load_existing(&self) -> Result<Option<AuthSession>> {
        let stored = match self.store.load_token() {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(error = %err, "discarding unreadable stored token");
                self.store.clear_token()?;
                return Err(SessionError::CorruptToken(format!("{err:#}")).into());
            }
        };
        let session = self.flow.resume(stored)?;
        info!(user = %session.username, "resumed session");
        *self.active.write() = Some(session.clone());
        Ok(Some(session))
    }

    pub fn active(&self) -> Option<AuthSession> {
        self.active.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn begin_login(&self) -> Result<AuthorizationRequest> {
        self.flow.begin()
    }

    pub fn complete_login(&self, authz: AuthorizationRequest) -> Result<AuthSession> {
        let session = self.flow.complete(authz)?;
        *self.active.write() = Some(session.clone());
        Ok(session)
    }

    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        if !self.is_signed_in() {
            return Err(SessionError::NotSignedIn.into());
        }
        Ok(self.flow.token_provider())
    }

    /// Forgets the session and deletes the stored token.
    pub fn logout(&self) -> Result<()> {
        let previous = self.active.write().take();
        let removed = self.store.clear_token()?;
        info!(
            user = previous.as_ref().map(|s| s.username.as_str()).unwrap_or(""),
            removed,
            "logged out"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Config;
    use crate::storage::StoredToken;
    use chrono::Utc;

    fn manager() -> (Manager, Arc<Store>) {
        let store = Arc::new(Store::in_memory().unwrap());
        let flow = AuthFlow::new(
            store.clone(),
            Config {
                client_id: "client".into(),
                ..Config::default()
            },
        )
        .unwrap();
        (Manager::new(store.clone(), Arc::new(flow)), store)
    }

    fn stored() -> StoredToken {
        StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            token_type: "bearer".into(),
            scope: Vec::new(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            username: "ferris".into(),
        }
    }

    #[test]
    fn starts_signed_out_without_token() {
        let (manager, _) = manager();
        assert!(manager.load_existing().unwrap().is_none());
        assert!(!manager.is_signed_in());
        let err = manager.token_provider().err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NotSignedIn)
        ));
    }

    #[test]
    fn resumes_stored_token() {
        let (manager, store) = manager();
        store.save_token(&stored()).unwrap();
        let session = manager.load_existing().unwrap().unwrap();
        assert_eq!(session.username, "ferris");
        assert!(!session.token.scope.is_empty());
        assert_eq!(
            manager.token_provider().unwrap().token().unwrap().access_token,
            "access"
        );
    }

    #[test]
    fn logout_deletes_secret() {
        let (manager, store) = manager();
        store.save_token(&stored()).unwrap();
        manager.load_existing().unwrap();
        manager.logout().unwrap();
        assert!(!manager.is_signed_in());
        assert!(store.load_token().unwrap().is_none());
        assert!(store.secret_names().unwrap().is_empty());
    }

    #[test]
    fn corrupt_token_is_discarded() {
        let (manager, store) = manager();
        store
            .put_secret(crate::storage::ACCESS_TOKEN_SECRET, "not json")
            .unwrap();
        assert!(manager.load_existing().is_err());
        assert!(store.load_token().unwrap().is_none());
    }
}
