//! Session gate: follows auth-state changes and publishes the session role.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{AuthSession, IdentityProvider};
use crate::models::SessionRole;

/// Publishes [`SessionRole`] for the current principal.
///
/// The role starts as `Unknown`. Every auth-state change re-runs the role
/// lookup, not just the session check, since a role can change under a live
/// session. A signed-out state maps to `None` at once; a failed lookup also
/// maps to `None`. While a later lookup is in flight the last role stays
/// published, unless the principal signs out first; that drops the lookup.
pub struct SessionGate {
    role: watch::Receiver<SessionRole>,
    task: JoinHandle<()>,
}

impl SessionGate {
    pub fn spawn(identity: Arc<dyn IdentityProvider>) -> Self {
        let (sender, role) = watch::channel(SessionRole::Unknown);
        let task = tokio::spawn(follow_auth_state(identity, sender));
        Self { role, task }
    }

    pub fn role(&self) -> SessionRole {
        *self.role.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionRole> {
        self.role.clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_auth_state(identity: Arc<dyn IdentityProvider>, roles: watch::Sender<SessionRole>) {
    let mut auth_state = identity.auth_state();
    loop {
        let session = auth_state.borrow_and_update().clone();
        let role = match session.as_ref() {
            None => SessionRole::None,
            Some(session) => tokio::select! {
                biased;
                changed = auth_state.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Auth state source closed; session gate stopping");
                        break;
                    }
                    // Superseded; the stale lookup is dropped and the newer state resolved.
                    continue;
                }
                role = resolve_role(identity.as_ref(), session) => role,
            },
        };

        roles.send_if_modified(|current| {
            if *current == role {
                return false;
            }
            tracing::info!("Session role changed: {} -> {}", current, role);
            *current = role;
            true
        });

        if auth_state.changed().await.is_err() {
            tracing::debug!("Auth state source closed; session gate stopping");
            break;
        }
    }
}

async fn resolve_role(identity: &dyn IdentityProvider, session: &AuthSession) -> SessionRole {
    match identity.lookup_role(session).await {
        Ok(role) => role,
        Err(error) => {
            tracing::warn!(
                "Role lookup failed for user {}; treating as non-admin: {}",
                session.user.id,
                error
            );
            SessionRole::None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::{AuthError, AuthResult, AuthUser};

    struct FakeIdentity {
        state: watch::Sender<Option<AuthSession>>,
        roles: Mutex<HashMap<String, AuthResult<SessionRole>>>,
        stall_lookups: AtomicBool,
    }

    impl FakeIdentity {
        fn new() -> Arc<Self> {
            let (state, _) = watch::channel(None);
            Arc::new(Self {
                state,
                roles: Mutex::new(HashMap::new()),
                stall_lookups: AtomicBool::new(false),
            })
        }

        fn set_role(&self, user_id: &str, role: AuthResult<SessionRole>) {
            self.roles.lock().unwrap().insert(user_id.to_string(), role);
        }

        fn sign_in(&self, user_id: &str) {
            self.state.send_replace(Some(AuthSession {
                access_token: format!("token-{user_id}"),
                refresh_token: "refresh".to_string(),
                expires_at: i64::MAX,
                user: AuthUser {
                    id: user_id.to_string(),
                    email: None,
                },
            }));
        }

        fn sign_out(&self) {
            self.state.send_replace(None);
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn auth_state(&self) -> watch::Receiver<Option<AuthSession>> {
            self.state.subscribe()
        }

        async fn lookup_role(&self, session: &AuthSession) -> AuthResult<SessionRole> {
            if self.stall_lookups.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            match self.roles.lock().unwrap().get(&session.user.id) {
                Some(Ok(role)) => Ok(*role),
                Some(Err(error)) => Err(AuthError::Api(error.to_string())),
                None => Ok(SessionRole::None),
            }
        }
    }

    async fn wait_for(role: &mut watch::Receiver<SessionRole>, expected: SessionRole) {
        role.wait_for(|current| *current == expected).await.unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signed_out_principal_is_not_admin() {
        let identity = FakeIdentity::new();
        let gate = SessionGate::spawn(identity.clone());
        let mut role = gate.subscribe();

        wait_for(&mut role, SessionRole::None).await;
        assert_eq!(gate.role(), SessionRole::None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_in_and_sign_out_flip_admin_role() {
        let identity = FakeIdentity::new();
        identity.set_role("alice", Ok(SessionRole::Admin));
        let gate = SessionGate::spawn(identity.clone());
        let mut role = gate.subscribe();
        wait_for(&mut role, SessionRole::None).await;

        identity.sign_in("alice");
        wait_for(&mut role, SessionRole::Admin).await;

        identity.sign_out();
        wait_for(&mut role, SessionRole::None).await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn role_is_looked_up_again_on_every_auth_change() {
        let identity = FakeIdentity::new();
        identity.set_role("alice", Ok(SessionRole::Admin));
        identity.sign_in("alice");
        let gate = SessionGate::spawn(identity.clone());
        let mut role = gate.subscribe();
        wait_for(&mut role, SessionRole::Admin).await;

        // Same user, refreshed token, role revoked in the meantime.
        identity.set_role("alice", Ok(SessionRole::None));
        identity.sign_in("alice");
        wait_for(&mut role, SessionRole::None).await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lookup_failure_fails_closed() {
        let identity = FakeIdentity::new();
        identity.set_role("mallory", Err(AuthError::Api("boom".to_string())));
        identity.sign_in("mallory");
        let gate = SessionGate::spawn(identity.clone());
        let mut role = gate.subscribe();

        wait_for(&mut role, SessionRole::None).await;
        assert!(!gate.role().is_admin());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_out_during_pending_lookup_drops_admin_at_once() {
        let identity = FakeIdentity::new();
        identity.set_role("alice", Ok(SessionRole::Admin));
        identity.sign_in("alice");
        let gate = SessionGate::spawn(identity.clone());
        let mut role = gate.subscribe();
        wait_for(&mut role, SessionRole::Admin).await;

        // Token refresh starts a lookup that never answers.
        identity.stall_lookups.store(true, Ordering::SeqCst);
        identity.sign_in("alice");
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.role(), SessionRole::Admin);

        identity.sign_out();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            wait_for(&mut role, SessionRole::None),
        )
        .await
        .unwrap();
    }
}
