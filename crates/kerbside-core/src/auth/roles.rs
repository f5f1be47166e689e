//! Admin role lookup against the roles table.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{AuthError, AuthResult, AuthSession, SessionPersistence, SupabaseAuthClient};
use crate::config::DashboardConfig;
use crate::models::SessionRole;
use crate::util::parse_api_error;

/// What the session gate needs from the identity side.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Auth-state change stream; the current value is the live session.
    fn auth_state(&self) -> watch::Receiver<Option<AuthSession>>;

    /// Resolve the dashboard role of a signed-in principal.
    async fn lookup_role(&self, session: &AuthSession) -> AuthResult<SessionRole>;
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewRoleRow<'a> {
    id: &'a str,
    role: &'a str,
}

/// PostgREST access to the `users` (id, role) table.
#[derive(Clone)]
pub struct SupabaseRoleDirectory {
    table_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseRoleDirectory {
    pub fn from_config(config: &DashboardConfig) -> AuthResult<Self> {
        let anon_key = config.supabase_anon_key.trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }
        Ok(Self {
            table_url: format!("{}/{}", config.rest_url(), config.roles_table),
            anon_key,
            client: Client::builder().timeout(config.http_timeout).build()?,
        })
    }

    /// Role name stored for `user_id`, if a row exists.
    pub async fn role_name(&self, session: &AuthSession, user_id: &str) -> AuthResult<Option<String>> {
        let response = self
            .client
            .get(&self.table_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
            .query(&[
                ("select", "role".to_string()),
                ("id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        let rows = response.json::<Vec<RoleRow>>().await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }

    /// Insert a role row for a newly signed-up user.
    pub async fn register_role(
        &self,
        session: &AuthSession,
        user_id: &str,
        role: &str,
    ) -> AuthResult<()> {
        let user_id = user_id.trim();
        let role = role.trim();
        if user_id.is_empty() || role.is_empty() {
            return Err(AuthError::Api("User ID and role are required".to_string()));
        }

        let response = self
            .client
            .post(&self.table_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Prefer", "return=minimal")
            .json(&[NewRoleRow { id: user_id, role }])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(())
    }
}

/// Supabase-backed identity: auth client for sessions, roles table for roles.
#[derive(Clone)]
pub struct SupabaseIdentity<S: SessionPersistence> {
    auth: SupabaseAuthClient<S>,
    roles: SupabaseRoleDirectory,
}

impl<S: SessionPersistence> SupabaseIdentity<S> {
    pub const fn new(auth: SupabaseAuthClient<S>, roles: SupabaseRoleDirectory) -> Self {
        Self { auth, roles }
    }

    pub const fn auth(&self) -> &SupabaseAuthClient<S> {
        &self.auth
    }

    pub const fn roles(&self) -> &SupabaseRoleDirectory {
        &self.roles
    }
}

#[async_trait]
impl<S: SessionPersistence> IdentityProvider for SupabaseIdentity<S> {
    fn auth_state(&self) -> watch::Receiver<Option<AuthSession>> {
        self.auth.auth_state()
    }

    async fn lookup_role(&self, session: &AuthSession) -> AuthResult<SessionRole> {
        let role = self.roles.role_name(session, &session.user.id).await?;
        Ok(SessionRole::from_role_name(role.as_deref()))
    }
}
