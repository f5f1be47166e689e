use kerbside_core::auth::{SessionPersistence, SupabaseRoleDirectory};
use kerbside_core::SessionRole;

use crate::auth::{auth_client, AuthSession, SessionStore};
use crate::cli::AuthCommands;
use crate::commands::common::{load_config, restore_signed_in};
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands) -> Result<(), CliError> {
    let config = load_config()?;
    match command {
        AuthCommands::Login { email, password } => {
            let client = auth_client(&config).map_err(|error| CliError::Auth(error.to_string()))?;
            let session = client
                .sign_in(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let role = resolve_role(&SupabaseRoleDirectory::from_config(&config), &session).await;
            println!("Signed in as {} (role: {role})", email_label(&session));
            Ok(())
        }
        AuthCommands::Status => {
            let client = auth_client(&config).map_err(|error| CliError::Auth(error.to_string()))?;
            let session = client
                .restore_session()
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let Some(session) = session else {
                println!("Not signed in to {}", config.supabase_url);
                return Ok(());
            };
            let role = resolve_role(&SupabaseRoleDirectory::from_config(&config), &session).await;
            println!(
                "Signed in to {} as {} (role: {role}, expires_at={})",
                config.supabase_url,
                email_label(&session),
                session.expires_at
            );
            Ok(())
        }
        AuthCommands::Logout => {
            let store = SessionStore::for_project(&config.supabase_url);
            let stored = store
                .load_session()
                .map_err(|error| CliError::Auth(error.to_string()))?;
            if let Some(session) = stored {
                let client =
                    auth_client(&config).map_err(|error| CliError::Auth(error.to_string()))?;
                if let Err(error) = client.sign_out(&session.access_token).await {
                    tracing::warn!("Remote sign-out failed, clearing local session: {}", error);
                    store
                        .clear_session()
                        .map_err(|error| CliError::Auth(error.to_string()))?;
                }
            }
            println!("Signed out of {}", config.supabase_url);
            Ok(())
        }
        AuthCommands::GrantRole { user_id, role } => {
            let client = restore_signed_in(&config).await?;
            let session = client.current_session().ok_or(CliError::NotSignedIn)?;
            let directory = SupabaseRoleDirectory::from_config(&config)
                .map_err(|error| CliError::Auth(error.to_string()))?;
            directory
                .register_role(&session, &user_id, &role)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            println!("Granted role '{}' to {}", role.trim(), user_id.trim());
            Ok(())
        }
    }
}

/// Role as the dashboard would see it; lookup failures read as `none`.
async fn resolve_role<E: std::fmt::Display>(
    directory: &Result<SupabaseRoleDirectory, E>,
    session: &AuthSession,
) -> SessionRole {
    let Ok(directory) = directory else {
        return SessionRole::None;
    };
    match directory.role_name(session, &session.user.id).await {
        Ok(name) => SessionRole::from_role_name(name.as_deref()),
        Err(error) => {
            tracing::warn!("Role lookup failed: {}", error);
            SessionRole::None
        }
    }
}

pub fn email_label(session: &AuthSession) -> &str {
    session.user.email.as_deref().unwrap_or("(no email)")
}
