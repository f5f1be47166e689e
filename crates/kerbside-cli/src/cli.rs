use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kerbside")]
#[command(about = "Review and approve crowd-sourced parking restrictions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authenticate with Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// List restrictions waiting for review
    Pending {
        /// Only show records whose postcode contains this text
        #[arg(long, value_name = "TEXT")]
        postcode: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every restriction
    Records {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Approve a pending restriction, optionally correcting fields
    Approve {
        /// Record ID
        id: String,
        /// Field edit, e.g. --set "Maximum Stay=2 hours" or --set postcode="NW1 6XE"
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        edits: Vec<String>,
    },
    /// Delete a restriction
    Delete {
        /// Record ID
        id: String,
    },
    /// Follow the pending queue live until interrupted
    Watch {
        /// Only show records whose postcode contains this text
        #[arg(long, value_name = "TEXT")]
        postcode: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with Supabase email/password and store session in keychain
    Login {
        /// Supabase account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Supabase account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show the signed-in user and their dashboard role
    Status,
    /// Logout and clear stored session
    Logout,
    /// Insert a role row for a user
    GrantRole {
        /// Supabase user ID
        user_id: String,
        /// Role name
        #[arg(long, default_value = "admin")]
        role: String,
    },
}
