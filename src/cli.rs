use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line client for the HealthCRM backend
#[derive(Parser)]
#[command(name = "healthcrm", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "HEALTHCRM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Revoke the refresh token and forget the session
    Logout,

    /// Show the stored session (tokens redacted)
    Whoami,

    /// Select the tenant sent with every request
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },

    /// Send an authenticated request and print the payload
    Request {
        /// HTTP method, e.g. GET or PUT
        method: String,
        /// Path below the API base URL, e.g. /v1/health/customers/5
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Manage reminders attached to a record
    Reminders {
        #[command(subcommand)]
        command: ReminderCommands,
    },
}

#[derive(Subcommand)]
pub enum TenantCommands {
    /// Use this tenant id from now on
    Set { tenant_id: String },
    /// Stop sending a tenant id
    Clear,
}

#[derive(Subcommand)]
pub enum ReminderCommands {
    /// List reminders of a record
    List {
        #[arg(long)]
        relation_id: String,
        #[arg(long, default_value = "customer")]
        relation_type: String,
    },
    /// Make the record's reminders match a JSON file (array of reminders)
    Sync {
        #[arg(long)]
        relation_id: String,
        #[arg(long, default_value = "customer")]
        relation_type: String,
        #[arg(long)]
        file: PathBuf,
        /// Print the planned operations without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark a reminder as done
    Complete {
        id: String,
        /// Mark it as not done instead
        #[arg(long)]
        undo: bool,
    },
}
