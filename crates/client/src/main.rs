//! `campus-session`: operate the persisted campus session from a terminal.
//!
//! Usage:
//!   campus-session status
//!   campus-session login --username alice            # password from CAMPUS_PASSWORD or --password
//!   campus-session check --role ROLE_HOD --role ROLE_FACULTY
//!   campus-session menu
//!   campus-session logout
//!
//! Configuration comes from `CAMPUS_*` environment variables (see `ClientConfig`).
//! Results are printed as JSON on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use campus_auth::{SessionView, default_menu, explain, primary_role, role_set, visible_items};
use campus_client::{ClientConfig, SessionManager, SignUpRequest, SqliteTokenStore};

#[derive(Parser, Debug)]
#[command(name = "campus-session")]
#[command(about = "Manage the campus administration session")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the persisted session and print it
    Status,

    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the persisted session
    Logout,

    /// Create an account (sign in afterwards)
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        roll_number: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },

    /// Evaluate the route gate for the persisted session
    Check {
        /// Required role (repeatable). None means any signed-in user.
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Print the navigation offered to the persisted session
    Menu,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClientConfig::from_env().context("invalid CAMPUS_* configuration")?;
    campus_observability::init(&config.observability);

    let args = Args::parse();

    let db_path = config.token_db_path()?;
    let store = SqliteTokenStore::open(&db_path).await?;
    tracing::debug!(path = ?db_path, api_url = %config.api_url, "session store opened");

    let manager = SessionManager::from_config(&config, Arc::new(store));

    let output = match args.command {
        Command::Status => {
            manager.initialize().await;
            let session = manager.session();
            let primary = session
                .principal()
                .and_then(primary_role)
                .map(|r| r.display_name());
            json!({ "session": SessionView::from(&session), "primaryRole": primary })
        }
        Command::Login { username, password } => {
            manager.initialize().await;
            serde_json::to_value(manager.login(&username, &password).await)?
        }
        Command::Logout => {
            manager.logout().await;
            json!({ "status": manager.status() })
        }
        Command::Register {
            username,
            email,
            password,
            full_name,
            role,
            roll_number,
            department,
        } => {
            let request = SignUpRequest {
                username,
                email,
                password,
                full_name,
                role,
                roll_number,
                department,
            };
            serde_json::to_value(manager.register(&request).await)?
        }
        Command::Check { roles } => {
            manager.initialize().await;
            serde_json::to_value(explain(&manager.session(), &role_set(roles)))?
        }
        Command::Menu => {
            manager.initialize().await;
            let session = manager.session();
            if session.is_authenticated() {
                serde_json::to_value(visible_items(default_menu(), &session))?
            } else {
                json!([])
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
