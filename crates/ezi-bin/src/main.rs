//! ezi-session - command-line front end for the ezi session core.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ezi_auth::{AuthBackend, SessionManager};
use ezi_config_and_utils::{init_logging, Config, Paths};
use ezi_storage::create_credential_store;
use output::OutputFormat;

/// ezi session command-line interface.
#[derive(Parser)]
#[command(name = "ezi-session")]
#[command(about = "Manage the ezi login session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Base directory for config and credentials. Defaults to ~/.ezi
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Email address (prompted for when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and log in
    Signup {
        /// Full name (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Email address (prompted for when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Logout and clear the persisted session
    Logout,
    /// Show the current session
    Status,
    /// Check the session against the backend, refreshing if needed
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let store = create_credential_store(&paths.credentials_file());
    let backend = AuthBackend::new(config.backend_url.clone());
    let manager = SessionManager::new(store, backend);
    manager.bootstrap().await?;

    let code = match cli.command {
        Commands::Login { email } => commands::login(&manager, email, &cli.format).await?,
        Commands::Signup { name, email } => {
            commands::signup(&manager, name, email, &cli.format).await?
        }
        Commands::Logout => commands::logout(&manager, &cli.format).await?,
        Commands::Status => commands::status(&manager, &cli.format)?,
        Commands::Validate => commands::validate(&manager, &cli.format).await?,
    };

    std::process::exit(code);
}
