//! sessiongate - command-line front end for an AutoFounder account session.
//!
//! Each invocation restores the stored session, runs one command through the
//! session manager and reports any forced sign-out the server caused.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessiongate_core::{
    Config, ProfileUpdate, Registration, SessionEvent, SessionManager, SessionState, UserRecord,
};

/// Directory under the cache dir for rolling log files
const LOG_DIR: &str = "logs";

const LOG_FILE_PREFIX: &str = "sessiongate.log";

#[derive(Parser)]
#[command(name = "sessiongate", version, about = "Manage your AutoFounder session")]
struct Cli {
    /// API base URL (overrides config and SESSIONGATE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user, confirming the session with the server
    Whoami,
    /// Change profile fields; unspecified fields are left alone
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        persona: Option<String>,
    },
    /// Change the account password
    ChangePassword,
    /// Check API health and show the local session state
    Status,
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr (filtered by RUST_LOG, default warn) and to a daily file
/// in the cache directory. The returned guard flushes the file on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join(LOG_DIR), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }

    let _log_guard = init_tracing(&config);
    info!(api = %config.api_base_url, storage = ?config.storage, "sessiongate starting");

    let gateway = config.gateway()?;
    let session = SessionManager::new(Arc::new(gateway))?;
    let mut events = session.events();

    session.restore();
    debug!(state = %session.state(), "Session restored");

    let result = run(&cli.command, &session, &mut config).await;

    // Tell the user if the server ended the session along the way
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::RedirectToLogin { origin } = event {
            eprintln!(
                "Your session is no longer valid ({}). Run `sessiongate login` to sign in again.",
                origin
            );
        }
    }

    result
}

async fn run(command: &Command, session: &SessionManager, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email.clone().or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;

            let user = session.login(&email, &password).await?;
            println!("Signed in as {}", user.display_name());

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
        Command::Register {
            username,
            email,
            first_name,
            last_name,
        } => {
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;
            let confirm = rpassword::prompt_password("Confirm password: ")
                .context("Failed to read password")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }

            let registration = Registration {
                username: username.clone(),
                email: email.clone(),
                password,
                first_name: first_name.clone(),
                last_name: last_name.clone(),
            };
            let user = session.register(&registration).await?;
            println!("Account created. Signed in as {}", user.display_name());
        }
        Command::Logout => {
            session.logout().await?;
            println!("Signed out");
        }
        Command::Whoami => {
            if !session.is_authenticated() {
                println!("Not signed in");
                return Ok(());
            }
            let user = session.verify().await?;
            print_user(&user);
        }
        Command::UpdateProfile {
            username,
            first_name,
            last_name,
            persona,
        } => {
            let update = ProfileUpdate {
                username: username.clone(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                persona_data: persona.clone(),
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update; pass at least one field");
            }
            let user = session.update_profile(&update).await?;
            println!("Profile updated");
            print_user(&user);
        }
        Command::ChangePassword => {
            let current = rpassword::prompt_password("Current password: ")
                .context("Failed to read password")?;
            let new = rpassword::prompt_password("New password: ")
                .context("Failed to read password")?;
            let message = session.change_password(&current, &new).await?;
            println!("{}", message);
        }
        Command::Status => {
            match session.api().health().await {
                Ok(env) => println!(
                    "API {}: {}",
                    session.api().gateway().base_url(),
                    env.message_or(if env.success { "healthy" } else { "unhealthy" })
                ),
                Err(e) => println!("API {}: unreachable ({})", session.api().gateway().base_url(), e),
            }
            match session.state() {
                SessionState::OptimisticAuthenticated(user) => {
                    println!("Session: cached for {} (not yet verified)", user.username)
                }
                state => println!("Session: {}", state),
            }
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_user(user: &UserRecord) {
    println!("  id:       {}", user.id);
    println!("  username: {}", user.username);
    println!("  name:     {}", user.display_name());
    if let Some(ref email) = user.email {
        println!("  email:    {}", email);
    }
    if let Some(ref tier) = user.subscription_tier {
        println!("  tier:     {}", tier);
    }
    if let Some(ref persona) = user.persona_data {
        println!("  persona:  {}", persona);
    }
    if let Some(created) = user.created_at {
        println!("  joined:   {}", created.format("%Y-%m-%d"));
    }
}
