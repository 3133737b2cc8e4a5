//! opsdeck - command-line front end for the admin console session.
//!
//! Logs in against the admin backend, keeps the token in the configured
//! credential store, and prints dashboard statistics read through the
//! session-aware cache.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opsdeck_core::config::CredentialBackend;
use opsdeck_core::models::Credentials;
use opsdeck_core::{Config, Console, GetOptions, SessionState, DEFAULT_ACTIVITY_DAYS};

/// Environment variable holding the login password for non-interactive use
const ENV_PASSWORD: &str = "OPSDECK_PASSWORD";

/// Directory for daily rolling log files; logs go to stderr when unset
const ENV_LOG_DIR: &str = "OPSDECK_LOG_DIR";

#[derive(Parser)]
#[command(name = "opsdeck", version, about = "Admin console session and statistics")]
struct Cli {
    /// Backend base URL (overrides config and OPSDECK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the session is persisted
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    File,
    Keyring,
    Memory,
}

impl From<Backend> for CredentialBackend {
    fn from(b: Backend) -> Self {
        match b {
            Backend::File => CredentialBackend::File,
            Backend::Keyring => CredentialBackend::Keyring,
            Backend::Memory => CredentialBackend::Memory,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Drop the stored session
    Logout,
    /// Show the current session
    Status,
    /// Exchange the current token for a fresh one
    Refresh,
    /// Print dashboard statistics
    Stats {
        #[arg(value_enum)]
        kind: StatsKind,
        /// Activity window in days
        #[arg(long, default_value_t = DEFAULT_ACTIVITY_DAYS)]
        days: u32,
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// Keep the session alive and print state changes until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatsKind {
    Dashboard,
    Metrics,
    System,
    Activity,
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). With `OPSDECK_LOG_DIR`
/// set, output goes to a daily rolling file instead of stderr; the returned
/// guard must live until exit so buffered lines are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var_os(ENV_LOG_DIR).map(PathBuf::from) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "opsdeck.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(backend) = cli.backend {
        config.credential_backend = backend.into();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();

    let mut config = load_config(&cli)?;
    if matches!(cli.command, Command::Watch) {
        config.session.auto_refresh = true;
    }
    info!(api = %config.api_base_url, "opsdeck starting");

    let console = Console::from_config(config)?;
    let result = run(&console, cli.command).await;
    console.shutdown();
    result
}

async fn run(console: &Console, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(console, email).await,
        Command::Logout => {
            console.stats.logout();
            println!("Logged out");
            Ok(())
        }
        Command::Status => {
            let state = console.session.initialize().await;
            print_state(&state);
            Ok(())
        }
        Command::Refresh => {
            require_session(console).await?;
            let state = console.session.refresh().await.context("Refresh failed")?;
            print_state(&state);
            Ok(())
        }
        Command::Stats { kind, days, force } => {
            require_session(console).await?;
            let options = GetOptions { force_refresh: force };
            print_stats(console, kind, days, options).await
        }
        Command::Watch => watch(console).await,
    }
}

async fn login(console: &Console, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| console.config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let state = console
        .session
        .login(&Credentials::new(email.clone(), password))
        .await
        .context("Login failed")?;

    let mut config = console.config.clone();
    config.last_email = Some(email);
    config.save().context("Failed to save config")?;

    print_state(&state);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No email given");
    }
    Ok(value)
}

async fn require_session(console: &Console) -> Result<()> {
    let state = console.session.initialize().await;
    if state.status().requires_login() {
        bail!("Not logged in - run `opsdeck login` first");
    }
    Ok(())
}

fn print_state(state: &SessionState) {
    println!("Status: {}", state.status());
    if let Some(user) = state.user() {
        println!("User:   {} ({})", user.display_name(), user.role);
    }
    if let Some(minutes) = state.record().and_then(|r| r.minutes_until_expiry(Utc::now())) {
        println!("Expires in {} min", minutes);
    }
}

async fn print_stats(console: &Console, kind: StatsKind, days: u32, options: GetOptions) -> Result<()> {
    let stats = &console.stats;
    match kind {
        StatsKind::Dashboard => {
            let s = stats.dashboard_stats(options).await?;
            println!("Users:          {} ({} active, {} new today)", s.total_users, s.active_users, s.new_users_today);
            println!("Requests:       {}", s.total_requests);
            println!("Error rate:     {:.2}%", s.error_rate * 100.0);
        }
        StatsKind::Metrics => {
            let m = stats.system_metrics(options).await?;
            println!("CPU:            {:.1}%", m.cpu_usage);
            println!("Memory:         {:.1}%", m.memory_usage);
            println!("Disk:           {:.1}%", m.disk_usage);
            println!("Uptime:         {}", m.uptime_display());
        }
        StatsKind::System => {
            let s = stats.system_stats(options).await?;
            println!("Version:        {}", s.version.as_deref().unwrap_or("unknown"));
            println!("Records:        {}", s.total_records);
            println!("Storage:        {} bytes", s.storage_bytes);
            println!("Queue depth:    {}", s.queue_depth);
        }
        StatsKind::Activity => {
            let a = stats.activity_stats(days, options).await?;
            println!("Last {} days: {} logins, {} actions", a.days, a.total_logins(), a.total_actions());
            for point in &a.points {
                println!("  {}  {:>6} logins  {:>6} actions", point.date, point.logins, point.actions);
            }
        }
    }
    Ok(())
}

async fn watch(console: &Console) -> Result<()> {
    let mut changes = console.session.subscribe();
    let state = console.session.initialize().await;
    print_state(&state);
    if state.status().requires_login() {
        bail!("Not logged in - run `opsdeck login` first");
    }
    changes.borrow_and_update();

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = changes.borrow_and_update().clone();
                println!("-> {}", state.status());
                if state.status().requires_login() {
                    bail!("Session ended ({})", state.status());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                break;
            }
        }
    }
    Ok(())
}
