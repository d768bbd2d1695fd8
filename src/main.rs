mod api;
mod config;
mod db;
mod error;
mod ical;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::db::events::ExportFilter;
use crate::db::models::EventRow;

#[derive(Parser)]
#[command(name = "shiftcal", about = "Calendar import/export service for shift workers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Create a new user
    CreateUser {
        /// Username
        #[arg(short, long)]
        username: String,
        /// Password
        #[arg(short, long)]
        password: String,
        /// Email address (optional)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// List all users
    ListUsers,

    /// Reset a user's password
    ResetPassword {
        /// Username
        #[arg(short, long)]
        username: String,
        /// New password
        #[arg(short, long)]
        password: String,
    },

    /// Import an .ics file into a user's calendar
    Import {
        /// Username of the calendar owner
        #[arg(short, long)]
        username: String,
        /// Path to the .ics file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export a user's calendar as .ics
    Export {
        /// Username of the calendar owner
        #[arg(short, long)]
        username: String,
        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Range start, epoch seconds
        #[arg(long)]
        from: Option<i64>,
        /// Range end, epoch seconds
        #[arg(long)]
        to: Option<i64>,
        /// Comma-separated event type IDs
        #[arg(long)]
        event_types: Option<String>,
    },

    /// Decode an .ics file and print the records and skipped input as JSON
    Inspect {
        /// Path to the .ics file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    match command {
        Commands::Serve => run_server().await,
        Commands::CreateUser {
            username,
            password,
            email,
        } => cmd_create_user(&username, &password, email.as_deref()).await,
        Commands::ListUsers => cmd_list_users().await,
        Commands::ResetPassword { username, password } => {
            cmd_reset_password(&username, &password).await
        }
        Commands::Import { username, file } => cmd_import(&username, &file).await,
        Commands::Export {
            username,
            output,
            from,
            to,
            event_types,
        } => {
            let filter = ExportFilter {
                from_ts: from,
                to_ts: to,
                event_types: match event_types.as_deref() {
                    Some(ids) => api::export::parse_event_types(ids)?,
                    None => Vec::new(),
                },
            };
            cmd_export(&username, output.as_deref(), &filter).await
        }
        Commands::Inspect { file } => cmd_inspect(&file).await,
    }
}

/// Start the HTTP server.
async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        port = config.port,
        import_max_bytes = config.import_max_bytes,
        "Starting calendar server"
    );

    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database initialized");

    let app = api::router(api::AppState {
        pool,
        import_max_bytes: config.import_max_bytes,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Helper: init a DB pool from env for CLI commands.
async fn cli_pool() -> anyhow::Result<sqlx::SqlitePool> {
    let config = config::Config::from_env()?;
    Ok(db::init_pool(&config.database_url).await?)
}

/// Look up a user or fail with a readable message.
async fn require_user(pool: &sqlx::SqlitePool, username: &str) -> anyhow::Result<db::models::User> {
    db::users::get_user_by_username(pool, username)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User '{username}' not found"))
}

/// Create a new user.
async fn cmd_create_user(
    username: &str,
    password: &str,
    email: Option<&str>,
) -> anyhow::Result<()> {
    let pool = cli_pool().await?;
    let user = db::users::create_user(&pool, username, email, password).await?;
    println!("User created:");
    println!("  ID:       {}", user.id);
    println!("  Username: {}", user.username);
    if let Some(ref e) = user.email {
        println!("  Email:    {e}");
    }
    Ok(())
}

/// List all users.
async fn cmd_list_users() -> anyhow::Result<()> {
    let pool = cli_pool().await?;
    let users = db::users::list_users(&pool).await?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("{:<38} {:<20} Email", "ID", "Username");
    println!("{}", "-".repeat(70));
    for u in &users {
        println!(
            "{:<38} {:<20} {}",
            u.id,
            u.username,
            u.email.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Reset a user's password.
async fn cmd_reset_password(username: &str, password: &str) -> anyhow::Result<()> {
    let pool = cli_pool().await?;
    db::users::reset_password(&pool, username, password).await?;
    println!("Password updated for user '{username}'.");
    Ok(())
}

/// Import an .ics file for a user.
async fn cmd_import(username: &str, file: &std::path::Path) -> anyhow::Result<()> {
    let pool = cli_pool().await?;
    let user = require_user(&pool, username).await?;

    let text = tokio::fs::read_to_string(file).await?;
    let decoded = ical::decode_with_diagnostics(&text);
    let outcome = db::events::import_records(&pool, &user.id, &decoded.records).await;

    println!("Imported:  {}", outcome.imported);
    println!("Failed:    {}", outcome.failed);
    println!("Total:     {}", outcome.total);
    println!("Skipped:   {}", decoded.skipped.len());
    Ok(())
}

/// Export a user's events as .ics.
async fn cmd_export(
    username: &str,
    output: Option<&std::path::Path>,
    filter: &ExportFilter,
) -> anyhow::Result<()> {
    let pool = cli_pool().await?;
    let user = require_user(&pool, username).await?;

    let rows = db::events::list_for_export(&pool, &user.id, filter).await?;
    let records: Vec<_> = rows.into_iter().map(EventRow::into_record).collect();
    let text = ical::encode(&records);

    match output {
        Some(path) => {
            tokio::fs::write(path, text).await?;
            eprintln!("Wrote {} events to {}", records.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Decode an .ics file without touching the database.
async fn cmd_inspect(file: &std::path::Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file).await?;
    let decoded = ical::decode_with_diagnostics(&text);
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}
