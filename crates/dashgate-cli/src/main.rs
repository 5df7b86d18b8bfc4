//! Dashgate CLI - sign in to the dashboard backend and use the session.
//!
//! The CLI keeps its session in the user cache directory as an encrypted
//! envelope and opens it on every command that talks to the backend.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dashgate_core::auth::{
    sign_out, CredentialStore, FileSessionStore, SessionGuard, SessionStore, SignIn,
};
use dashgate_core::{
    AuthorizedSession, BackendClient, Config, EnvelopeCodec, Resource, Role, SecretKey,
};

#[derive(Parser)]
#[command(name = "dashgate", version, about = "Admin dashboard session and backend access")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a freshly generated envelope key for DASHGATE_ENVELOPE_KEY
    Keygen,
    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands that work with the stored session
#[derive(Subcommand)]
enum SessionCommand {
    /// Sign in and store an encrypted session
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// End the session and forget any remembered password
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Print the backend access token held by the session
    Token,
    /// List a collection: users, products, orders, or categories
    List { resource: String },
    /// Fetch a single record from a collection
    Get { resource: String, id: String },
    /// Download a file through the backend file service
    File {
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen => {
            println!("{}", SecretKey::generate().to_encoded());
            Ok(())
        }
        Command::Session(command) => run(command).await,
    }
}

async fn run(command: SessionCommand) -> Result<()> {
    let mut config = Config::load()?;
    let store = FileSessionStore::new(config.cache_dir()?);
    let backend = BackendClient::new(&config.backend_url)?;
    debug!(backend_url = %config.backend_url, "Configuration loaded");

    match command {
        SessionCommand::Login { email, remember } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt_line("Email: ")?,
            };
            let password = if remember && CredentialStore::has_credentials(&email) {
                CredentialStore::get_password(&email)?
            } else {
                rpassword::prompt_password("Password: ").context("Failed to read password")?
            };

            let codec = load_codec()?;
            let user = SignIn::new(&backend, &codec, &store, config.session_max_age_minutes)
                .sign_in(&email, &password)
                .await?;

            if remember {
                CredentialStore::store(&email, &password)?;
            }
            config.last_email = Some(email);
            config.save()?;

            println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
        }
        SessionCommand::Logout => {
            sign_out(&store, config.last_email.as_deref())?;
            println!("Signed out");
        }
        SessionCommand::Whoami => {
            let codec = load_codec()?;
            let session = authorize(&codec, &store)?;
            let user = session.user();
            println!("{} <{}>", user.name, user.email);
            println!("id:   {}", user.id);
            println!("role: {}", user.role);
            if let Some(claims) = store.load()? {
                println!("expires in {} minutes", claims.minutes_until_expiry());
            }
        }
        SessionCommand::Token => {
            let codec = load_codec()?;
            let session = authorize(&codec, &store)?;
            println!("{}", session.access_token());
        }
        SessionCommand::List { resource } => {
            let resource = parse_resource(&resource)?;
            let codec = load_codec()?;
            let session = authorize(&codec, &store)?;
            require_role_for(&session, resource)?;

            let records = backend.for_session(&session).list(resource).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        SessionCommand::Get { resource, id } => {
            let resource = parse_resource(&resource)?;
            let codec = load_codec()?;
            let session = authorize(&codec, &store)?;
            require_role_for(&session, resource)?;

            let record = backend.for_session(&session).get(resource, &id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SessionCommand::File { path, output } => {
            let codec = load_codec()?;
            let session = authorize(&codec, &store)?;
            let file = backend.for_session(&session).fetch_file(&path).await?;

            match output {
                Some(output) => {
                    std::fs::write(&output, &file.bytes)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    info!(path = %output.display(), content_type = %file.content_type, "Saved file");
                    eprintln!("Saved {} bytes ({}) to {}", file.bytes.len(), file.content_type, output.display());
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&file.bytes)?;
                    stdout.flush()?;
                }
            }
        }
    }

    Ok(())
}

/// Envelope keys are only required by commands that seal or open a session
fn load_codec() -> Result<EnvelopeCodec> {
    EnvelopeCodec::from_env().context("Envelope key is not configured")
}

/// Open the stored session, reporting only the public message on failure
fn authorize(codec: &EnvelopeCodec, store: &dyn SessionStore) -> Result<AuthorizedSession> {
    SessionGuard::new(codec, store)
        .authorize()
        .map_err(|e| anyhow::anyhow!(e.public_message()))
}

/// Managing users is reserved for admins; other collections need any signed-in user
fn require_role_for(session: &AuthorizedSession, resource: Resource) -> Result<()> {
    let required = match resource {
        Resource::Users => Role::Admin,
        _ => Role::User,
    };
    session
        .require_role(required)
        .map_err(|e| anyhow::anyhow!(e.public_message()))?;
    Ok(())
}

fn parse_resource(name: &str) -> Result<Resource> {
    Resource::parse(name).ok_or_else(|| {
        let known: Vec<&str> = Resource::ALL.iter().map(|r| r.path()).collect();
        anyhow::anyhow!("Unknown resource {:?}, expected one of: {}", name, known.join(", "))
    })
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        anyhow::bail!("No input provided");
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logout_takes_no_arguments() {
        let cli = Cli::try_parse_from(["dashgate", "logout"]).unwrap();
        assert!(matches!(cli.command, Command::Session(SessionCommand::Logout)));
    }

    #[test]
    fn test_parse_session_commands() {
        let cli = Cli::try_parse_from(["dashgate", "get", "orders", "o-17"]).unwrap();
        match cli.command {
            Command::Session(SessionCommand::Get { resource, id }) => {
                assert_eq!(resource, "orders");
                assert_eq!(id, "o-17");
            }
            _ => panic!("expected get command"),
        }

        let cli = Cli::try_parse_from(["dashgate", "login", "--email", "ann@example.com"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Session(SessionCommand::Login { remember: false, .. })
        ));
        assert!(Cli::try_parse_from(["dashgate", "list"]).is_err());
    }

    #[test]
    fn test_parse_resource() {
        assert_eq!(parse_resource("orders").unwrap(), Resource::Orders);
        let err = parse_resource("invoices").unwrap_err().to_string();
        assert!(err.contains("users, products, orders, categories"));
    }
}
