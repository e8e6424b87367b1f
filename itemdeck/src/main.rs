//! # itemdeck
//!
//! Command-line client for the Itemdeck items API: register, log in, and
//! manage your items from the terminal.
//!
//! ## Architecture
//!
//! - **Session store**: `user`/`token`/`is_loading`/`error` state with login,
//!   register, logout, and identity refresh
//! - **Request gateway**: single `reqwest` client that injects the stored
//!   bearer token on every request and intercepts 401 responses
//! - **Token store**: one-file durable slot holding the raw token, mode 600

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod api;
mod config;
mod session;
mod token;
mod types;


use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiClient, ApiError, SessionEvent};
use crate::config::{AppConfig, Cli, Command, ItemsAction};
use crate::session::SessionStore;
use crate::token::{FileTokenStore, TokenStore};
use crate::types::Item;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("failed to load configuration")?;
    info!(
        api_url = %config.api_url,
        token_file = %config.token_file.display(),
        timeout = %humantime::format_duration(config.timeout),
        "configuration loaded"
    );

    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_file.clone()));
    let api = ApiClient::new(config.api_url.clone(), config.timeout, Arc::clone(&tokens))
        .context("failed to build HTTP client")?;
    let mut session_events = api.subscribe();
    let store = SessionStore::new(api.clone(), tokens);

    let outcome = run_command(cli.command, &api, &store).await;

    if session_invalidated(&mut session_events) {
        eprintln!("Session expired or was rejected; run `itemdeck login` to sign in again.");
    }

    Ok(outcome)
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

async fn run_command(command: Command, api: &ApiClient, store: &SessionStore) -> ExitCode {
    match command {
        Command::Register {
            email,
            name,
            password,
            confirm_password,
        } => {
            if password != confirm_password {
                eprintln!("Passwords do not match");
                return ExitCode::FAILURE;
            }
            match store.register(&email, &name, &password).await {
                Ok(()) => {
                    report_identity(store, "registered").await;
                    ExitCode::SUCCESS
                }
                Err(e) => auth_failure(store, &e).await,
            }
        }
        Command::Login { email, password } => match store.login(&email, &password).await {
            Ok(()) => {
                report_identity(store, "logged in").await;
                ExitCode::SUCCESS
            }
            Err(e) => auth_failure(store, &e).await,
        },
        Command::Logout => match store.logout().await {
            Ok(()) => {
                println!("Logged out.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "logout failed");
                eprintln!("Failed to log out");
                ExitCode::FAILURE
            }
        },
        Command::Whoami => {
            store.refresh_current_user().await;
            let session = store.snapshot().await;
            match session.user {
                Some(user) => {
                    println!("{} <{}> (id {})", user.name, user.email, user.id);
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("Not logged in.");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Items { action } => run_items(action, api).await,
        Command::Health => match api.health().await {
            Ok(payload) => {
                println!("{payload}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "health check failed");
                eprintln!("API is unreachable");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_items(action: ItemsAction, api: &ApiClient) -> ExitCode {
    match action {
        ItemsAction::List => match api.list_items().await {
            Ok(items) if items.is_empty() => {
                println!("No items yet. Create one to get started!");
                ExitCode::SUCCESS
            }
            Ok(items) => {
                for item in &items {
                    print_item(item);
                }
                ExitCode::SUCCESS
            }
            Err(e) => resource_failure(&e, "Failed to load items"),
        },
        ItemsAction::Get { id } => match api.get_item(&id).await {
            Ok(item) => {
                print_item(&item);
                ExitCode::SUCCESS
            }
            Err(e) => resource_failure(&e, "Failed to load items"),
        },
        ItemsAction::Create { title, description } => {
            match api.create_item(&title, &description).await {
                Ok(item) => {
                    print_item(&item);
                    ExitCode::SUCCESS
                }
                Err(e) => resource_failure(&e, "Failed to create item"),
            }
        }
        ItemsAction::Update {
            id,
            title,
            description,
        } => match api.update_item(&id, &title, &description).await {
            Ok(item) => {
                print_item(&item);
                ExitCode::SUCCESS
            }
            Err(e) => resource_failure(&e, "Failed to update item"),
        },
        ItemsAction::Delete { id } => match api.delete_item(&id).await {
            Ok(()) => {
                println!("Deleted.");
                ExitCode::SUCCESS
            }
            Err(e) => resource_failure(&e, "Failed to delete item"),
        },
    }
}

/// Validation errors are shown as-is; anything else collapses to a fixed
/// message with the real cause in the logs, not on screen.
fn resource_failure(e: &ApiError, fallback: &str) -> ExitCode {
    if let ApiError::InvalidInput(message) = e {
        eprintln!("{message}");
    } else {
        error!(error = %e, "item operation failed");
        eprintln!("{fallback}");
    }
    ExitCode::FAILURE
}

async fn auth_failure(store: &SessionStore, e: &ApiError) -> ExitCode {
    error!(error = %e, "authentication failed");
    let session = store.snapshot().await;
    let message = session
        .error
        .unwrap_or_else(|| String::from("Authentication failed"));
    eprintln!("{message}");
    ExitCode::FAILURE
}

async fn report_identity(store: &SessionStore, verb: &str) {
    let session = store.snapshot().await;
    match session.user {
        Some(user) => println!("Successfully {verb} as {} <{}>", user.name, user.email),
        None => println!("Successfully {verb}; run `itemdeck whoami` to confirm your identity"),
    }
}

fn print_item(item: &Item) {
    println!("{}  {}  [{}]", item.id, item.title, item.created_at);
    if !item.description.is_empty() {
        println!("    {}", item.description);
    }
}

/// Drains the session event channel. `Lagged` means events were dropped,
/// which still implies at least one invalidation fired.
fn session_invalidated(rx: &mut broadcast::Receiver<SessionEvent>) -> bool {
    match rx.try_recv() {
        Ok(SessionEvent::SessionInvalidated) => true,
        Err(broadcast::error::TryRecvError::Lagged(_)) => true,
        Err(_) => false,
    }
}
