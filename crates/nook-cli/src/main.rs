//! nook CLI - offline-first notes from the command line
//!
//! Notes are written to a local database and synchronized with a notes server
//! on `nook sync`.

mod accounts;
mod cli;
mod commands;
mod credentials;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::account::run_account;
use crate::commands::add::run_add;
use crate::commands::category::{run_categories, run_set_category};
use crate::commands::common::StoreTarget;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::favorite::run_favorite;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::settings::{run_settings, SettingsChange};
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, SyncOptions};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nook=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Account { command }) => run_account(command),
        Some(Commands::Completions { shell, output }) => run_completions(shell, output.as_deref()),
        Some(command) => {
            let target = StoreTarget::resolve(cli.db_path, cli.account.as_deref())?;
            run_store_command(command, &target).await
        }
        None => {
            // Quick capture mode: nook "my note"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
                Ok(())
            } else {
                let target = StoreTarget::resolve(cli.db_path, cli.account.as_deref())?;
                run_add(&cli.note, None, None, &target)
            }
        }
    }
}

async fn run_store_command(command: Commands, target: &StoreTarget) -> Result<(), CliError> {
    match command {
        Commands::Add {
            content,
            title,
            category,
        } => run_add(&content, title.as_deref(), category.as_deref(), target),
        Commands::List {
            limit,
            category,
            favorites,
            json,
        } => run_list(limit, category.as_deref(), favorites, json, target),
        Commands::Search { query, limit, json } => run_search(&query, limit, json, target),
        Commands::Edit { id, content } => run_edit(&id, content.as_deref(), target),
        Commands::Delete { ids } => run_delete(&ids, target),
        Commands::Favorite { id } => run_favorite(&id, target),
        Commands::Category { id, path } => run_set_category(&id, path.as_deref(), target),
        Commands::Categories { json } => run_categories(json, target),
        Commands::Status { json } => run_status(json, target),
        Commands::Sync {
            metered,
            offline,
            json,
            watch,
        } => {
            let options = SyncOptions {
                metered,
                offline,
                as_json: json,
                watch,
            };
            run_sync(options, target).await
        }
        Commands::Settings {
            unmetered_only,
            background,
            interval,
            json,
        } => {
            let change = SettingsChange {
                unmetered_only,
                background,
                interval_secs: interval,
            };
            run_settings(change, json, target)
        }
        Commands::Account { command } => run_account(command),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
