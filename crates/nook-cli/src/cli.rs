use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "nook")]
#[command(about = "Offline-first notes that sync with your notes server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Account to operate on (defaults to the active account)
    #[arg(long, global = true, value_name = "NAME")]
    pub account: Option<String>,

    /// Quick capture: nook "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content
        content: Vec<String>,
        /// Explicit title (defaults to the first content line)
        #[arg(long)]
        title: Option<String>,
        /// Slash-delimited category path
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List notes, favorites first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only notes in this category or below it
        #[arg(short, long)]
        category: Option<String>,
        /// Only favorite notes
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search notes by title and content
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replace the content without opening an editor
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete notes (removed from the server on the next sync)
    Delete {
        /// Note IDs or unique ID prefixes
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Toggle the favorite flag of a note
    Favorite {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Move a note to a category, or clear it when no path is given
    Category {
        /// Note ID or unique ID prefix
        id: String,
        /// Slash-delimited category path
        path: Option<String>,
    },
    /// List categories with note counts
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show notes waiting to be synced
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Synchronize the account with its notes server
    Sync {
        /// Treat the current network as metered
        #[arg(long)]
        metered: bool,
        /// Treat the network as unavailable
        #[arg(long)]
        offline: bool,
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
        /// Keep syncing in the background every SECS seconds (settings interval when omitted)
        #[arg(long, value_name = "SECS")]
        watch: Option<Option<u64>>,
    },
    /// Manage notes server accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Show or change sync settings
    Settings {
        /// Only sync on unmetered networks
        #[arg(long, value_name = "BOOL")]
        unmetered_only: Option<bool>,
        /// Enable background sync
        #[arg(long, value_name = "BOOL")]
        background: Option<bool>,
        /// Background sync interval in seconds
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Add or update an account
    Add {
        /// Account name
        name: String,
        /// Notes server base URL, e.g. https://cloud.example.com
        #[arg(long, value_name = "URL")]
        server: String,
        /// Login name on the server
        #[arg(long)]
        username: String,
        /// Password or app token, stored in the system keychain
        #[arg(long)]
        password: Option<String>,
        /// Keep the current active account
        #[arg(long)]
        no_activate: bool,
    },
    /// Make an account the active one
    Use {
        /// Account name
        name: String,
    },
    /// List configured accounts
    List,
    /// Remove an account and its stored password
    Remove {
        /// Account name
        name: String,
    },
}
