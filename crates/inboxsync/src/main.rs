//! inboxsync: inbox notifications from the command line
//!
//! Subcommands:
//! - `list`: load once and print notifications
//! - `watch`: keep polling and print the unread count as it changes
//! - `mark-read`, `mark-all-read`: mark notifications as read
//! - `delete`, `delete-all`: delete notifications

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "inboxsync")]
#[command(about = "Sync and manage inbox notifications", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the API lives and how to sync with it.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// API base URL
    #[arg(long, env = "INBOXSYNC_BASE_URL")]
    pub base_url: String,

    /// Bearer token
    #[arg(long, env = "INBOXSYNC_TOKEN", hide_env_values = true)]
    pub token: String,

    /// TOML file with poll and retry settings
    #[arg(long, env = "INBOXSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Poll interval in seconds (overrides the config file)
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load notifications once and print them
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Poll in the foreground and print the unread count when it changes
    Watch,

    /// Mark one notification as read
    MarkRead {
        /// Inbox notification id
        id: String,
    },

    /// Mark every notification as read
    MarkAllRead,

    /// Delete one notification
    Delete {
        /// Inbox notification id
        id: String,
    },

    /// Delete every notification
    DeleteAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "inboxsync=info,inboxsync_core=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let context = commands::connect(&cli.connection)?;

    let result = match cli.command {
        Commands::List { json, unread } => commands::list(&context, json, unread).await,
        Commands::Watch => commands::watch(&context).await,
        Commands::MarkRead { id } => commands::mark_read(&context, &id).await,
        Commands::MarkAllRead => commands::mark_all_read(&context).await,
        Commands::Delete { id } => commands::delete(&context, &id).await,
        Commands::DeleteAll => commands::delete_all(&context).await,
    };

    context.shutdown();
    result
}
