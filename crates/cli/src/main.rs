//! Stockroom CLI - the stock table from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept in STOCKROOM_SESSION_FILE)
//! stockroom auth login -e admin@example.com -p 'secret'
//!
//! # Show who is signed in and with which capability
//! stockroom auth whoami
//!
//! # List, add, edit and delete rows
//! stockroom stock list
//! stockroom stock add --garment "Hoodie" --size XL --quantity 4
//! stockroom stock edit 12 --quantity 3
//! stockroom stock delete 12 13 --yes
//! ```
//!
//! # Commands
//!
//! - `auth` - Sign in, register, sign out, show the current session
//! - `stock` - List and change stock rows (changes need the admin account)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use stockroom_core::StockRowId;

mod commands;

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(author, version, about = "Stockroom clothing stock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the signed-in session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Read and change stock rows
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Create a new account
    Register {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in account and its capability
    Whoami,
}

#[derive(Subcommand)]
enum StockAction {
    /// List every row, newest first
    List,
    /// Add a row
    Add {
        /// Garment name
        #[arg(short, long)]
        garment: String,

        /// Size (XS, S, M, L, XL, XXL, Unico)
        #[arg(short, long)]
        size: String,

        /// Quantity in stock
        #[arg(short, long)]
        quantity: String,
    },
    /// Edit a row; omitted fields keep their current value
    Edit {
        /// Row id
        id: StockRowId,

        /// New garment name
        #[arg(short, long)]
        garment: Option<String>,

        /// New size
        #[arg(short, long)]
        size: Option<String>,

        /// New quantity
        #[arg(short, long)]
        quantity: Option<String>,
    },
    /// Delete rows
    Delete {
        /// Row ids
        #[arg(required = true)]
        ids: Vec<StockRowId>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    // Status lines and logs go to stderr; stdout carries tables only
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stockroom=info,warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let context = commands::Context::from_env().await?;

    let outcome = match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login { email, password } => {
                commands::auth::login(&context, &email, password).await
            }
            AuthAction::Register { email, password } => {
                commands::auth::register(&context, &email, password).await
            }
            AuthAction::Logout => commands::auth::logout(&context).await,
            AuthAction::Whoami => {
                commands::auth::whoami(&context);
                Ok(())
            }
        },
        Commands::Stock { action } => match action {
            StockAction::List => commands::stock::list(&context).await,
            StockAction::Add {
                garment,
                size,
                quantity,
            } => commands::stock::add(&context, garment, size, quantity).await,
            StockAction::Edit {
                id,
                garment,
                size,
                quantity,
            } => {
                let changes = commands::stock::RowChanges {
                    garment,
                    size,
                    quantity,
                };
                commands::stock::edit(&context, id, changes).await
            }
            StockAction::Delete { ids, yes } => {
                commands::stock::delete(&context, &ids, yes, commands::stock::ask_on_stdin).await
            }
        },
    };

    // Let the session file catch up with the last change before exiting
    context.finish().await;
    outcome?;
    Ok(())
}
