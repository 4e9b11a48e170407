//! Operator CLI over the command handler
//!
//! Every subcommand prints its result as pretty JSON on stdout. Failures go
//! to stderr with an exit code derived from the error kind.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use holocron_storage::{create_storage, UserId};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use ulid::Ulid;

use crate::commands::{
    BookUpdate, CommandError, CommandHandler, ErrorKind, ListBooksRequest, NewBook,
};
use crate::config::Config;

/// Exit codes following Unix conventions
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_CONFLICT: u8 = 3;
pub const EXIT_NOT_FOUND: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "holocron")]
#[command(about = "Library catalog and lending CLI", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "HOLOCRON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage URL, overriding the config file and environment
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Id of the user the command acts as
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    pub acting_user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the catalog
    Book(BookArgs),
    /// Manage users
    User(UserArgs),
    /// Borrow and return books
    Lending(LendingArgs),
}

#[derive(Args, Debug)]
pub struct BookArgs {
    #[command(subcommand)]
    pub command: BookCommand,
}

#[derive(Subcommand, Debug)]
pub enum BookCommand {
    /// Register a book from explicit fields
    Add {
        #[arg(long)]
        title: String,
        /// Author (can be specified multiple times)
        #[arg(long = "author")]
        authors: Vec<String>,
        /// ISBN or other item code
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        published_date: Option<String>,
        #[arg(long)]
        thumbnail_url: Option<String>,
    },
    /// Register a book by looking up its code
    AddByCode { code: String },
    /// Show a book with its lending status
    Get { id: Ulid },
    /// Change some fields of a book
    Update {
        id: Ulid,
        #[arg(long)]
        title: Option<String>,
        /// Replace all authors
        #[arg(long = "author")]
        authors: Option<Vec<String>>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        published_date: Option<String>,
        #[arg(long)]
        thumbnail_url: Option<String>,
    },
    /// Remove a book from the catalog
    Delete {
        id: Ulid,
        /// One of: transfer, disposal, lost, other
        #[arg(long)]
        reason: String,
        #[arg(long)]
        memo: Option<String>,
    },
    /// List books
    List {
        #[arg(long)]
        code: Option<String>,
        /// Match against title or authors
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
}

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register the acting user
    Create {
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct LendingArgs {
    #[command(subcommand)]
    pub command: LendingCommand,
}

#[derive(Subcommand, Debug)]
pub enum LendingCommand {
    /// Borrow a book, or extend it if already held
    Borrow {
        book_id: Ulid,
        /// Loan period in days (default 7)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Return a borrowed book
    Return { book_id: Ulid },
    /// Books the acting user currently holds
    List,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => EXIT_USAGE,
            CliError::Command(e) => exit_code_for_kind(e.kind()),
            CliError::Output(_) => EXIT_ERROR,
        }
    }
}

pub fn exit_code_for_kind(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation => EXIT_USAGE,
        ErrorKind::Conflict => EXIT_CONFLICT,
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        ErrorKind::DataIntegrity | ErrorKind::Internal => EXIT_ERROR,
    }
}

fn acting_user(cli_user: Option<&str>) -> Result<UserId, CliError> {
    cli_user
        .filter(|u| !u.is_empty())
        .map(UserId::from)
        .ok_or_else(|| CliError::Usage("this command needs --as <USER_ID>".to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, CliError> {
    Ok(serde_json::to_value(value)?)
}

async fn execute(
    handler: &CommandHandler,
    command: Commands,
    user: Option<&str>,
) -> Result<serde_json::Value, CliError> {
    match command {
        Commands::Book(args) => match args.command {
            BookCommand::Add {
                title,
                authors,
                code,
                publisher,
                published_date,
                thumbnail_url,
            } => {
                let book = handler
                    .create_book(NewBook {
                        code,
                        title,
                        authors,
                        publisher,
                        published_date,
                        thumbnail_url,
                    })
                    .await?;
                to_json(&book)
            }
            BookCommand::AddByCode { code } => to_json(&handler.create_book_by_code(&code).await?),
            BookCommand::Get { id } => to_json(&handler.get_book(id).await?),
            BookCommand::Update {
                id,
                title,
                authors,
                publisher,
                published_date,
                thumbnail_url,
            } => {
                let update = BookUpdate {
                    title,
                    authors,
                    publisher,
                    published_date,
                    thumbnail_url,
                };
                to_json(&handler.update_book(id, update).await?)
            }
            BookCommand::Delete { id, reason, memo } => {
                handler.delete_book(id, &reason, memo).await?;
                Ok(serde_json::json!({ "id": id, "deleted": true }))
            }
            BookCommand::List {
                code,
                query,
                limit,
                offset,
            } => {
                let request = ListBooksRequest {
                    code,
                    keyword: query,
                    limit,
                    offset,
                };
                to_json(&handler.list_books(request).await?)
            }
        },
        Commands::User(args) => match args.command {
            UserCommand::Create { name } => {
                let user = acting_user(user)?;
                to_json(&handler.create_user(user, name.as_deref()).await?)
            }
        },
        Commands::Lending(args) => {
            let user = acting_user(user)?;
            match args.command {
                LendingCommand::Borrow { book_id, days } => {
                    to_json(&handler.borrow_book(book_id, &user, days).await?)
                }
                LendingCommand::Return { book_id } => {
                    to_json(&handler.return_book(book_id, &user).await?)
                }
                LendingCommand::List => to_json(&handler.list_borrowings(&user).await?),
            }
        }
    }
}

/// Load configuration with precedence CLI > environment > file
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    Ok(config)
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };

    let storage = create_storage(&config.storage_config()?).await?;
    let handler = CommandHandler::new(storage.clone(), config.fetchers()?);

    let result = execute(&handler, cli.command, cli.acting_user.as_deref()).await;
    storage.close().await?;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
