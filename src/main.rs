use std::{num::NonZeroU32, path::PathBuf, process::ExitCode};

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use library_ledger::{LibraryConfig, LibraryError, LibraryManager, LoanStatus, Stocking};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the library ledger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the library snapshot (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Operation to run
    #[command(subcommand)]
    command: Command,
}

/// One library operation per subcommand
#[derive(Subcommand, Debug)]
enum Command {
    /// Add a book, or more copies of a book already in the catalog
    AddBook {
        /// Unique catalog identifier
        #[arg(long)]
        isbn: String,
        /// Title (ignored when restocking)
        #[arg(long)]
        title: String,
        /// Author (ignored when restocking)
        #[arg(long)]
        author: String,
        /// Number of copies to add (positive integer)
        #[arg(long)]
        copies: NonZeroU32,
    },
    /// List the catalog
    Books,
    /// Register a new borrower
    Register {
        /// Unique borrower identifier
        id: String,
        /// Full name
        name: String,
    },
    /// List all borrowers, suspended ones included
    Borrowers,
    /// Block a borrower from new loans
    Suspend {
        /// Borrower identifier
        id: String,
    },
    /// Allow a suspended borrower to borrow again
    Reinstate {
        /// Borrower identifier
        id: String,
    },
    /// Lend a copy of a book
    Issue {
        /// Catalog identifier of the book
        isbn: String,
        /// Borrower identifier
        borrower: String,
        /// Issue date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// Take a copy back
    Return {
        /// Catalog identifier of the book
        isbn: String,
        /// Borrower identifier
        borrower: String,
        /// Return date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// List open loans and flag the overdue ones
    Loans {
        /// Report date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        on: Option<NaiveDate>,
        /// Only show overdue loans
        #[arg(long)]
        overdue_only: bool,
    },
    /// Write the current state to disk
    Flush,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_operational() {
                error!(error = %e, "library configuration or state is unusable");
            }
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Day used when the operator gives no explicit date
fn today_or(on: Option<NaiveDate>) -> NaiveDate {
    on.unwrap_or_else(|| Local::now().date_naive())
}

/// Resolve the configuration from the config file and command-line overrides
fn load_config(args: &Args) -> Result<LibraryConfig, LibraryError> {
    let mut config = match &args.config {
        Some(path) => LibraryConfig::from_toml_file(path)?,
        None => LibraryConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }
    Ok(config)
}

/// Execute one command against the persisted library
fn run(args: Args) -> Result<(), LibraryError> {
    let config = load_config(&args)?;
    debug!(?config, "using configuration");
    config.ensure_dirs()?;

    let mut library = LibraryManager::open(config.file_store())?;

    match args.command {
        Command::AddBook {
            isbn,
            title,
            author,
            copies,
        } => {
            let (stocking, book) = library.add_or_restock(&isbn, &title, &author, copies)?;
            match stocking {
                Stocking::Created => println!(
                    "{} '{}' added with {} copies",
                    "OK".green().bold(),
                    book.title(),
                    copies
                ),
                Stocking::Restocked => println!(
                    "{} copies added to '{}'. Total: {}",
                    "OK".green().bold(),
                    book.title(),
                    book.total_copies()
                ),
            }
        }
        Command::Books => {
            let mut books = library.books().peekable();
            if books.peek().is_none() {
                println!("No books in the catalog.");
            }
            for book in books {
                println!("{book}");
            }
        }
        Command::Register { id, name } => {
            let borrower = library.register_borrower(&id, &name)?;
            println!(
                "{} borrower '{}' registered",
                "OK".green().bold(),
                borrower.name()
            );
        }
        Command::Borrowers => {
            let mut borrowers = library.borrowers().peekable();
            if borrowers.peek().is_none() {
                println!("No borrowers registered.");
            }
            for borrower in borrowers {
                if borrower.is_suspended() {
                    println!("{}", borrower.to_string().red());
                } else {
                    println!("{borrower}");
                }
            }
        }
        Command::Suspend { id } => {
            library.suspend_borrower(&id)?;
            println!(
                "{} borrower {id} is suspended from new loans",
                "SUSPENDED".red().bold()
            );
        }
        Command::Reinstate { id } => {
            library.reinstate_borrower(&id)?;
            println!("{} borrower {id} may borrow again", "OK".green().bold());
        }
        Command::Issue { isbn, borrower, on } => {
            let loan = library.issue_loan(&isbn, &borrower, today_or(on))?;
            println!(
                "{} {isbn} lent to {borrower}, due back {}",
                "OK".green().bold(),
                loan.due_on().format("%Y-%m-%d")
            );
        }
        Command::Return { isbn, borrower, on } => {
            let receipt = library.return_loan(&isbn, &borrower, today_or(on))?;
            match receipt.status {
                LoanStatus::Overdue { days } => {
                    println!("{} returned {days} days late", "LATE".yellow().bold());
                    if receipt.recommends_suspension() {
                        println!("  Recommended: suspend borrower {borrower} until resolved");
                    }
                }
                LoanStatus::OnTime => println!("{} returned on time", "OK".green().bold()),
            }
        }
        Command::Loans { on, overdue_only } => {
            let today = today_or(on);
            let mut rows = library
                .open_loans(today)
                .filter(|view| !overdue_only || view.status.is_overdue())
                .peekable();
            if rows.peek().is_none() {
                println!("No books currently on loan.");
            }
            for view in rows {
                if view.status.is_overdue() {
                    println!("{}", view.to_string().red());
                } else {
                    println!("{view}");
                }
            }
        }
        Command::Flush => {
            library.flush()?;
            println!(
                "{} state saved to {}",
                "OK".green().bold(),
                library.store().path().display()
            );
        }
    }

    Ok(())
}
