//! TripSync CLI
//!
//! Thin wrapper around tripsync-core for command-line usage. Every command
//! opens the local store, signs in, does one thing and exits.
//!
//! ## Usage
//!
//! ```bash
//! # Who am I?
//! tripsync whoami
//!
//! # Shared checklist
//! tripsync --session goa-2025 checklist add "Passport"
//! tripsync --session goa-2025 checklist ls
//! tripsync --session goa-2025 checklist rm <id>
//!
//! # Expenses
//! tripsync --session goa-2025 expense add "Dinner" 42.50
//! tripsync --session goa-2025 expense ls
//!
//! # Announcements
//! tripsync --session goa-2025 announce post "Bus leaves at 7"
//!
//! # Polls (options are numbered from 1)
//! tripsync --session goa-2025 poll create "Beach or Mountains?" Beach Mountains
//! tripsync --session goa-2025 poll vote <poll_id> 1
//! tripsync --session goa-2025 poll ls
//!
//! # Two live clients against one in-memory store
//! tripsync demo
//! ```
//!
//! The session can also come from `TRIPSYNC_SESSION_ID`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::time::timeout;
use tracing::debug;
use tripsync_core::logging::{self, JsonlLayer};
use tripsync_core::{
    expense_total, format_amount, Announcement, AnonymousIdentity, ChecklistItem, Expense,
    IdentityProvider, IdentityState, LocalStore, Poll, PollDraft, RecordId, SessionId, Storage,
    SyncConfig, SyncEngine, SyncError, TokenIdentity, VoteOutcome,
};

/// TripSync - shared lists for a group trip
#[derive(Parser)]
#[command(name = "tripsync")]
#[command(version)]
#[command(about = "TripSync - shared checklist, expenses, announcements and polls")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.tripsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Trip session id (default: $TRIPSYNC_SESSION_ID)
    #[arg(short, long, global = true)]
    session: Option<String>,

    /// Sign in with this token instead of anonymously
    #[arg(long, global = true)]
    token: Option<String>,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show this client's identity
    Whoami,

    /// Shared packing checklist
    Checklist {
        #[command(subcommand)]
        action: ChecklistAction,
    },

    /// Shared expense ledger
    Expense {
        #[command(subcommand)]
        action: ExpenseAction,
    },

    /// Group announcements
    Announce {
        #[command(subcommand)]
        action: AnnounceAction,
    },

    /// Group polls
    Poll {
        #[command(subcommand)]
        action: PollAction,
    },

    /// Run two clients against one in-memory store and show what they see
    Demo,
}

#[derive(Subcommand)]
enum ChecklistAction {
    /// Add an item
    Add { text: String },
    /// Remove an item
    Rm { id: String },
    /// List items
    Ls,
}

#[derive(Subcommand)]
enum ExpenseAction {
    /// Record an expense
    Add {
        name: String,
        /// Amount, e.g. 42.50
        amount: String,
    },
    /// Remove an expense
    Rm { id: String },
    /// List expenses and the total
    Ls,
}

#[derive(Subcommand)]
enum AnnounceAction {
    /// Post an announcement
    Post { text: String },
    /// Remove an announcement
    Rm { id: String },
    /// List announcements
    Ls,
}

#[derive(Subcommand)]
enum PollAction {
    /// Create a poll with two or more options
    Create {
        question: String,
        #[arg(required = true, num_args = 2..)]
        options: Vec<String>,
    },
    /// Vote for an option (numbered from 1)
    Vote { poll_id: String, option: usize },
    /// List polls with their results
    Ls,
}

/// Set up logging based on verbosity
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    let jsonl = match log_dir {
        Some(dir) => Some(JsonlLayer::new(dir, "tripsync").context("Failed to open log file")?),
        None => None,
    };
    logging::init(logging::verbosity_filter(verbosity), jsonl)
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
}

/// Get the default data directory (~/.tripsync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tripsync")
        .join("data")
}

fn parse_record_id(s: &str) -> Result<RecordId> {
    RecordId::from_str(s).map_err(|e| anyhow::anyhow!("Invalid id '{}': {}", s, e))
}

fn session_config(session: Option<String>) -> Result<SyncConfig> {
    match session {
        Some(session) => Ok(SyncConfig::new(SessionId::new(session)?)),
        None => SyncConfig::from_env()
            .context("No session given: pass --session or set TRIPSYNC_SESSION_ID"),
    }
}

fn identity_provider(token: Option<&str>, storage: &Storage) -> Box<dyn IdentityProvider> {
    match token {
        Some(token) => Box::new(TokenIdentity::new(token)),
        None => Box::new(AnonymousIdentity::persistent(storage.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_dir.as_deref())?;

    if let Commands::Demo = cli.command {
        return run_demo().await;
    }

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let storage = Storage::new(data_dir.join("tripsync.redb"))
        .with_context(|| format!("Failed to open store in {}", data_dir.display()))?;
    let provider = identity_provider(cli.token.as_deref(), &storage);

    if let Commands::Whoami = cli.command {
        let identity = provider.get_or_create_identity().await?;
        println!("Identity: {}", identity);
        println!("Data directory: {}", data_dir.display());
        return Ok(());
    }

    let config = session_config(cli.session)?;
    let engine = SyncEngine::new(LocalStore::persistent(storage), config);
    if let IdentityState::Unavailable(reason) = engine.bootstrap(provider.as_ref()).await {
        anyhow::bail!("Could not sign in: {}", reason);
    }

    match cli.command {
        Commands::Checklist { action } => match action {
            ChecklistAction::Add { text } => {
                let id = engine.add_checklist_item(text.as_str()).await?;
                println!("Added item: {}", text.trim());
                println!("  ID: {}", id);
            }
            ChecklistAction::Rm { id } => {
                let id = parse_record_id(&id)?;
                report_removal(engine.delete_checklist_item(&id).await, "item", &id)?;
            }
            ChecklistAction::Ls => {
                let items = engine.load::<ChecklistItem>().await?;
                if items.is_empty() {
                    println!("Checklist is empty.");
                } else {
                    println!("Checklist ({}):", items.len());
                    for item in items.iter() {
                        println!("  {} {} ({})", item.id, item.text, item.created_by);
                    }
                }
            }
        },

        Commands::Expense { action } => match action {
            ExpenseAction::Add { name, amount } => {
                let id = engine.add_expense(name.as_str(), amount).await?;
                println!("Added expense: {}", name.trim());
                println!("  ID: {}", id);
            }
            ExpenseAction::Rm { id } => {
                let id = parse_record_id(&id)?;
                report_removal(engine.delete_expense(&id).await, "expense", &id)?;
            }
            ExpenseAction::Ls => {
                let expenses = engine.load::<Expense>().await?;
                if expenses.is_empty() {
                    println!("No expenses yet.");
                } else {
                    println!("Expenses ({}):", expenses.len());
                    for expense in expenses.iter() {
                        println!(
                            "  {} {:<24} {:>10}",
                            expense.id,
                            expense.name,
                            format_amount(expense.amount)
                        );
                    }
                }
                println!("Total: {}", format_amount(expense_total(expenses.iter())));
            }
        },

        Commands::Announce { action } => match action {
            AnnounceAction::Post { text } => {
                let id = engine.post_announcement(text.as_str()).await?;
                println!("Posted announcement.");
                println!("  ID: {}", id);
            }
            AnnounceAction::Rm { id } => {
                let id = parse_record_id(&id)?;
                report_removal(engine.delete_announcement(&id).await, "announcement", &id)?;
            }
            AnnounceAction::Ls => {
                let announcements = engine.load::<Announcement>().await?;
                if announcements.is_empty() {
                    println!("No announcements.");
                }
                for announcement in announcements.iter() {
                    let when = announcement
                        .created_at
                        .map(|t| t.with_timezone(&Local).format("%b %e %H:%M").to_string())
                        .unwrap_or_else(|| "--".to_string());
                    println!("  [{}] {} ({})", when, announcement.text, announcement.id);
                }
            }
        },

        Commands::Poll { action } => match action {
            PollAction::Create { question, options } => {
                let draft = PollDraft::new(question.as_str()).with_options(&options);
                if !draft.is_ready() {
                    anyhow::bail!("A poll needs a question and at least two options");
                }
                let id = engine.create_poll(draft).await?;
                println!("Created poll: {}", question.trim());
                println!("  ID: {}", id);
            }
            PollAction::Vote { poll_id, option } => {
                let id = parse_record_id(&poll_id)?;
                let index = option
                    .checked_sub(1)
                    .context("Options are numbered from 1")?;
                match engine.vote(&id, index).await? {
                    VoteOutcome::Recorded { .. } => println!("Vote recorded."),
                    VoteOutcome::AlreadyVoted => println!("You have already voted on this poll."),
                }
            }
            PollAction::Ls => {
                let polls = engine.load::<Poll>().await?;
                if polls.is_empty() {
                    println!("No polls.");
                }
                let me = engine.identity();
                for poll in polls.iter() {
                    print_poll(poll, me.as_ref().is_some_and(|id| poll.has_voted(id)));
                }
            }
        },

        Commands::Whoami | Commands::Demo => unreachable!("handled above"),
    }

    Ok(())
}

/// Removing something already gone is not an error for the user.
fn report_removal(result: tripsync_core::SyncResult<()>, what: &str, id: &RecordId) -> Result<()> {
    match result {
        Ok(()) => {
            println!("Removed {}: {}", what, id);
            Ok(())
        }
        Err(SyncError::NotFound { .. }) => {
            println!("No {} with id {} (already removed?)", what, id);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_poll(poll: &Poll, voted: bool) {
    const BAR_WIDTH: f64 = 20.0;

    let marker = if voted { " (voted)" } else { "" };
    println!("  {} {}{}", poll.id, poll.question, marker);
    for (i, option) in poll.options.iter().enumerate() {
        let filled = (poll.bar_fraction(i) * BAR_WIDTH).round() as usize;
        println!(
            "    {}. {:<16} {:<20} {}",
            i + 1,
            option.text,
            "#".repeat(filled),
            option.votes
        );
    }
}

/// Two clients, one store: alice and bob plan a trip while bob watches.
async fn run_demo() -> Result<()> {
    const WAIT: Duration = Duration::from_secs(5);

    let store = LocalStore::in_memory();
    let config = SyncConfig::new(SessionId::new("demo-trip")?);
    let alice = SyncEngine::new(store.clone(), config.clone());
    let bob = SyncEngine::new(store, config);
    alice.bootstrap(&TokenIdentity::new("alice")).await;
    bob.bootstrap(&TokenIdentity::new("bob")).await;

    let mut checklist = bob.subscribe_checklist();
    let mut polls = bob.subscribe_polls();

    alice.add_checklist_item("Passport").await?;
    bob.add_checklist_item("Sunscreen").await?;
    let snapshot = timeout(WAIT, async {
        loop {
            match checklist.next().await {
                Some(s) if s.len() == 2 => return Some(s),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .context("Timed out waiting for checklist")?
    .context("Checklist subscription ended")?;

    println!("Bob sees the checklist:");
    for item in snapshot.iter() {
        println!("  - {}", item.text);
    }

    let poll_id = alice
        .create_poll(PollDraft::new("Beach or Mountains?").with_options(["Beach", "Mountains"]))
        .await?;
    // Both mirrors hold the fresh poll before anyone votes.
    alice.load::<Poll>().await?;
    bob.load::<Poll>().await?;
    let (a, b) = tokio::join!(alice.vote(&poll_id, 0), bob.vote(&poll_id, 0));
    debug!(?a, ?b, "Votes settled");
    a?;
    b?;

    let snapshot = timeout(WAIT, async {
        loop {
            match polls.next().await {
                Some(s) if s.get(&poll_id).is_some_and(|p| p.total_votes() == 2) => return Some(s),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .context("Timed out waiting for votes")?
    .context("Poll subscription ended")?;

    println!("Bob sees the poll:");
    if let Some(poll) = snapshot.get(&poll_id) {
        print_poll(poll, true);
    }

    checklist.cancel();
    polls.cancel();
    Ok(())
}
