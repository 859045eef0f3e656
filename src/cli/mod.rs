use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod contacts;
pub mod display;
pub mod import;
pub mod pipeline;
pub mod serve;

pub use contacts::{run_add, run_assign, run_delete, run_list, run_show};
pub use import::run_import;
pub use pipeline::{run_history, run_log, run_stage};
pub use serve::run_serve;

use crate::config::AppConfig;
use crate::crm::{AccessContext, ContactService, UserRole};
use crate::db::Database;
use crate::notify::Notifier;

/// Identity used when no `--as-user` is given.
pub const DEFAULT_CLI_USER: &str = "cli";

#[derive(Parser)]
#[command(name = "leadbook")]
#[command(about = "Contact pipeline CRM for tax-preparation practices")]
#[command(version)]
pub struct Cli {
    /// Config file (default: <config dir>/leadbook/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Act as this user id
    #[arg(long = "as-user", global = true, value_name = "ID")]
    pub as_user: Option<String>,

    /// Role of the acting user
    #[arg(long, global = true, default_value = "ADMIN")]
    pub role: String,

    /// Preparer id, required with --role TAX_PREPARER
    #[arg(long, global = true, value_name = "ID")]
    pub preparer: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn access_context(&self) -> Result<AccessContext> {
        let role: UserRole = self.role.parse().map_err(anyhow::Error::msg)?;
        let user = self.as_user.as_deref().unwrap_or(DEFAULT_CLI_USER);
        AccessContext::resolve(user, role, self.preparer.as_deref()).context("Invalid identity")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
    /// List contacts with filters and pagination
    List(ListArgs),
    /// Show a contact with recent activity
    Show(IdArgs),
    /// Add a contact
    Add(AddArgs),
    /// Move a contact to a pipeline stage
    Stage(StageArgs),
    /// Log an interaction with a contact
    Log(LogArgs),
    /// Assign a contact to a preparer
    Assign(AssignArgs),
    /// Show a contact's stage history
    History(IdArgs),
    /// Soft-delete a contact
    Delete(IdArgs),
    /// Backfill leads from a CSV file
    Import(ImportArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub stage: Option<String>,
    #[arg(short = 't', long = "type")]
    pub contact_type: Option<String>,
    #[arg(short, long)]
    pub search: Option<String>,
    /// Only contacts assigned to this preparer
    #[arg(short, long)]
    pub assigned: Option<String>,
    #[arg(short, long, default_value = "1")]
    pub page: u32,
    #[arg(short, long, default_value = "20")]
    pub limit: u32,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(short, long)]
    pub first: String,
    #[arg(short, long)]
    pub last: String,
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub phone: Option<String>,
    #[arg(short, long)]
    pub company: Option<String>,
    #[arg(short = 't', long = "type", default_value = "LEAD")]
    pub contact_type: String,
    /// Update the existing contact if the email is taken
    #[arg(short, long)]
    pub upsert: bool,
}

#[derive(Args)]
pub struct StageArgs {
    pub id: String,
    pub stage: String,
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Args)]
pub struct LogArgs {
    pub id: String,
    #[arg(short = 't', long = "type", default_value = "NOTE")]
    pub interaction_type: String,
    #[arg(short, long, default_value = "OUTBOUND")]
    pub direction: String,
    #[arg(short, long)]
    pub subject: Option<String>,
    #[arg(short, long)]
    pub body: Option<String>,
}

#[derive(Args)]
pub struct AssignArgs {
    pub id: String,
    pub preparer: String,
}

#[derive(Args)]
pub struct ImportArgs {
    pub file: PathBuf,
    /// Validate rows without writing
    #[arg(long)]
    pub dry_run: bool,
}

/// Everything a command needs: configuration, an open database and the notifier.
pub struct Session {
    pub config: AppConfig,
    pub db: Database,
    pub notifier: Notifier,
    pub ctx: AccessContext,
}

impl Session {
    pub fn open(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
        let db_path = config.database_path()?;
        let db = Database::open_at(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        let notifier = config
            .email
            .build_notifier()
            .context("Failed to set up email delivery")?;
        let ctx = cli.access_context()?;

        Ok(Self {
            config,
            db,
            notifier,
            ctx,
        })
    }

    pub fn service(&self) -> ContactService<'_> {
        ContactService::new(&self.db, &self.notifier)
    }
}

/// Parse a contact id argument.
pub(crate) fn parse_id(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid contact id: {}", raw))
}

pub fn run(cli: Cli) -> Result<()> {
    let session = Session::open(&cli)?;

    match cli.command {
        Commands::Serve(args) => run_serve(session, args.port),
        Commands::List(args) => run_list(&session, &args),
        Commands::Show(args) => run_show(&session, &args.id),
        Commands::Add(args) => run_add(&session, args),
        Commands::Stage(args) => run_stage(&session, &args.id, &args.stage, args.reason),
        Commands::Log(args) => run_log(&session, args),
        Commands::Assign(args) => run_assign(&session, &args.id, &args.preparer),
        Commands::History(args) => run_history(&session, &args.id),
        Commands::Delete(args) => run_delete(&session, &args.id),
        Commands::Import(args) => run_import(&session, &args.file, args.dry_run),
    }
}
