use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use caseboard_api::{BoardConfig, CaseBoardApi, SnapshotFile};
use caseboard_core::parse_clerk_roster;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "cb")]
#[command(about = "Case board CLI")]
struct Cli {
    #[arg(long, default_value = "./caseboard.sqlite3", global = true)]
    db: PathBuf,

    /// YAML board configuration (table location, name overrides, table markers).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity on stderr. Repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Board {
        #[command(subcommand)]
        command: Box<BoardCommand>,
    },
    Roster {
        #[command(subcommand)]
        command: Box<RosterCommand>,
    },
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum BoardCommand {
    /// Build the ordered board and print it as JSON.
    Build(SnapshotArgs),
    /// Print the board as wikitext.
    Render(SnapshotArgs),
    /// Save the rendered board as a new revision unless it is unchanged.
    Publish(SnapshotArgs),
    History(HistoryArgs),
    Show(ShowArgs),
}

#[derive(Debug, Subcommand)]
enum RosterCommand {
    Parse(RosterParseArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct SnapshotArgs {
    #[arg(long)]
    snapshot: PathBuf,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long)]
    location: Option<String>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long)]
    revision_id: String,
}

#[derive(Debug, Args)]
struct RosterParseArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = BoardConfig::load(cli.config.as_deref())?;
    tracing::debug!(db = %cli.db.display(), location = %config.table_location, "starting cb");
    let api = CaseBoardApi::new(cli.db, config);

    match cli.command {
        Command::Board { command } => run_board(*command, &api),
        Command::Roster { command } => run_roster(*command),
        Command::Db { command } => run_db(*command, &api),
    }
}

fn run_board(command: BoardCommand, api: &CaseBoardApi) -> Result<()> {
    match command {
        BoardCommand::Build(args) => {
            let snapshot = SnapshotFile::load(&args.snapshot)?;
            let board = api.build_board(&snapshot)?;
            emit_json(serde_json::to_value(&board).context("failed to serialize board")?)
        }
        BoardCommand::Render(args) => {
            let snapshot = SnapshotFile::load(&args.snapshot)?;
            let board = api.build_board(&snapshot)?;
            println!("{}", api.render_board(&board));
            Ok(())
        }
        BoardCommand::Publish(args) => {
            let snapshot = SnapshotFile::load(&args.snapshot)?;
            let result = api.publish(&snapshot)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize publish result")?)
        }
        BoardCommand::History(args) => {
            let revisions = api.revisions(args.location.as_deref())?;
            emit_json(serde_json::json!({ "revisions": revisions }))
        }
        BoardCommand::Show(args) => {
            let revision = api.revision_show(&args.revision_id)?;
            emit_json(serde_json::to_value(&revision).context("failed to serialize revision")?)
        }
    }
}

fn run_roster(command: RosterCommand) -> Result<()> {
    match command {
        RosterCommand::Parse(args) => {
            let text = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read roster file {}", args.file.display()))?;
            let clerks = parse_clerk_roster(&text)?;
            emit_json(serde_json::json!({
                "count": clerks.len(),
                "clerks": clerks
            }))
        }
    }
}

fn run_db(command: DbCommand, api: &CaseBoardApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
                "inferred_from_legacy": status.inferred_from_legacy
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
        }
    }
}
