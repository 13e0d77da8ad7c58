//! Coop Ledger CLI
//!
//! Maintains a cooperative's ledger in a SQLite file: registers members,
//! imports movement batches from CSV and writes CSV reports to stdout.
//!
//! # Usage
//!
//! ```bash
//! COOP_CREDENTIAL=secret coop-ledger coop.db add-member 001 "Ana Pérez"
//! coop-ledger coop.db import movements.csv
//! coop-ledger coop.db summary > summary.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `COOP_DATABASE`: Default database path
//! - `COOP_CREDENTIAL`: Credential for `add-member`, `add-admin` and `statement`
//! - `COOP_BUSY_TIMEOUT_MS`, `COOP_MAX_ATTEMPTS`, `COOP_WITHDRAWAL_POLICY`:
//!   see [`LedgerConfig::from_env`]

use clap::{Parser, Subcommand};
use coop_ledger::{Ledger, LedgerConfig, Result, Session};
use log::info;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "coop-ledger")]
#[command(about = "Savings and credit cooperative ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file; created if missing
    #[arg(env = "COOP_DATABASE")]
    database: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a member
    AddMember {
        number: String,
        name: String,
        #[arg(long, env = "COOP_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Register an administrator
    AddAdmin {
        username: String,
        name: String,
        #[arg(long, env = "COOP_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Apply a CSV batch of deposits, withdrawals, loans and payments
    Import { file: PathBuf },

    /// Per-member summaries as CSV
    Summary,

    /// Organization totals as CSV
    OrgSummary,

    /// Open loans as CSV
    Loans,

    /// Summary of a single member. Members may only read their own;
    /// administrators may read any.
    Statement {
        number: String,
        /// Who is asking: a membership number, or a username with `--admin`.
        /// Defaults to `number`.
        #[arg(long)]
        login: Option<String>,
        #[arg(long)]
        admin: bool,
        #[arg(long, env = "COOP_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Copy the database into a timestamped file under `dir`
    Backup { dir: PathBuf },

    /// Replace the database with a backup file
    Restore { file: PathBuf },
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let ledger = Ledger::open(&cli.database, LedgerConfig::from_env()?)?;

    match cli.command {
        Command::AddMember {
            number,
            name,
            credential,
        } => {
            let member = ledger.create_member(&number, &name, &credential)?;
            info!("Member {} registered with id {}", member.membership_number, member.id);
            println!("{}", member.id);
        }
        Command::AddAdmin {
            username,
            name,
            credential,
        } => {
            let admin = ledger.create_admin(&username, &name, &credential)?;
            println!("{}", admin.id);
        }
        Command::Import { file } => {
            let reader = BufReader::new(File::open(file)?);
            let report = ledger.import_csv(reader)?;
            eprintln!("{} applied, {} skipped", report.applied, report.skipped);
        }
        Command::Summary => ledger.write_member_summaries(io::stdout().lock())?,
        Command::OrgSummary => ledger.write_organization_summary(io::stdout().lock())?,
        Command::Loans => ledger.write_open_loans(io::stdout().lock())?,
        Command::Statement {
            number,
            login,
            admin,
            credential,
        } => {
            let login = login.as_deref().unwrap_or(&number);
            let session = if admin {
                Session::admin(&ledger.authenticate_admin(login, &credential)?)
            } else {
                Session::member(&ledger.authenticate(login, &credential)?)
            };

            let member = ledger.find_member_by_number(&number)?;
            session.require_access_to(member.id)?;
            ledger.write_summaries(io::stdout().lock(), &[member])?;
        }
        Command::Backup { dir } => {
            let path = ledger.backup_to_dir(dir)?;
            println!("{}", path.display());
        }
        Command::Restore { file } => {
            let blob = fs::read(file)?;
            ledger.restore(&blob)?;
        }
    }

    Ok(())
}
