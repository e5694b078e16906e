use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;
use yugantar_server::database::Database;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "yugantar.db")]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates an admin account unless the email is taken.
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long, env = "FIRST_SUPERUSER_PASSWORD")]
        password: String,

        #[arg(long, env = "PASSWORD_HASH_ROUNDS", default_value_t = 600_000)]
        rounds: u32,
    },

    /// Extracts receipt details from Tesseract TSV dumps and prints them as JSON.
    ExtractReceipts {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Replays the change log of one policy.
    Replay { policy_id: Uuid },

    /// Replays every policy and reports the ones that do not match.
    Audit,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::CreateAdmin {
            email,
            password,
            rounds,
        } => {
            let database = Database::open(&args.database)?;
            if process::create_admin(&database, &email, &password, rounds)? {
                println!("Admin {email} created");
            } else {
                println!("{email} already exists, nothing to do");
            }
        }
        Command::ExtractReceipts { files } => {
            let receipts = process::extract_receipts(&files);
            println!("{}", serde_json::to_string_pretty(&receipts)?);
        }
        Command::Replay { policy_id } => {
            let database = Database::open(&args.database)?;
            let report = process::replay(&database, policy_id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.matches {
                std::process::exit(1);
            }
        }
        Command::Audit => {
            let database = Database::open(&args.database)?;
            let summary = process::audit(&database)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if !summary.mismatched.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
