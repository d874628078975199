// healthdq/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "healthdq")]
#[command(about = "Rule-driven quality engine for tabular health records", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🩺 Detects, corrects and measures a dataset
    Run {
        /// Input file (JSON records, FHIR bundle or CSV)
        input: PathBuf,

        /// Rule document
        #[arg(long, short, default_value = "rules.yml")]
        config: PathBuf,

        /// Input format: auto | json | fhir | csv
        #[arg(long, default_value = "auto")]
        format: String,

        /// Output directory for artifacts and checkpoints
        #[arg(long, short, default_value = "out")]
        out: PathBuf,

        /// Stop for human review instead of applying corrections
        #[arg(long)]
        review: bool,

        /// Run identifier (default: timestamp)
        #[arg(long)]
        run_id: Option<String>,

        /// Ledger of a previous run to extend
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// ✍️  Records a review decision on a suspended run
    Decide {
        /// Correction id (ex: "c-0003" or "3")
        id: String,

        /// accept | override | reject
        #[arg(long, short)]
        status: String,

        /// Replacement value, required by `override`
        #[arg(long)]
        value: Option<String>,

        #[arg(long, short, default_value = "out")]
        out: PathBuf,

        /// Rule document to verify against the run's digest
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// ▶️  Finishes a suspended run once every correction is decided
    Resume {
        #[arg(long, short, default_value = "out")]
        out: PathBuf,

        /// Rule document to verify against the run's digest
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// ✅ Validates a rule document without touching any data
    Check {
        #[arg(long, short, default_value = "rules.yml")]
        config: PathBuf,
    },

    /// 📜 Shows the audit history of corrections
    History {
        #[arg(long, default_value = "out/ledger.json")]
        ledger: PathBuf,

        /// Only this record
        #[arg(long)]
        record: Option<String>,

        /// Only this field
        #[arg(long)]
        field: Option<String>,

        /// Print raw JSON entries instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["healthdq", "run", "records.json"]);
        match args.command {
            Commands::Run {
                input,
                config,
                format,
                out,
                review,
                run_id,
                ledger,
            } => {
                assert_eq!(input.to_string_lossy(), "records.json");
                assert_eq!(config.to_string_lossy(), "rules.yml");
                assert_eq!(format, "auto");
                assert_eq!(out.to_string_lossy(), "out");
                assert!(!review);
                assert_eq!(run_id, None);
                assert_eq!(ledger, None);
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_decide_override() -> Result<()> {
        let args = Cli::parse_from([
            "healthdq", "decide", "c-0002", "--status", "override", "--value", "175",
        ]);
        match args.command {
            Commands::Decide {
                id, status, value, ..
            } => {
                assert_eq!(id, "c-0002");
                assert_eq!(status, "override");
                assert_eq!(value.as_deref(), Some("175"));
                Ok(())
            }
            _ => bail!("Expected Decide command"),
        }
    }

    #[test]
    fn test_cli_requires_status() {
        assert!(Cli::try_parse_from(["healthdq", "decide", "c-0001"]).is_err());
    }
}
