//! stockroom: operator tooling for document counters
//!
//! Commands: reconcile, peek, counters, quarantined, release

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use stockroom_core::SequenceKey;
use stockroom_infra::{
    PostgresCounterStore, PostgresDocumentStore, PostgresQuarantine, StockroomConfig, db,
};
use stockroom_numbering::{
    CollectionBinding, CounterStore, KeyQuarantine, ReconciliationReport, Reconciler,
};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(version)]
#[command(about = "Document counter maintenance")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Raise counters to the highest document number in use
    Reconcile {
        /// Period to reconcile (defaults to STOCKROOM_PERIOD or the current year)
        #[arg(long)]
        period: Option<String>,

        /// Explicit binding `collection:field:prefix`; repeatable. Defaults to
        /// every configured series.
        #[arg(long = "binding", value_name = "BINDING")]
        bindings: Vec<CollectionBinding>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current sequence of a counter key
    Peek { key: SequenceKey },
    /// List all counters
    Counters {
        #[arg(long)]
        json: bool,
    },
    /// List keys halted after a duplicate number
    Quarantined {
        #[arg(long)]
        json: bool,
    },
    /// Resume allocation for a key once its duplicate is resolved
    Release { key: SequenceKey },
}

/// Reconciliation finished but at least one binding failed.
const EXIT_FAILED_BINDINGS: u8 = 1;
/// Duplicate numbers were found; affected keys need operator attention.
const EXIT_DUPLICATES: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    stockroom_observability::tracing::init_with_default(
        stockroom_observability::LogFormat::Compact,
        "warn",
    );

    let cli = Cli::parse();
    let config = StockroomConfig::from_env().context("invalid configuration")?;
    let Some(database_url) = cli.database_url.or(config.database_url.clone()) else {
        bail!("DATABASE_URL is required (or pass --database-url)");
    };

    let pool = db::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    db::ensure_schema(&pool).await.context("failed to prepare schema")?;
    let counters = Arc::new(PostgresCounterStore::new(pool.clone()));
    let quarantine = KeyQuarantine::with_store(PostgresQuarantine::new(pool.clone()));

    match cli.command {
        Commands::Reconcile {
            period,
            bindings,
            json,
        } => {
            let bindings = if bindings.is_empty() {
                let period = period.unwrap_or_else(|| config.period.resolve(chrono::Utc::now()));
                config
                    .series
                    .bindings_for_period(&config.format, &period)
                    .context("cannot derive bindings from configured series")?
            } else {
                bindings
            };

            let documents = PostgresDocumentStore::new(pool, config.format, quarantine.clone());
            let reconciler = Reconciler::new(counters, documents, config.format, quarantine);
            let report = reconciler.reconcile(&bindings).await;

            print_report(&report, json)?;
            Ok(exit_code(&report))
        }
        Commands::Peek { key } => {
            let seq = counters.peek(&key).await?;
            println!("{key} {seq}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Counters { json } => {
            let all = counters.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("no counters");
            } else {
                for c in all {
                    println!("{:<24} {}", c.key, c.seq);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Quarantined { json } => {
            let entries = quarantine.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("no quarantined keys");
            } else {
                for e in entries {
                    println!("{:<24} {}  {}", e.key, e.since.to_rfc3339(), e.reason);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Release { key } => match quarantine.release(&key).await? {
            Some(_) => {
                println!("{key} released");
                Ok(ExitCode::SUCCESS)
            }
            None => bail!("key `{key}` is not quarantined"),
        },
    }
}

fn print_report(report: &ReconciliationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn exit_code(report: &ReconciliationReport) -> ExitCode {
    if report.has_duplicates() {
        ExitCode::from(EXIT_DUPLICATES)
    } else if report.has_failures() {
        ExitCode::from(EXIT_FAILED_BINDINGS)
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repeated_bindings_are_parsed() {
        let cli = Cli::try_parse_from([
            "stockroom",
            "--database-url",
            "postgres://localhost/db",
            "reconcile",
            "--binding",
            "customer-orders:number:CO-2026",
            "--binding",
            "receipts:ref:RCV-2026",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Reconcile { bindings, json, .. } => {
                assert!(json);
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[1].number_field, "ref");
                assert_eq!(bindings[1].prefix.as_str(), "RCV-2026");
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn release_takes_a_sequence_key() {
        let cli = Cli::try_parse_from(["stockroom", "release", "CO-2026"]).unwrap();
        match cli.command {
            Commands::Release { key } => assert_eq!(key.as_str(), "CO-2026"),
            _ => panic!("expected release"),
        }
        assert!(Cli::try_parse_from(["stockroom", "release", "not a key"]).is_err());
    }

    #[test]
    fn malformed_binding_is_rejected() {
        assert!(Cli::try_parse_from(["stockroom", "reconcile", "--binding", "orders"]).is_err());
    }
}
