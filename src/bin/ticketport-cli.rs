//! Ticketport CLI - operational trigger surface
//!
//! Usage:
//!   ticketport-cli [--config <path>] ticket <source_id>
//!   ticketport-cli [--config <path>] tickets [--from <rfc3339>] [--to <rfc3339>] [--classification <id>]
//!   ticketport-cli [--config <path>] update <local_ticket_id>
//!   ticketport-cli [--config <path>] classifications <source_category_id>
//!   ticketport-cli [--config <path>] files <id[,id...]> [--owner <local_ticket_id>]
//!   ticketport-cli [--config <path>] comments <source_owner_type> <source_owner_id> --owner <local_ticket_id>
//!   ticketport-cli [--config <path>] lookup <kind> <source_id>
//!   ticketport-cli [--config <path>] report [kind] [--json]
//!
//! Expected outcomes (already migrated, not found) print as statuses;
//! only real failures exit non-zero.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};

use ticketport::config::EngineConfig;
use ticketport::models::TicketFilter;
use ticketport::owner::Owner;
use ticketport::store::RecordKind;
use ticketport::MigrationEngine;

#[derive(Debug)]
enum Command {
    Ticket { source_id: i64 },
    Tickets { filter: TicketFilter },
    Update { local_id: String },
    Classifications { source_category_id: i64 },
    Files { ids: Vec<i64>, owner: Option<String> },
    Comments {
        source_owner_type: String,
        source_owner_id: i64,
        owner: String,
    },
    Lookup {
        kind: RecordKind,
        source_ref: i64,
    },
    Report {
        kind: Option<RecordKind>,
        json: bool,
    },
    Help,
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let (config_path, rest) = split_config_flag(&args[1..]);

    let command = match parse_args(&rest) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {e}");
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Help => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Command::Version => {
            println!("ticketport-cli {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_command(config, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn split_config_flag(args: &[String]) -> (Option<PathBuf>, Vec<String>) {
    if args.len() >= 2 && (args[0] == "--config" || args[0] == "-c") {
        (Some(PathBuf::from(&args[1])), args[2..].to_vec())
    } else {
        (None, args.to_vec())
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(p) => Ok(EngineConfig::from_file(&p)?),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    if args.is_empty() {
        return Ok(Command::Help);
    }

    match args[0].as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "version" | "--version" | "-V" => Ok(Command::Version),

        "ticket" => {
            let source_id = parse_i64(args.get(1), "source ticket id")?;
            Ok(Command::Ticket { source_id })
        }

        "tickets" => {
            let mut filter = TicketFilter::default();
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--from" => {
                        filter.date_from = Some(parse_date(args.get(i + 1), "--from")?);
                        i += 2;
                    }
                    "--to" => {
                        filter.date_to = Some(parse_date(args.get(i + 1), "--to")?);
                        i += 2;
                    }
                    "--classification" => {
                        filter.classification_id =
                            Some(parse_i64(args.get(i + 1), "--classification")?);
                        i += 2;
                    }
                    other => return Err(format!("Unknown flag: {other}")),
                }
            }
            Ok(Command::Tickets { filter })
        }

        "update" => {
            let local_id = args.get(1).ok_or("Missing local ticket id")?.clone();
            Ok(Command::Update { local_id })
        }

        "classifications" => {
            let source_category_id = parse_i64(args.get(1), "source category id")?;
            Ok(Command::Classifications { source_category_id })
        }

        "files" => {
            let ids = args
                .get(1)
                .ok_or("Missing file id list")?
                .split(',')
                .map(|s| s.trim().parse().map_err(|_| format!("Bad file id: {s}")))
                .collect::<Result<Vec<i64>, _>>()?;
            let owner = flag_value(args, "--owner");
            Ok(Command::Files { ids, owner })
        }

        "comments" => {
            let source_owner_type = args.get(1).ok_or("Missing source owner type")?.clone();
            let source_owner_id = parse_i64(args.get(2), "source owner id")?;
            let owner = flag_value(args, "--owner")
                .ok_or("comments requires --owner <local_ticket_id>")?;
            Ok(Command::Comments {
                source_owner_type,
                source_owner_id,
                owner,
            })
        }

        "lookup" => {
            let kind = parse_kind(args.get(1).ok_or("Missing record kind")?)?;
            let source_ref = parse_i64(args.get(2), "source id")?;
            Ok(Command::Lookup { kind, source_ref })
        }

        "report" => {
            let json = args.iter().any(|a| a == "--json");
            let kind = match args.get(1).map(String::as_str) {
                None | Some("--json") => None,
                Some(other) => Some(parse_kind(other)?),
            };
            Ok(Command::Report { kind, json })
        }

        other => Err(format!("Unknown command: {other}")),
    }
}

fn parse_kind(arg: &str) -> Result<RecordKind, String> {
    match arg {
        "categories" => Ok(RecordKind::Category),
        "classifications" => Ok(RecordKind::Classification),
        "tickets" => Ok(RecordKind::Ticket),
        "files" => Ok(RecordKind::FileAsset),
        "comments" => Ok(RecordKind::Comment),
        other => Err(format!("Unknown record kind: {other}")),
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_i64(arg: Option<&String>, what: &str) -> Result<i64, String> {
    arg.ok_or(format!("Missing {what}"))?
        .parse()
        .map_err(|_| format!("Invalid {what}"))
}

fn parse_date(arg: Option<&String>, flag: &str) -> Result<DateTime<Utc>, String> {
    let raw = arg.ok_or(format!("Missing value for {flag}"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid date for {flag}: {e}"))
}

async fn run_command(config: EngineConfig, command: Command) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(config)?;

    match command {
        Command::Ticket { source_id } => {
            let result = engine.migrate_ticket(source_id).await?;
            match result.ticket() {
                Some(ticket) => println!("{}: {}", result.status(), ticket.id),
                None => println!("{}", result.status()),
            }
        }

        Command::Tickets { filter } => {
            let outcome = engine.migrate_tickets(&filter).await?;
            println!(
                "migrated: {}, failed: {}",
                outcome.migrated(),
                outcome.failures()
            );
            for (row, err) in &outcome.failed {
                eprintln!("  ticket {}: {}", row.id, err);
            }
        }

        Command::Update { local_id } => {
            let ticket = engine.update_ticket(&local_id).await?;
            println!("updated: {}", ticket.id);
        }

        Command::Classifications { source_category_id } => {
            let outcome = engine
                .migrate_classifications_for_category(source_category_id)
                .await?;
            println!(
                "migrated: {}, failed: {}",
                outcome.migrated(),
                outcome.failures()
            );
        }

        Command::Files { ids, owner } => {
            let owner = owner.map(Owner::ticket);
            let report = engine.migrate_files(&ids, owner.as_ref()).await?;
            println!(
                "migrated: {}, skipped: {}, failed: {}",
                report.migrated.len(),
                report.skipped,
                report.failed.len()
            );
            for (row, err) in &report.failed {
                eprintln!("  file {}: {}", row.id, err);
            }
        }

        Command::Comments {
            source_owner_type,
            source_owner_id,
            owner,
        } => {
            let owner = Owner::ticket(owner);
            let outcome = engine
                .migrate_comments(&source_owner_type, source_owner_id, &owner)
                .await?;
            println!(
                "migrated: {}, failed: {}",
                outcome.migrated(),
                outcome.failures()
            );
        }

        Command::Lookup { kind, source_ref } => {
            match engine.lookup(kind, source_ref)? {
                Some(id) => println!("{kind} {source_ref} -> {id}"),
                None => println!("{kind} {source_ref} not migrated"),
            }
        }

        Command::Report { kind, json } => {
            let reports = match kind {
                Some(kind) => vec![engine.reconcile(kind)?],
                None => engine.reconcile_all()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
                return Ok(());
            }
            for report in reports {
                println!(
                    "{}: source={} target={} migrated={} pending={}",
                    report.kind,
                    report.source_total,
                    report.target_total,
                    report.migrated,
                    report.pending
                );
            }
        }

        Command::Help | Command::Version => unreachable!("handled in main"),
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"ticketport-cli - legacy helpdesk migration

USAGE:
    ticketport-cli [--config <path>] <command>

COMMANDS:
    ticket <source_id>                          Migrate one ticket by source id
    tickets [--from <rfc3339>] [--to <rfc3339>]
            [--classification <id>]             Migrate tickets matching a filter
    update <local_ticket_id>                    Refresh a migrated ticket from source
    classifications <source_category_id>        Migrate classifications for a category
    files <id[,id...]> [--owner <ticket_id>]    Transfer file payloads
    comments <owner_type> <owner_id>
             --owner <local_ticket_id>          Migrate comments for a source owner
    lookup <kind> <source_id>                   Print the local id a source record migrated to
    report [kind] [--json]                      Reconciliation counts
    help, version
"#
    );
}
