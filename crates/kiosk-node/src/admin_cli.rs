//! kiosk-admin CLI tool
//!
//! Configures the campaign and runs resets and reports against a running
//! kiosk-node.
//!
//! Usage:
//!   kiosk-admin set-visibility <id,id,...>
//!   kiosk-admin set-label <category> <label>
//!   kiosk-admin set-amounts <category> <amount,amount,...>
//!   kiosk-admin set-target <category> <amount>
//!   kiosk-admin set-per-person <category> <amount>
//!   kiosk-admin set-capacity <amount>
//!   kiosk-admin set-start <YYYY-MM-DD|none>
//!   kiosk-admin set-sponsor <people|none> [item...]
//!   kiosk-admin reset-all | reset-ledger | rebuild-ledger
//!   kiosk-admin reset-category <category>
//!   kiosk-admin report [--category <id>] [--from <date>] [--to <date>]
//!   kiosk-admin progress
//!   kiosk-admin ping

use chrono::NaiveDate;
use kiosk_node::admin_socket::{default_socket_path, AdminCommand, AdminResponse};
use kiosk_node::desk::parse_amount;
use kiosk_node::Amount;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process;

fn print_usage() {
    eprintln!("kiosk-admin - Configure a running donation kiosk");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  kiosk-admin set-visibility <id,id,...>          Categories offered, in order");
    eprintln!("  kiosk-admin set-label <category> <label>        Rename a category");
    eprintln!("  kiosk-admin set-amounts <category> <a,b,...>    Preset amount tiles");
    eprintln!("  kiosk-admin set-target <category> <amount>      Appeal target");
    eprintln!("  kiosk-admin set-per-person <category> <amount>  Per person amount");
    eprintln!("  kiosk-admin set-capacity <amount>               Daily target per bucket");
    eprintln!("  kiosk-admin set-start <YYYY-MM-DD|none>         First campaign day");
    eprintln!("  kiosk-admin set-sponsor <people|none> [item...] What one full day provides");
    eprintln!("  kiosk-admin reset-all                           Clear all records and progress");
    eprintln!("  kiosk-admin reset-category <category>           Clear one category");
    eprintln!("  kiosk-admin reset-ledger                        Zero the bucket totals");
    eprintln!("  kiosk-admin rebuild-ledger                      Recompute bucket totals from records");
    eprintln!("  kiosk-admin report [--category <id>] [--from <date>] [--to <date>]");
    eprintln!("  kiosk-admin progress                            Campaign progress");
    eprintln!("  kiosk-admin ping                                Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  KIOSK_SOCKET    Path to admin socket (default: $KIOSK_DATA_DIR/admin.sock)");
    eprintln!("  KIOSK_DATA_DIR  Daemon data directory (default: ./kiosk-data)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("KIOSK_SOCKET").map(PathBuf::from).unwrap_or_else(|_| {
        let data_dir = std::env::var("KIOSK_DATA_DIR").unwrap_or_else(|_| "./kiosk-data".to_string());
        default_socket_path(Path::new(&data_dir))
    })
}

fn send_command(cmd: &AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to kiosk-node at {:?}: {}\n\
             Is the kiosk-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> &'a str {
    match args.get(index) {
        Some(value) => value,
        None => fail(&format!("{} requires a {} argument", args[1], what)),
    }
}

fn amount(raw: &str) -> Amount {
    parse_amount(raw).unwrap_or_else(|e| fail(&e.to_string()))
}

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .unwrap_or_else(|_| fail(&format!("not a YYYY-MM-DD date: {}", raw)))
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn category_patch(id: &str) -> AdminCommand {
    AdminCommand::UpdateCategory {
        id: id.to_string(),
        label: None,
        subtitle: None,
        amounts: None,
        quote: None,
        per_person: None,
        target: None,
    }
}

fn schedule() -> AdminCommand {
    AdminCommand::SetSchedule {
        bucket_capacity: None,
        campaign_start: None,
        sponsor_people: None,
        sponsor_items: None,
    }
}

fn parse_command(args: &[String]) -> AdminCommand {
    match args[1].as_str() {
        "set-visibility" => AdminCommand::SetVisibility {
            categories: list(arg(args, 2, "category list")),
        },
        "set-label" => {
            let mut cmd = category_patch(arg(args, 2, "category"));
            if let AdminCommand::UpdateCategory { label, .. } = &mut cmd {
                *label = Some(arg(args, 3, "label").to_string());
            }
            cmd
        }
        "set-amounts" => {
            let mut cmd = category_patch(arg(args, 2, "category"));
            if let AdminCommand::UpdateCategory { amounts, .. } = &mut cmd {
                *amounts = Some(list(arg(args, 3, "amount list")).iter().map(|a| amount(a)).collect());
            }
            cmd
        }
        "set-target" => {
            let mut cmd = category_patch(arg(args, 2, "category"));
            if let AdminCommand::UpdateCategory { target, .. } = &mut cmd {
                *target = Some(amount(arg(args, 3, "amount")));
            }
            cmd
        }
        "set-per-person" => {
            let mut cmd = category_patch(arg(args, 2, "category"));
            if let AdminCommand::UpdateCategory { per_person, .. } = &mut cmd {
                *per_person = Some(amount(arg(args, 3, "amount")));
            }
            cmd
        }
        "set-capacity" => {
            let mut cmd = schedule();
            if let AdminCommand::SetSchedule { bucket_capacity, .. } = &mut cmd {
                *bucket_capacity = Some(amount(arg(args, 2, "amount")));
            }
            cmd
        }
        "set-start" => {
            let mut cmd = schedule();
            if let AdminCommand::SetSchedule { campaign_start, .. } = &mut cmd {
                *campaign_start = Some(match arg(args, 2, "date") {
                    "none" => None,
                    raw => Some(date(raw)),
                });
            }
            cmd
        }
        "set-sponsor" => {
            let people = match arg(args, 2, "people count") {
                "none" => None,
                raw => Some(
                    raw.parse::<u32>()
                        .ok()
                        .filter(|&p| p > 0)
                        .unwrap_or_else(|| fail("people count must be a positive number")),
                ),
            };
            let mut cmd = schedule();
            if let AdminCommand::SetSchedule {
                sponsor_people,
                sponsor_items,
                ..
            } = &mut cmd
            {
                *sponsor_people = Some(people);
                if args.len() > 3 {
                    *sponsor_items = Some(args[3..].to_vec());
                }
            }
            cmd
        }
        "reset-all" => AdminCommand::ResetAll,
        "reset-category" => AdminCommand::ResetCategory {
            id: arg(args, 2, "category").to_string(),
        },
        "reset-ledger" => AdminCommand::ResetLedger,
        "rebuild-ledger" => AdminCommand::RebuildLedger,
        "report" => {
            let (mut category, mut from, mut to) = (None, None, None);
            let mut i = 2;
            while i < args.len() {
                let value = arg(args, i + 1, &args[i]);
                match args[i].as_str() {
                    "--category" => category = Some(value.to_string()),
                    "--from" => from = Some(date(value)),
                    "--to" => to = Some(date(value)),
                    other => fail(&format!("unknown report option {}", other)),
                }
                i += 2;
            }
            AdminCommand::Report { category, from, to }
        }
        "progress" => AdminCommand::Progress,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let cmd = parse_command(&args);

    match send_command(&cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => fail(&error),
            AdminResponse::Report { report } => {
                if report.records.is_empty() {
                    println!("(none)");
                }
                for record in &report.records {
                    println!(
                        "{}  {:<20} {:>8}  {}",
                        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        record.category_label,
                        record.amount,
                        record.id
                    );
                }
                println!("Total: {} ({} records)", report.total, report.records.len());
            }
            AdminResponse::Progress { progress } => {
                let buckets = progress.buckets;
                println!(
                    "Buckets: {}/{} funded, {} of {} raised ({}%)",
                    buckets.funded_buckets,
                    buckets.buckets,
                    buckets.total_raised,
                    buckets.target_total,
                    progress.percent_funded
                );
                if buckets.excess > 0 {
                    println!("Excess over target: {}", buckets.excess);
                }
                for target in progress.targets {
                    println!(
                        "{}: {} of {} ({}%)",
                        target.label, target.raised, target.target, target.percent_funded
                    );
                }
            }
            AdminResponse::Ledger { progress } => {
                println!(
                    "Ledger rebuilt: {} raised, {}/{} buckets funded",
                    progress.total_raised, progress.funded_buckets, progress.buckets
                );
            }
            AdminResponse::Pong => {
                println!("pong - kiosk-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
