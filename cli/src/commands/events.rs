use anyhow::Result;
use std::process;

use waterbar_core::service::WaterBarService;

use super::helpers::{json_error, parse_date, print_staged_table, print_validated_table};

pub(crate) fn cmd_events(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let staged = service.staged_events(profile_id, date)?;
    let validated = service.validated_events(profile_id, date)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "staged": staged,
                "validated": validated,
            }))?
        );
        return Ok(());
    }

    if staged.is_empty() && validated.is_empty() {
        eprintln!("No events for {date}");
        process::exit(2);
    }

    if !validated.is_empty() {
        println!("Validated:");
        print_validated_table(&validated);
    }
    if !staged.is_empty() {
        println!("Staged (pending validation):");
        print_staged_table(&staged);
    }

    Ok(())
}

pub(crate) fn cmd_validate(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let staged = service.staged_events(profile_id, date)?;

    if staged.is_empty() {
        if json {
            println!("{}", json_error(&format!("No staged events for {date}")));
        } else {
            eprintln!("No staged events for {date}");
        }
        process::exit(2);
    }

    let moved = staged.len();
    let validated = service.validate_day(profile_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&validated)?);
    } else {
        println!("Validated {moved} event(s) for {date}.");
        print_validated_table(&validated);
    }

    Ok(())
}
