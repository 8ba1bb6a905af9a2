use std::path::Path;

use anyhow::{Context, Result};

use waterbar_core::import::parse_events_csv;
use waterbar_core::service::WaterBarService;

pub(crate) fn cmd_import(
    service: &WaterBarService,
    profile_id: &str,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let rows = parse_events_csv(file)?;

    if rows.is_empty() {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No rows found in CSV file" })
            );
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    let summary = service.import_events(profile_id, &rows, dry_run)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "dry_run": dry_run,
                "rows_parsed": summary.rows_parsed,
                "events_staged": summary.events_staged,
                "dates_spanned": summary.dates_spanned,
            })
        );
    } else if dry_run {
        println!("Dry run: no changes made.\n");
        println!("  Rows parsed:     {}", summary.rows_parsed);
        println!("  Events to stage: {}", summary.events_staged);
        println!("  Dates spanned:   {}", summary.dates_spanned);
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed:   {}", summary.rows_parsed);
        println!("  Events staged: {}", summary.events_staged);
        println!("  Dates spanned: {}", summary.dates_spanned);
        println!("\nStaged events await validation. Confirm them with 'waterbar validate'.");
    }

    Ok(())
}
