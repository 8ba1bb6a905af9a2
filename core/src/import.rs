use std::collections::HashSet;
use std::io::Read;

use anyhow::{Context, Result, bail};

use crate::db::Database;
use crate::models::{NewEvent, validate_event};

/// A single row parsed from a hydration log CSV.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub date: String,
    pub event_type: String,
    pub name: String,
    pub amount: f64,
    pub unit: Option<String>,
    pub notes: Option<String>,
}

/// Summary of what an import would do / did.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub rows_parsed: usize,
    pub events_staged: usize,
    pub dates_spanned: usize,
}

/// Parse a hydration log CSV from any reader.
///
/// Expected header:
/// `Date,Type,Name,Amount,Unit,Notes`
///
/// Unit and Notes are optional.
pub fn parse_events_csv<R: Read>(reader: R) -> Result<Vec<EventRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    // Validate required columns
    let required = ["Date", "Type", "Name", "Amount"];
    for name in &required {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            bail!("Missing required column: {name}");
        }
    }

    // Build column index map (case-insensitive)
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_date = col("Date").context("Missing 'Date' column")?;
    let idx_type = col("Type").context("Missing 'Type' column")?;
    let idx_name = col("Name").context("Missing 'Name' column")?;
    let idx_amount = col("Amount").context("Missing 'Amount' column")?;
    let idx_unit = col("Unit");
    let idx_notes = col("Notes");

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;

        let date = record.get(idx_date).unwrap_or("").trim().to_string();
        let event_type = record.get(idx_type).unwrap_or("").trim().to_string();
        let name = record.get(idx_name).unwrap_or("").trim().to_string();

        if date.is_empty() || name.is_empty() {
            continue; // skip blank rows
        }

        let amount: f64 = record
            .get(idx_amount)
            .unwrap_or("")
            .trim()
            .parse()
            .with_context(|| format!("Invalid amount in CSV row {}", line_num + 2))?;

        let parse_opt = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        rows.push(EventRow {
            date,
            event_type,
            name,
            amount,
            unit: parse_opt(idx_unit),
            notes: parse_opt(idx_notes),
        });
    }

    Ok(rows)
}

/// Normalize a CSV date to YYYY-MM-DD format.
fn normalize_date(raw: &str) -> Result<String> {
    // Try YYYY-MM-DD first
    if chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() {
        return Ok(raw.to_string());
    }
    // Try M/D/YYYY
    if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Ok(d.format("%Y-%m-%d").to_string());
    }
    // Try D/M/YYYY
    if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Ok(d.format("%Y-%m-%d").to_string());
    }
    bail!("Cannot parse date: '{raw}'")
}

/// Stage parsed rows for a profile. Rows are validated either way; when
/// `dry_run` is true, nothing is written.
pub fn import_events(
    db: &Database,
    profile_id: &str,
    rows: &[EventRow],
    dry_run: bool,
) -> Result<ImportSummary> {
    let mut events_staged: usize = 0;
    let mut dates: HashSet<String> = HashSet::new();

    for row in rows {
        let date = normalize_date(&row.date)?;
        dates.insert(date.clone());

        let event = NewEvent {
            event_type: row.event_type.clone(),
            name: row.name.clone(),
            amount: row.amount,
            unit: row.unit.clone(),
            logged_at: None,
            notes: row.notes.clone(),
        };
        validate_event(&event)?;

        if !dry_run {
            let parsed_date = chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d")?;
            db.insert_staged_event(profile_id, parsed_date, &event)?;
        }
        events_staged += 1;
    }

    Ok(ImportSummary {
        rows_parsed: rows.len(),
        events_staged,
        dates_spanned: dates.len(),
    })
}
