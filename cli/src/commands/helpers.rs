use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use waterbar_core::models::{StagedEvent, ValidatedEvent};

/// Parse an amount string with optional unit.
/// Accepts: "500", "500ml", "500 ml", "1.5l", "45min", etc.
/// The unit is passed through as typed; the core decides what it means
/// for the event type.
pub(crate) fn parse_amount_with_unit(s: &str) -> Result<(f64, Option<String>)> {
    let s = s.trim();

    // Bare number: "500" or "1.5"
    if let Ok(v) = s.parse::<f64>() {
        if !v.is_finite() || v <= 0.0 {
            bail!("Amount must be greater than 0");
        }
        return Ok((v, None));
    }

    // "N<unit>" with no space (e.g. "500ml", "45min")
    if let Some((qty, unit)) = split_number_unit(s) {
        if qty <= 0.0 {
            bail!("Amount must be greater than 0");
        }
        return Ok((qty, Some(unit.to_lowercase())));
    }

    // "<number> <unit>" format
    let parts: Vec<&str> = s.splitn(2, char::is_whitespace).collect();
    if parts.len() == 2 {
        let qty: f64 = parts[0]
            .parse()
            .with_context(|| format!("Invalid amount: '{s}'"))?;
        if qty <= 0.0 {
            bail!("Amount must be greater than 0");
        }
        return Ok((qty, Some(parts[1].trim().to_lowercase())));
    }

    bail!("Invalid amount format: '{s}'. Use '500', '500ml', '1.5l', '45min', etc.")
}

/// Split "500ml" or "45min" into (500.0, "ml") or (45.0, "min").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.parse().ok()?;
    if unit_part.is_empty() {
        return None;
    }
    Some((qty, unit_part))
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

fn event_table(rows: &[EventRow]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string()
}

pub(crate) fn print_staged_table(events: &[StagedEvent]) {
    let rows: Vec<EventRow> = events
        .iter()
        .map(|e| EventRow {
            id: e.id,
            event_type: e.event_type.clone(),
            name: truncate(&e.name, 30),
            amount: format_amount(e.amount),
            unit: e.unit.clone(),
            notes: e
                .notes
                .as_deref()
                .map(|n| truncate(n, 24))
                .unwrap_or_default(),
        })
        .collect();
    println!("{}", event_table(&rows));
}

pub(crate) fn print_validated_table(events: &[ValidatedEvent]) {
    let rows: Vec<EventRow> = events
        .iter()
        .map(|e| EventRow {
            id: e.id,
            event_type: e.event_type.clone(),
            name: truncate(&e.name, 30),
            amount: format_amount(e.amount),
            unit: e.unit.clone(),
            notes: e
                .notes
                .as_deref()
                .map(|n| truncate(n, 24))
                .unwrap_or_default(),
        })
        .collect();
    println!("{}", event_table(&rows));
}

/// Whole amounts print without a decimal point, fractional ones with one digit.
pub(crate) fn format_amount(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount_with_unit("500").unwrap(), (500.0, None));
        assert_eq!(parse_amount_with_unit("250.5").unwrap(), (250.5, None));
        assert_eq!(parse_amount_with_unit(" 300 ").unwrap(), (300.0, None));
    }

    #[test]
    fn test_parse_amount_with_unit() {
        assert_eq!(
            parse_amount_with_unit("500ml").unwrap(),
            (500.0, Some("ml".to_string()))
        );
        assert_eq!(
            parse_amount_with_unit("1.5l").unwrap(),
            (1.5, Some("l".to_string()))
        );
        assert_eq!(
            parse_amount_with_unit("45min").unwrap(),
            (45.0, Some("min".to_string()))
        );
        assert_eq!(
            parse_amount_with_unit("500 ml").unwrap(),
            (500.0, Some("ml".to_string()))
        );
        assert_eq!(
            parse_amount_with_unit("2 L").unwrap(),
            (2.0, Some("l".to_string()))
        );
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert!(parse_amount_with_unit("abc").is_err());
        assert!(parse_amount_with_unit("ml500").is_err());
        assert!(parse_amount_with_unit("").is_err());
    }

    #[test]
    fn test_parse_amount_zero_and_negative() {
        assert!(parse_amount_with_unit("0").is_err());
        assert!(parse_amount_with_unit("0ml").is_err());
        assert!(parse_amount_with_unit("-50").is_err());
        assert!(parse_amount_with_unit("-50ml").is_err());
    }

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(500.0), "500");
        assert_eq!(format_amount(1.5), "1.5");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        // Should not panic on multi-byte characters
        assert_eq!(truncate("Çaykur Rize çayı", 10), "Çaykur ...");
        assert_eq!(truncate("Ayran", 10), "Ayran");
        assert_eq!(truncate("経口補水液オーエスワン", 8), "経口補水液...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }
}
