use anyhow::{Context, Result};

use waterbar_core::models::{NewEvent, validate_event_type};
use waterbar_core::service::WaterBarService;

use super::helpers::{format_amount, parse_amount_with_unit, parse_date};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log(
    service: &WaterBarService,
    profile_id: &str,
    event_type: &str,
    name: &str,
    amount_str: &str,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let event_type = validate_event_type(event_type)?;
    let (amount, unit) = parse_amount_with_unit(amount_str)?;
    let date = parse_date(date)?;

    let event = NewEvent {
        event_type,
        name: name.to_string(),
        amount,
        unit,
        logged_at: None,
        notes,
    };
    let staged = service.stage_events(profile_id, date, &[event])?;
    let entry = staged.into_iter().next().context("Event was not staged")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let date = &entry.event_date;
        let kind = &entry.event_type;
        let name = &entry.name;
        let amount = format_amount(entry.amount);
        let unit = &entry.unit;
        println!("Staged: {kind} '{name}' {amount} {unit} for {date}");
    }

    Ok(())
}
