use anyhow::Result;
use std::process;

use waterbar_core::service::WaterBarService;
use waterbar_core::session::{Session, Step};

use super::helpers::{json_error, parse_date};

pub(crate) fn cmd_session_start(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let (session, created) = service.start_session(profile_id, date)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "session": session,
                "created": created,
            }))?
        );
        return Ok(());
    }

    if created {
        println!("Session started for {date}.");
    } else {
        println!("Rejoined the session for {date}.");
    }
    print_session(&session);

    Ok(())
}

pub(crate) fn cmd_session_status(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let Some(session) = service.session(profile_id, date)? else {
        if json {
            println!("{}", json_error(&format!("No session for {date}")));
        } else {
            eprintln!("No session for {date}. Start one with 'waterbar session start'.");
        }
        process::exit(2);
    };

    let staged = service.staged_events(profile_id, date)?;
    let validated = service.validated_events(profile_id, date)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "session": session,
                "staged_count": staged.len(),
                "validated_count": validated.len(),
            }))?
        );
        return Ok(());
    }

    println!("Session for {date}:");
    print_session(&session);
    println!("  Staged:    {}", staged.len());
    println!("  Validated: {}", validated.len());

    Ok(())
}

pub(crate) fn cmd_session_reset(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    service.reset_session(profile_id, date)?;
    let (session, _) = service.start_session(profile_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("Session for {date} reset. Staged events discarded, validated history kept.");
    print_session(&session);

    Ok(())
}

fn print_session(session: &Session) {
    println!("  Step:      {}", session.step.as_str());
    println!("  Next:      {}", step_hint(session.step));
}

fn step_hint(step: Step) -> &'static str {
    match step {
        Step::AwaitingProfile => {
            "complete the profile (waterbar profile set --name ... --height ... --weight ...)"
        }
        Step::AwaitingBodyComp => {
            "pick a body type (waterbar profile set --body-type lean|athletic|average|soft)"
        }
        Step::AwaitingIntake => {
            "log the day's events (waterbar log), then confirm them (waterbar validate)"
        }
        Step::ReadyForPlan => "generate recommendations (waterbar coach)",
        Step::PlanGenerated => "review the plan (waterbar summary), then waterbar plan accept <id>",
    }
}
