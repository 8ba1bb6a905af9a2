use anyhow::Result;
use std::process;

use waterbar_core::service::WaterBarService;

use super::helpers::{no_neg_zero, parse_date, print_staged_table, print_validated_table};
use super::plan::print_plan_record;

pub(crate) fn cmd_summary(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let summary = service.day_summary(profile_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.step.is_none()
        && summary.staged.is_empty()
        && summary.validated.is_empty()
        && summary.plan.is_none()
    {
        let date = &summary.date;
        eprintln!("No activity for {date}");
        process::exit(2);
    }

    let date = &summary.date;
    println!("=== {date} ===\n");

    if let Some(step) = &summary.step {
        println!("  Session step: {step}");
    }

    if let Some(projection) = &summary.projection {
        let tbw = projection.tbw_l;
        let loss = projection.tbw_loss_ml;
        println!("  Projected losses: {loss} mL of {tbw:.1} L total body water");
        println!(
            "    ICF {} mL | ECF {} mL (ISF {} / IVF {})",
            projection.icf_loss_ml,
            projection.ecf_loss_ml,
            projection.isf_loss_ml,
            projection.ivf_loss_ml
        );
        println!("    Baseline sodium: {} mg", projection.baseline_sodium_mg);
    }
    println!();

    if !summary.validated.is_empty() {
        println!("  Validated events:");
        print_validated_table(&summary.validated);
    }
    if !summary.staged.is_empty() {
        println!("  Staged (pending validation):");
        print_staged_table(&summary.staged);
    }

    let fluid = summary.fluid_in_ml;
    let sweat = summary.sweat_loss_ml;
    let net = no_neg_zero(summary.net_fluid_ml);
    let osmoles = summary.osmole_intake_mosm;
    println!(
        "  TOTAL: {fluid:.0} mL in | {sweat:.0} mL sweat | net {net:.0} mL | {osmoles:.0} mOsm"
    );

    if let Some(plan) = &summary.plan {
        println!();
        print_plan_record(plan);
    }

    Ok(())
}
