use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use waterbar_core::coach::PlanAdvisor;
use waterbar_core::models::{PlanRecord, activity_sweat_ml, fluid_volume_ml};
use waterbar_core::plan::{self, PlanInput, PlanLogEvent};
use waterbar_core::service::WaterBarService;

use crate::coach::CoachClient;
use crate::config::CoachSettings;

use super::helpers::{no_neg_zero, parse_date, truncate};

pub(crate) fn cmd_plan(
    service: &WaterBarService,
    profile_id: &str,
    height: Option<f64>,
    weight: Option<f64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let profile = service.profile(profile_id)?;

    let height_cm = height.or(profile.height_cm).context(
        "No height on file. Set one with 'waterbar profile set --height' or pass --height",
    )?;
    let weight_kg = weight.or(profile.weight_kg).context(
        "No weight on file. Set one with 'waterbar profile set --weight' or pass --weight",
    )?;

    // The day's validated events feed the plan; with nothing validated the
    // calculation falls back to its default intake basket.
    let validated = service.validated_events(profile_id, date)?;
    let log: Option<Vec<PlanLogEvent>> = if validated.is_empty() {
        None
    } else {
        Some(
            validated
                .iter()
                .map(|e| PlanLogEvent {
                    event_type: e.event_type.clone(),
                    amount: match e.event_type.as_str() {
                        "fluid" => fluid_volume_ml(e.amount, &e.unit),
                        _ => e.amount,
                    },
                    sodium_mg: None,
                    potassium_mg: None,
                    sweat_loss_ml: match e.event_type.as_str() {
                        "activity" => Some(activity_sweat_ml(e.amount, &e.unit)),
                        _ => None,
                    },
                })
                .collect(),
        )
    };
    let had_log = log.is_some();

    let input = PlanInput {
        height_cm,
        weight_kg,
        age: profile.age,
        sex: profile.sex.clone(),
        log,
    };
    let summary = plan::compute_plan(&input);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct MetricRow {
        #[tabled(rename = "Metric")]
        metric: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let rows = vec![
        MetricRow {
            metric: "Fluid target",
            value: format!("{} mL", summary.fluids_target_ml),
        },
        MetricRow {
            metric: "Sodium target",
            value: format!("{} mg", summary.na_target_mg),
        },
        MetricRow {
            metric: "Potassium target",
            value: format!("{} mg", summary.k_target_mg),
        },
        MetricRow {
            metric: "Magnesium target",
            value: format!("{} mg", summary.mg_target_mg),
        },
        MetricRow {
            metric: "Total body water",
            value: format!("{:.1} L", summary.tbw_l),
        },
        MetricRow {
            metric: "Osmole intake",
            value: format!("{:.0} mOsm", summary.osmole_intake_mosm),
        },
        MetricRow {
            metric: "Osmole adjustment",
            value: format!("+{} mL", summary.osmole_adjustment_ml),
        },
    ];

    println!("Hydration plan for {date}");
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if had_log {
        println!();
        println!("Logged so far:");
        println!(
            "  Net fluid balance:   {:.0} mL",
            no_neg_zero(summary.net_fluid_balance_ml)
        );
        println!(
            "  Remaining fluid:     {:.0} mL",
            no_neg_zero(summary.remaining_fluid_ml)
        );
        println!(
            "  Remaining sodium:    {:.0} mg",
            no_neg_zero(summary.remaining_sodium_mg)
        );
        println!(
            "  Remaining potassium: {:.0} mg",
            no_neg_zero(summary.remaining_potassium_mg)
        );
    }

    println!();
    println!("{}", summary.explanation);

    Ok(())
}

pub(crate) fn cmd_coach(
    service: &WaterBarService,
    profile_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    // Creates the profile row if this is a fresh database.
    service.profile(profile_id)?;

    let client = CoachSettings::from_env().map(|settings| CoachClient::new(&settings));
    if client.is_none() && !json {
        eprintln!("Coach not configured (set WATERBAR_COACH_KEY); using the static fallback plan.");
    }

    let plan = service.generate_plan(
        client.as_ref().map(|c| c as &dyn PlanAdvisor),
        profile_id,
        date,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_plan_record(&plan);
    if plan.status == "proposed" {
        println!("Accept with 'waterbar plan accept {}'.", plan.id);
    }

    Ok(())
}

pub(crate) fn cmd_plan_status(
    service: &WaterBarService,
    plan_id: i64,
    status: &str,
    json: bool,
) -> Result<()> {
    let plan = service.set_plan_status(plan_id, status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Plan #{} is now {}.", plan.id, plan.status);
    }

    Ok(())
}

pub(super) fn print_plan_record(plan: &PlanRecord) {
    println!(
        "Plan #{} for {} (source: {}, status: {})",
        plan.id, plan.event_date, plan.source, plan.status
    );

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Action")]
        action: String,
        #[tabled(rename = "Reason")]
        reason: String,
    }

    let rows: Vec<ItemRow> = plan
        .items
        .iter()
        .map(|item| ItemRow {
            action: truncate(&item.action, 40),
            reason: truncate(&item.reason, 60),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}
