use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use waterbar_core::compartments::{self, Action, CompartmentState, score_status};

pub(crate) fn cmd_dial(actions: &[String], json: bool) -> Result<()> {
    if actions.is_empty() {
        return show_baseline(json);
    }

    let parsed = actions
        .iter()
        .map(|s| Action::parse(s))
        .collect::<Result<Vec<_>>>()?;
    let report = compartments::simulate(&parsed);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct StepRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Action")]
        action: &'static str,
        #[tabled(rename = "Score")]
        score: i64,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let rows: Vec<StepRow> = report
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepRow {
            idx: i + 1,
            action: step.name,
            score: step.score,
            status: step.status,
        })
        .collect();

    println!("Starting score: {}", report.initial_score);
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!(
        "Final score: {} ({})",
        report.final_score, report.final_status
    );

    if !report.suggestions.is_empty() {
        let names: Vec<&str> = report.suggestions.iter().map(|a| a.name()).collect();
        println!("Suggested next: {}", names.join(", "));
    }

    Ok(())
}

fn show_baseline(json: bool) -> Result<()> {
    let state = CompartmentState::baseline();
    let score = state.hydration_score();

    if json {
        let listing: Vec<serde_json::Value> = Action::ALL
            .iter()
            .map(|a| {
                serde_json::json!({
                    "action": a,
                    "name": a.name(),
                    "description": a.description(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "score": score,
                "status": score_status(score),
                "actions": listing,
            }))?
        );
        return Ok(());
    }

    println!("Baseline hydration score: {score} ({})", score_status(score));
    println!();

    #[derive(Tabled)]
    struct ActionRow {
        #[tabled(rename = "Keyword")]
        keyword: String,
        #[tabled(rename = "Action")]
        action: &'static str,
        #[tabled(rename = "Effect")]
        effect: &'static str,
    }

    let rows: Vec<ActionRow> = Action::ALL
        .iter()
        .map(|a| ActionRow {
            keyword: format!("{a:?}").to_lowercase(),
            action: a.name(),
            effect: a.description(),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    println!("Try: waterbar dial water run electrolyte");

    Ok(())
}
