use serde::{Deserialize, Serialize};

/// Fraction of body weight that is water in the plan estimate.
pub const BODY_WATER_FRACTION: f64 = 0.6;

/// Fraction of total body water turned over per day.
pub const DAILY_TURNOVER_FRACTION: f64 = 0.07;

pub const SODIUM_TARGET_MG: i64 = 1500;
pub const POTASSIUM_TARGET_MG: i64 = 3500;
pub const MAGNESIUM_TARGET_MG: i64 = 400;

/// Osmole intake considered baseline; only the excess drives extra fluid.
pub const OSMOLE_BASELINE_MOSM: f64 = 500.0;

/// Extra fluid per 100 mOsm above baseline.
pub const FLUID_ML_PER_100_MOSM: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HydrationEffect {
    Hydrating,
    Neutral,
    Dehydrating,
}

/// One reference serving from the osmole knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct KbEntry {
    pub name: &'static str,
    pub osmoles_mosm: f64,
    pub effect: HydrationEffect,
}

/// Representative servings from the hydration and beverage knowledge bases.
pub const OSMOLE_KB: &[KbEntry] = &[
    KbEntry {
        name: "Water (250ml)",
        osmoles_mosm: 0.0,
        effect: HydrationEffect::Hydrating,
    },
    KbEntry {
        name: "Coconut water (240ml)",
        osmoles_mosm: 102.0,
        effect: HydrationEffect::Hydrating,
    },
    KbEntry {
        name: "Ayran (250ml)",
        osmoles_mosm: 137.0,
        effect: HydrationEffect::Hydrating,
    },
    KbEntry {
        name: "Whole milk (244ml)",
        osmoles_mosm: 93.0,
        effect: HydrationEffect::Hydrating,
    },
    KbEntry {
        name: "Banana (100g)",
        osmoles_mosm: 145.0,
        effect: HydrationEffect::Neutral,
    },
    KbEntry {
        name: "Dates (dried, 100g)",
        osmoles_mosm: 413.0,
        effect: HydrationEffect::Dehydrating,
    },
    KbEntry {
        name: "Cola (355ml)",
        osmoles_mosm: 600.0,
        effect: HydrationEffect::Neutral,
    },
    KbEntry {
        name: "ORS (200ml)",
        osmoles_mosm: 25.0,
        effect: HydrationEffect::Hydrating,
    },
];

/// Osmole load of the fallback day used when no intake has been logged:
/// two waters, a coconut water, whole milk, a banana, dried dates and a cola.
#[must_use]
pub fn default_basket_osmoles() -> f64 {
    let find = |prefix: &str| {
        OSMOLE_KB
            .iter()
            .find(|e| e.name.starts_with(prefix))
            .map_or(0.0, |e| e.osmoles_mosm)
    };
    2.0 * find("Water")
        + find("Coconut water")
        + find("Whole milk")
        + find("Banana")
        + find("Dates")
        + find("Cola")
}

/// One logged event as the plan calculation sees it. `amount` is mL for
/// fluids and mOsm for foods; activities report measured losses directly.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanLogEvent {
    #[serde(alias = "type")]
    pub event_type: String,
    pub amount: f64,
    #[serde(default)]
    pub sodium_mg: Option<f64>,
    #[serde(default)]
    pub potassium_mg: Option<f64>,
    #[serde(default)]
    pub sweat_loss_ml: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub sex: Option<String>,
    /// `None` falls back to the default basket; an empty log counts as zero intake.
    #[serde(default)]
    pub log: Option<Vec<PlanLogEvent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub fluids_target_ml: i64,
    pub na_target_mg: i64,
    pub k_target_mg: i64,
    pub mg_target_mg: i64,
    pub tbw_l: f64,
    pub base_fluid_ml: f64,
    pub osmole_intake_mosm: f64,
    pub osmole_adjustment_ml: i64,
    pub hydrating_options: Vec<String>,
    pub explanation: String,
    pub net_fluid_balance_ml: f64,
    pub remaining_fluid_ml: f64,
    pub remaining_sodium_mg: f64,
    pub remaining_potassium_mg: f64,
}

/// Deterministic daily hydration plan from profile figures and an optional log.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_plan(input: &PlanInput) -> PlanSummary {
    let tbw = input.weight_kg * BODY_WATER_FRACTION;
    let base_fluid_ml = tbw * DAILY_TURNOVER_FRACTION * 1000.0;

    let mut osmole_intake = 0.0;
    let mut fluid_in = 0.0;
    let mut sodium_in = 0.0;
    let mut potassium_in = 0.0;
    let mut sweat_loss = 0.0;

    if let Some(log) = &input.log {
        for event in log {
            match event.event_type.as_str() {
                "fluid" => fluid_in += event.amount,
                "food" => osmole_intake += event.amount,
                "activity" => {
                    sweat_loss += event.sweat_loss_ml.unwrap_or(0.0);
                    sodium_in += event.sodium_mg.unwrap_or(0.0);
                    potassium_in += event.potassium_mg.unwrap_or(0.0);
                }
                _ => {}
            }
        }
    } else {
        osmole_intake = default_basket_osmoles();
    }

    let extra_osmoles = (osmole_intake - OSMOLE_BASELINE_MOSM).max(0.0);
    let osmole_adjustment = (extra_osmoles / 100.0 * FLUID_ML_PER_100_MOSM).round();
    let fluids_target_ml = (base_fluid_ml + osmole_adjustment).round() as i64;

    let net_fluid_balance_ml = fluid_in - sweat_loss;
    let remaining_fluid_ml = fluids_target_ml as f64 - net_fluid_balance_ml;
    let remaining_sodium_mg = SODIUM_TARGET_MG as f64 - sodium_in;
    let remaining_potassium_mg = POTASSIUM_TARGET_MG as f64 - potassium_in;

    let hydrating_options: Vec<String> = OSMOLE_KB
        .iter()
        .filter(|e| e.effect == HydrationEffect::Hydrating)
        .map(|e| e.name.to_string())
        .collect();

    let explanation = format!(
        "Based on your profile and estimated osmole intake (~{osmole_intake:.0} mOsm), \
         your fluid target is adjusted by +{osmole_adjustment:.0} mL. Prioritize hydrating \
         foods and drinks (e.g., {}). Avoid excess high-osmole foods (e.g., dates, cola) \
         if at risk of dehydration.",
        hydrating_options.join(", ")
    );

    PlanSummary {
        fluids_target_ml,
        na_target_mg: SODIUM_TARGET_MG,
        k_target_mg: POTASSIUM_TARGET_MG,
        mg_target_mg: MAGNESIUM_TARGET_MG,
        tbw_l: (tbw * 10.0).round() / 10.0,
        base_fluid_ml,
        osmole_intake_mosm: osmole_intake,
        osmole_adjustment_ml: osmole_adjustment as i64,
        hydrating_options,
        explanation,
        net_fluid_balance_ml,
        remaining_fluid_ml,
        remaining_sodium_mg,
        remaining_potassium_mg,
    }
}
