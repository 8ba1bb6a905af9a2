use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::Profile;
use crate::plan::DAILY_TURNOVER_FRACTION;

/// Assumed body fat percentage when the profile has none recorded.
pub const DEFAULT_BODY_FAT_PCT: f64 = 22.0;

/// Assumed weight when the profile has none recorded.
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

/// Fraction of lean mass that is water.
pub const DEFAULT_LEAN_MASS_MULTIPLIER: f64 = 0.73;

/// Share of daily water turnover drawn from inside cells.
pub const ICF_SHARE: f64 = 0.66;

/// Share of daily water turnover drawn from extracellular fluid.
pub const ECF_SHARE: f64 = 0.34;

/// Interstitial share of the extracellular loss.
pub const ISF_OF_ECF: f64 = 0.75;

/// Intravascular share of the extracellular loss.
pub const IVF_OF_ECF: f64 = 0.25;

/// Nominal plasma sodium concentration in mmol/L.
pub const PLASMA_SODIUM_MMOL_PER_L: f64 = 140.0;

/// Molar mass of sodium, mg per mmol.
pub const SODIUM_MG_PER_MMOL: f64 = 23.0;

/// Where a day's conversation stands. Each session advances through these
/// in order, gated on what the profile and event log actually contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitingProfile,
    AwaitingBodyComp,
    AwaitingIntake,
    ReadyForPlan,
    PlanGenerated,
}

impl Step {
    #[must_use]
    pub fn initial() -> Self {
        Step::AwaitingProfile
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Step::AwaitingProfile => "awaiting_profile",
            Step::AwaitingBodyComp => "awaiting_body_comp",
            Step::AwaitingIntake => "awaiting_intake",
            Step::ReadyForPlan => "ready_for_plan",
            Step::PlanGenerated => "plan_generated",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "awaiting_profile" => Ok(Step::AwaitingProfile),
            "awaiting_body_comp" => Ok(Step::AwaitingBodyComp),
            "awaiting_intake" => Ok(Step::AwaitingIntake),
            "ready_for_plan" => Ok(Step::ReadyForPlan),
            "plan_generated" => Ok(Step::PlanGenerated),
            _ => bail!("Unknown session step '{s}'"),
        }
    }
}

/// One tracked day for one profile. `step` is the persisted gate position;
/// every transition is written back before the response goes out.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub profile_id: String,
    pub event_date: String,
    pub step: Step,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-compartment projection of today's expected water turnover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossFigures {
    pub tbw_l: f64,
    pub tbw_loss_ml: i64,
    pub icf_loss_ml: i64,
    pub ecf_loss_ml: i64,
    pub isf_loss_ml: i64,
    pub ivf_loss_ml: i64,
    pub baseline_sodium_mg: i64,
}

impl LossFigures {
    #[must_use]
    pub fn baseline_message(&self) -> String {
        format!(
            "Baseline calculated: TBW {:.2} L, target {} mL, sodium {} mg.",
            self.tbw_l, self.tbw_loss_ml, self.baseline_sodium_mg
        )
    }
}

/// Project expected daily losses from lean body mass. Missing profile
/// fields fall back to population defaults so a session can always start.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn project_losses(profile: &Profile) -> LossFigures {
    let body_fat_pct = profile.body_fat_pct.unwrap_or(DEFAULT_BODY_FAT_PCT);
    let weight_kg = profile.weight_kg.unwrap_or(DEFAULT_WEIGHT_KG);
    let multiplier = profile
        .lean_mass_multiplier
        .unwrap_or(DEFAULT_LEAN_MASS_MULTIPLIER);

    let lean_mass_kg = weight_kg * (1.0 - body_fat_pct / 100.0);
    let tbw_l = lean_mass_kg * multiplier;
    let tbw_loss_ml = (tbw_l * DAILY_TURNOVER_FRACTION * 1000.0).round() as i64;

    let icf_loss_ml = (tbw_loss_ml as f64 * ICF_SHARE).round() as i64;
    let ecf_loss_ml = (tbw_loss_ml as f64 * ECF_SHARE).round() as i64;
    let isf_loss_ml = (ecf_loss_ml as f64 * ISF_OF_ECF).round() as i64;
    let ivf_loss_ml = (ecf_loss_ml as f64 * IVF_OF_ECF).round() as i64;

    let baseline_sodium_mg =
        (tbw_l * PLASMA_SODIUM_MMOL_PER_L * SODIUM_MG_PER_MMOL).round() as i64;

    LossFigures {
        tbw_l,
        tbw_loss_ml,
        icf_loss_ml,
        ecf_loss_ml,
        isf_loss_ml,
        ivf_loss_ml,
        baseline_sodium_mg,
    }
}
