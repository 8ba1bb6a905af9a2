use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub age: Option<i64>,
    pub sex: Option<String>,
    pub body_fat_pct: Option<f64>,
    pub lean_mass_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_composition_label: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    /// The session gate requires name, height and weight before anything else.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.height_cm.is_some()
            && self.weight_kg.is_some()
    }

    #[must_use]
    pub fn has_body_comp(&self) -> bool {
        self.body_fat_pct.is_some()
    }
}

/// Patch applied to a profile; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub age: Option<i64>,
    pub sex: Option<String>,
    pub body_fat_pct: Option<f64>,
    pub lean_mass_multiplier: Option<f64>,
    pub body_composition_label: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.height_cm.is_none()
            && self.weight_kg.is_none()
            && self.age.is_none()
            && self.sex.is_none()
            && self.body_fat_pct.is_none()
            && self.lean_mass_multiplier.is_none()
            && self.body_composition_label.is_none()
    }

    /// Restrict a patch to the fields the conversation gate may change:
    /// body fat percentage and the body-type label. Everything else is dropped.
    #[must_use]
    pub fn body_comp_only(&self) -> Self {
        Self {
            body_fat_pct: self.body_fat_pct,
            body_composition_label: self.body_composition_label.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedEvent {
    pub id: i64,
    pub uuid: String,
    pub profile_id: String,
    pub event_date: String,
    pub event_type: String,
    pub name: String,
    pub amount: f64,
    pub unit: String,
    pub logged_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub id: i64,
    pub uuid: String,
    pub profile_id: String,
    pub event_date: String,
    pub event_type: String,
    pub name: String,
    pub amount: f64,
    pub unit: String,
    pub logged_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub validated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    #[serde(alias = "type")]
    pub event_type: String,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub logged_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossProjection {
    pub id: i64,
    pub profile_id: String,
    pub event_date: String,
    pub tbw_l: f64,
    pub tbw_loss_ml: i64,
    pub icf_loss_ml: i64,
    pub ecf_loss_ml: i64,
    pub isf_loss_ml: i64,
    pub ivf_loss_ml: i64,
    pub baseline_sodium_mg: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub action: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: i64,
    pub profile_id: String,
    pub event_date: String,
    pub items: Vec<RecommendationItem>,
    pub source: String,
    pub status: String,
    pub created_at: String,
}

/// Body-type reference row offered when a profile has no measured body fat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyCompOption {
    pub label: String,
    pub body_fat_pct: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<LossProjection>,
    pub staged: Vec<StagedEvent>,
    pub validated: Vec<ValidatedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanRecord>,
    pub fluid_in_ml: f64,
    pub sweat_loss_ml: f64,
    pub net_fluid_ml: f64,
    pub osmole_intake_mosm: f64,
}

pub const EVENT_TYPES: &[&str] = &["fluid", "food", "activity"];

pub const PLAN_STATUSES: &[&str] = &["proposed", "accepted", "rejected"];

/// Indoor-activity sweat rate used when an activity is logged in minutes
/// rather than as a measured sweat volume: 0.8 L per hour.
pub const SWEAT_RATE_ML_PER_MIN: f64 = 800.0 / 60.0;

pub fn validate_event_type(event_type: &str) -> Result<String> {
    let lower = event_type.to_lowercase();
    if EVENT_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid event type '{event_type}'. Must be one of: {}",
            EVENT_TYPES.join(", ")
        )
    }
}

/// Default display unit per event type: fluids in mL, foods in mOsm
/// (osmole load), activities in minutes.
#[must_use]
pub fn default_unit(event_type: &str) -> &'static str {
    match event_type {
        "fluid" => "ml",
        "food" => "mosm",
        _ => "min",
    }
}

pub fn validate_event(event: &NewEvent) -> Result<()> {
    validate_event_type(&event.event_type)?;
    if event.name.trim().is_empty() {
        bail!("Event name must not be empty");
    }
    if !event.amount.is_finite() || event.amount <= 0.0 {
        bail!("Event amount must be greater than 0");
    }
    Ok(())
}

/// Normalize a plan status: `accept`/`accepted` and `reject`/`rejected`
/// are both taken, matching the coach tool contract.
pub fn validate_plan_status(status: &str) -> Result<String> {
    match status.to_lowercase().as_str() {
        "accept" | "accepted" => Ok("accepted".to_string()),
        "reject" | "rejected" => Ok("rejected".to_string()),
        "proposed" => Ok("proposed".to_string()),
        _ => bail!(
            "Invalid plan status '{status}'. Must be one of: {}",
            PLAN_STATUSES.join(", ")
        ),
    }
}

pub fn validate_body_fat_pct(pct: f64) -> Result<()> {
    if !pct.is_finite() || pct <= 0.0 || pct >= 75.0 {
        bail!("Body fat percentage must be between 0 and 75");
    }
    Ok(())
}

pub fn validate_profile_update(update: &ProfileUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            bail!("Name must not be empty");
        }
    }
    if let Some(h) = update.height_cm {
        if !h.is_finite() || !(50.0..=280.0).contains(&h) {
            bail!("Height must be between 50 and 280 cm");
        }
    }
    if let Some(w) = update.weight_kg {
        if !w.is_finite() || !(20.0..=400.0).contains(&w) {
            bail!("Weight must be between 20 and 400 kg");
        }
    }
    if let Some(age) = update.age {
        if !(0..=130).contains(&age) {
            bail!("Age must be between 0 and 130");
        }
    }
    if let Some(bf) = update.body_fat_pct {
        validate_body_fat_pct(bf)?;
    }
    if let Some(m) = update.lean_mass_multiplier {
        if !m.is_finite() || !(0.4..=1.0).contains(&m) {
            bail!("Lean mass multiplier must be between 0.4 and 1.0");
        }
    }
    Ok(())
}

pub fn validate_event_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid event date '{date}'. Must be YYYY-MM-DD"))
}

/// Sweat volume in mL for an activity event: `min` amounts go through the
/// fixed indoor sweat rate, `ml` amounts are taken as measured.
#[must_use]
pub fn activity_sweat_ml(amount: f64, unit: &str) -> f64 {
    match unit {
        "ml" => amount,
        "l" => amount * 1000.0,
        _ => amount * SWEAT_RATE_ML_PER_MIN,
    }
}

/// Fluid volume in mL for a fluid event.
#[must_use]
pub fn fluid_volume_ml(amount: f64, unit: &str) -> f64 {
    match unit {
        "l" => amount * 1000.0,
        _ => amount,
    }
}
