use anyhow::{Context, Result, bail};

use crate::models::{LossProjection, Profile, RecommendationItem, ValidatedEvent};
use crate::plan;

/// System message for the coaching model.
pub const SYSTEM_PROMPT: &str = "You are an expert hydration coach.";

/// Coaching heuristics passed to the model alongside the day's data.
pub const SCENARIO_NOTES: &[&str] = &[
    "Indoor cycling at moderate effort loses roughly 0.8 L of sweat per hour.",
    "Without a measured baseline, estimate a daily fluid target of 35 mL per kg of body weight.",
    "Sodium losses rise with sweat volume; salty snacks or electrolyte mixes cover the gap faster than food alone.",
];

/// Everything the advisor sees when asked for a day's plan.
pub struct PlanContext<'a> {
    pub profile: &'a Profile,
    pub events: &'a [ValidatedEvent],
    pub projection: Option<&'a LossProjection>,
    pub scenarios: &'a [&'static str],
}

/// Produces a day's recommended actions. Implementations may call out to a
/// model; callers always fall back to [`fallback_plan`] on error.
pub trait PlanAdvisor: Send + Sync {
    fn advise(&self, ctx: &PlanContext) -> Result<Vec<RecommendationItem>>;
}

/// Assemble the user prompt: profile, validated logs, loss trajectory, the
/// osmole library, and scenario notes, each as a JSON block.
pub fn build_plan_prompt(ctx: &PlanContext) -> Result<String> {
    let profile = serde_json::to_string(ctx.profile)?;
    let logs = serde_json::to_string(ctx.events)?;
    let trajectory = match ctx.projection {
        Some(projection) => serde_json::to_string(projection)?,
        None => "null".to_string(),
    };
    let library = serde_json::to_string(plan::OSMOLE_KB)?;
    let scenarios = serde_json::to_string(ctx.scenarios)?;

    Ok(format!(
        "User Profile: {profile}\n\
         Validated Logs: {logs}\n\
         Trajectory: {trajectory}\n\
         Hydration Library: {library}\n\
         Hydration Scenarios: {scenarios}\n\n\
         Based on the above, generate an actionable hydration plan for today \
         to help the user reach their fluid and sodium targets. Reply as a \
         JSON array of objects with {{action, reason}}."
    ))
}

/// Extract recommendations from a model reply. Models often wrap the JSON
/// in prose, so the first `[` .. last `]` span is tried before the whole
/// reply.
pub fn parse_recommendations(reply: &str) -> Result<Vec<RecommendationItem>> {
    let candidate = match (reply.find('['), reply.rfind(']')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply,
    };

    let items: Vec<RecommendationItem> = serde_json::from_str(candidate)
        .context("Coach reply was not a JSON array of {action, reason} objects")?;
    if items.is_empty() {
        bail!("Coach reply contained no recommendations");
    }
    for item in &items {
        if item.action.trim().is_empty() || item.reason.trim().is_empty() {
            bail!("Coach reply contained an empty recommendation");
        }
    }
    Ok(items)
}

/// The plan served when no advisor is configured or the advisor fails.
#[must_use]
pub fn fallback_plan() -> Vec<RecommendationItem> {
    vec![
        RecommendationItem {
            action: "Drink 500ml water with lunch".to_string(),
            reason: "Meet fluid target".to_string(),
        },
        RecommendationItem {
            action: "Add electrolyte tablet in afternoon".to_string(),
            reason: "Meet sodium target".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            name: Some("Deniz".to_string()),
            height_cm: Some(170.0),
            weight_kg: Some(70.0),
            age: Some(31),
            sex: None,
            body_fat_pct: Some(22.0),
            lean_mass_multiplier: None,
            body_composition_label: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_parse_bare_array() {
        let items = parse_recommendations(
            r#"[{"action": "Drink 400ml water", "reason": "Close the fluid gap"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].action, "Drink 400ml water");
    }

    #[test]
    fn test_parse_wrapped_in_prose() {
        let reply = "Sure! Here is today's plan:\n\
            [{\"action\": \"Drink 500ml water\", \"reason\": \"Fluid target\"},\n\
             {\"action\": \"Eat a banana\", \"reason\": \"Potassium target\"}]\n\
            Let me know how it goes.";
        let items = parse_recommendations(reply).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].action, "Eat a banana");
    }

    #[test]
    fn test_parse_rejects_prose_only() {
        assert!(parse_recommendations("Drink more water today.").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_array() {
        assert!(parse_recommendations("[]").is_err());
    }

    #[test]
    fn test_parse_rejects_blank_fields() {
        let reply = r#"[{"action": "", "reason": "Fluid target"}]"#;
        assert!(parse_recommendations(reply).is_err());
    }

    #[test]
    fn test_fallback_plan_is_fixed() {
        let plan = fallback_plan();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].action, "Drink 500ml water with lunch");
        assert_eq!(plan[0].reason, "Meet fluid target");
        assert_eq!(plan[1].action, "Add electrolyte tablet in afternoon");
        assert_eq!(plan[1].reason, "Meet sodium target");
    }

    #[test]
    fn test_prompt_sections() {
        let profile = test_profile();
        let ctx = PlanContext {
            profile: &profile,
            events: &[],
            projection: None,
            scenarios: SCENARIO_NOTES,
        };
        let prompt = build_plan_prompt(&ctx).unwrap();
        assert!(prompt.starts_with("User Profile: "));
        assert!(prompt.contains("\nValidated Logs: []"));
        assert!(prompt.contains("\nTrajectory: null"));
        assert!(prompt.contains("Hydration Library: "));
        assert!(prompt.contains("Coconut water"));
        assert!(prompt.contains("JSON array of objects with {action, reason}"));
    }
}
