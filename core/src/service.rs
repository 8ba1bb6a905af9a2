use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::coach::{self, PlanAdvisor, PlanContext};
use crate::db::Database;
use crate::import::{self, EventRow, ImportSummary};
use crate::models::{
    BodyCompOption, DaySummary, LossProjection, NewEvent, PlanRecord, Profile, ProfileUpdate,
    StagedEvent, ValidatedEvent, validate_event, validate_event_date, validate_profile_update,
};
use crate::session::{Session, Step, project_losses};

/// One `/api/responses` turn. Updates, events and the finalize flag are all
/// optional; a bare request just reports where the session stands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RespondRequest {
    #[serde(alias = "user_id")]
    pub profile_id: String,
    pub event_date: Option<String>,
    #[serde(default)]
    pub profile_updates: Option<ProfileUpdate>,
    #[serde(default)]
    pub events: Option<Vec<NewEvent>>,
    #[serde(default)]
    pub finalize: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepNote {
    pub label: String,
    pub message: String,
}

impl StepNote {
    fn new(label: &str, message: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondReply {
    pub step: Step,
    pub message: String,
    pub steps: Vec<StepNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<BodyCompOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanRecord>,
}

/// Arguments accepted by the coach tool surface. Each tool picks the fields
/// it needs and ignores the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolArgs {
    #[serde(alias = "user_id")]
    pub profile_id: Option<String>,
    pub event_date: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<NewEvent>>,
    pub plan_id: Option<i64>,
    pub status: Option<String>,
}

impl ToolArgs {
    fn require_profile(&self) -> Result<String> {
        self.profile_id
            .clone()
            .context("Missing profile_id argument")
    }
}

/// Every name [`WaterBarService::run_tool`] dispatches. Callers can check
/// against this list to reject unknown tools before dispatch.
pub const TOOL_NAMES: &[&str] = &[
    "reset_session",
    "log_event_batch",
    "validate_events",
    "recalculate_projection",
    "generate_plan",
    "update_plan_status",
    "get_user_profile",
];

/// What the user is told at each gate.
#[must_use]
pub fn step_message(step: Step) -> &'static str {
    match step {
        Step::AwaitingProfile => {
            "Please complete your profile (name, height and weight) so your baseline can be calculated."
        }
        Step::AwaitingBodyComp => {
            "Pick the body type that fits best, or provide a measured body fat percentage."
        }
        Step::AwaitingIntake => "Baseline ready. Log today's fluids, foods and activities.",
        Step::ReadyForPlan => "Events staged. Ask for a plan when you're done logging.",
        Step::PlanGenerated => "Today's plan is already generated.",
    }
}

fn resolve_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(d) => validate_event_date(d),
        None => Ok(Local::now().date_naive()),
    }
}

pub struct WaterBarService {
    db: Database,
}

impl WaterBarService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Profiles ---

    pub fn profile(&self, id: &str) -> Result<Profile> {
        self.db.ensure_profile(id)
    }

    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        validate_profile_update(update)?;
        self.db.ensure_profile(id)?;
        self.db.update_profile(id, update)
    }

    pub fn body_comp_options(&self) -> Result<Vec<BodyCompOption>> {
        self.db.body_comp_options()
    }

    // --- Sessions ---

    pub fn session(&self, profile_id: &str, date: NaiveDate) -> Result<Option<Session>> {
        self.db.get_session(profile_id, date)
    }

    pub fn start_session(&self, profile_id: &str, date: NaiveDate) -> Result<(Session, bool)> {
        self.db.ensure_profile(profile_id)?;
        self.db.start_session(profile_id, date)
    }

    pub fn reset_session(&self, profile_id: &str, date: NaiveDate) -> Result<()> {
        self.db.reset_session(profile_id, date)
    }

    // --- Events ---

    pub fn stage_events(
        &self,
        profile_id: &str,
        date: NaiveDate,
        events: &[NewEvent],
    ) -> Result<Vec<StagedEvent>> {
        self.db.ensure_profile(profile_id)?;
        let mut staged = Vec::with_capacity(events.len());
        for event in events {
            staged.push(self.db.insert_staged_event(profile_id, date, event)?);
        }
        Ok(staged)
    }

    pub fn staged_events(&self, profile_id: &str, date: NaiveDate) -> Result<Vec<StagedEvent>> {
        self.db.get_staged_events(profile_id, date)
    }

    pub fn validated_events(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ValidatedEvent>> {
        self.db.get_validated_events(profile_id, date)
    }

    pub fn validate_day(&self, profile_id: &str, date: NaiveDate) -> Result<Vec<ValidatedEvent>> {
        self.db.validate_events(profile_id, date)
    }

    pub fn import_events(
        &self,
        profile_id: &str,
        rows: &[EventRow],
        dry_run: bool,
    ) -> Result<ImportSummary> {
        self.db.ensure_profile(profile_id)?;
        import::import_events(&self.db, profile_id, rows, dry_run)
    }

    // --- Projections and plans ---

    pub fn projection(&self, profile_id: &str, date: NaiveDate) -> Result<Option<LossProjection>> {
        self.db.get_projection(profile_id, date)
    }

    pub fn recalculate_projection(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> Result<LossProjection> {
        let profile = self.db.ensure_profile(profile_id)?;
        let figures = project_losses(&profile);
        self.db.save_projection(profile_id, date, &figures)
    }

    pub fn latest_plan(&self, profile_id: &str, date: NaiveDate) -> Result<Option<PlanRecord>> {
        self.db.latest_plan(profile_id, date)
    }

    pub fn set_plan_status(&self, plan_id: i64, status: &str) -> Result<PlanRecord> {
        self.db.set_plan_status(plan_id, status)
    }

    pub fn day_summary(&self, profile_id: &str, date: NaiveDate) -> Result<DaySummary> {
        self.db.build_day_summary(profile_id, date)
    }

    /// Validate the day's staged events, make sure a projection exists, ask
    /// the advisor for recommendations, and store the result. Advisor
    /// failures degrade to the fixed fallback plan rather than erroring.
    pub fn generate_plan(
        &self,
        advisor: Option<&dyn PlanAdvisor>,
        profile_id: &str,
        date: NaiveDate,
    ) -> Result<PlanRecord> {
        let profile = self.db.get_profile(profile_id)?;
        let validated = self.db.validate_events(profile_id, date)?;
        let projection = match self.db.get_projection(profile_id, date)? {
            Some(projection) => projection,
            None => {
                let figures = project_losses(&profile);
                self.db.save_projection(profile_id, date, &figures)?
            }
        };

        let ctx = PlanContext {
            profile: &profile,
            events: &validated,
            projection: Some(&projection),
            scenarios: coach::SCENARIO_NOTES,
        };
        let (items, source) = match advisor {
            Some(advisor) => match advisor.advise(&ctx) {
                Ok(items) => (items, "coach"),
                Err(_) => (coach::fallback_plan(), "fallback"),
            },
            None => (coach::fallback_plan(), "fallback"),
        };

        let plan = self.db.insert_plan(profile_id, date, &items, source)?;
        if self.db.get_session(profile_id, date)?.is_some() {
            self.db.set_session_step(profile_id, date, Step::PlanGenerated)?;
        }
        Ok(plan)
    }

    // --- Conversation gate ---

    /// Drive one turn of the coaching conversation. The session's persisted
    /// step decides which gate applies; every transition is written back
    /// before the reply is returned.
    pub fn respond(
        &self,
        advisor: Option<&dyn PlanAdvisor>,
        req: &RespondRequest,
    ) -> Result<RespondReply> {
        let date = resolve_date(req.event_date.as_deref())?;
        self.db.ensure_profile(&req.profile_id)?;
        let (_, created) = self.db.start_session(&req.profile_id, date)?;

        let mut notes: Vec<StepNote> = Vec::new();
        if created {
            notes.push(StepNote::new(
                "session_started",
                format!("Session started for {}.", date.format("%Y-%m-%d")),
            ));
        }

        let no_input = req.profile_updates.is_none()
            && req.events.as_deref().is_none_or(<[NewEvent]>::is_empty)
            && !req.finalize;

        if !created && no_input {
            let session = self
                .db
                .get_session(&req.profile_id, date)?
                .context("Session missing")?;
            return Ok(RespondReply {
                step: session.step,
                message: "Session started and timeline already initialized.".to_string(),
                steps: notes,
                options: None,
                plan: None,
            });
        }

        // Only body composition may change through this surface
        if let Some(updates) = &req.profile_updates {
            let mut filtered = updates.body_comp_only();
            if !filtered.is_empty() {
                if let (Some(label), None) = (&filtered.body_composition_label, filtered.body_fat_pct)
                {
                    match self.db.get_body_comp_option(label)? {
                        Some(option) => {
                            filtered.body_fat_pct = Some(option.body_fat_pct);
                            filtered.body_composition_label = Some(option.label);
                        }
                        None => {
                            return Ok(RespondReply {
                                step: Step::AwaitingBodyComp,
                                message: format!(
                                    "Unknown body type '{label}'. Pick one of the options below."
                                ),
                                steps: notes,
                                options: Some(self.db.body_comp_options()?),
                                plan: None,
                            });
                        }
                    }
                }
                validate_profile_update(&filtered)?;
                self.db.update_profile(&req.profile_id, &filtered)?;
                notes.push(StepNote::new("profile_updated", "Body composition recorded."));
            }
        }

        let profile = self.db.get_profile(&req.profile_id)?;

        if !profile.is_complete() {
            self.db
                .set_session_step(&req.profile_id, date, Step::AwaitingProfile)?;
            return Ok(RespondReply {
                step: Step::AwaitingProfile,
                message: step_message(Step::AwaitingProfile).to_string(),
                steps: notes,
                options: None,
                plan: None,
            });
        }

        if !profile.has_body_comp() {
            self.db
                .set_session_step(&req.profile_id, date, Step::AwaitingBodyComp)?;
            return Ok(RespondReply {
                step: Step::AwaitingBodyComp,
                message: step_message(Step::AwaitingBodyComp).to_string(),
                steps: notes,
                options: Some(self.db.body_comp_options()?),
                plan: None,
            });
        }

        // Both gates passed: lock in the baseline projection once
        let mut session = self
            .db
            .get_session(&req.profile_id, date)?
            .context("Session missing")?;
        if matches!(session.step, Step::AwaitingProfile | Step::AwaitingBodyComp) {
            let figures = project_losses(&profile);
            self.db.save_projection(&req.profile_id, date, &figures)?;
            session = self
                .db
                .set_session_step(&req.profile_id, date, Step::AwaitingIntake)?;
            notes.push(StepNote::new("projection_updated", figures.baseline_message()));
        }

        if let Some(events) = &req.events {
            if !events.is_empty() {
                for event in events {
                    self.db.insert_staged_event(&req.profile_id, date, event)?;
                }
                notes.push(StepNote::new(
                    "batch_logged",
                    format!("Staged {} events for review.", events.len()),
                ));
                session = self
                    .db
                    .set_session_step(&req.profile_id, date, Step::ReadyForPlan)?;
            }
        }

        if req.finalize {
            let staged = self.db.get_staged_events(&req.profile_id, date)?;
            if !staged.is_empty() {
                notes.push(StepNote::new(
                    "batch_validated",
                    format!("Validated {} events.", staged.len()),
                ));
            }
            let plan = self.generate_plan(advisor, &req.profile_id, date)?;
            notes.push(StepNote::new(
                "plan_generated",
                format!("Generated a plan with {} recommendations.", plan.items.len()),
            ));
            return Ok(RespondReply {
                step: Step::PlanGenerated,
                message: "Your hydration plan for today is ready.".to_string(),
                steps: notes,
                options: None,
                plan: Some(plan),
            });
        }

        Ok(RespondReply {
            step: session.step,
            message: step_message(session.step).to_string(),
            steps: notes,
            options: None,
            plan: None,
        })
    }

    // --- Tool surface ---

    /// Dispatch one named tool call. The server exposes these through
    /// `/api/tools`; unknown names are an error the caller turns into a 400.
    pub fn run_tool(
        &self,
        advisor: Option<&dyn PlanAdvisor>,
        name: &str,
        args: &ToolArgs,
    ) -> Result<Value> {
        match name {
            "reset_session" => {
                let profile_id = args.require_profile()?;
                let date = resolve_date(args.event_date.as_deref())?;
                self.db.reset_session(&profile_id, date)?;
                self.db.ensure_profile(&profile_id)?;
                let (session, _) = self.db.start_session(&profile_id, date)?;
                Ok(json!({
                    "message": "Session reset.",
                    "step": session.step,
                }))
            }
            "log_event_batch" => {
                let profile_id = args.require_profile()?;
                let date = resolve_date(args.event_date.as_deref())?;
                let events = args.events.clone().unwrap_or_default();
                if events.is_empty() {
                    bail!("No events provided");
                }
                for event in &events {
                    validate_event(event)?;
                }
                let staged = self.stage_events(&profile_id, date, &events)?;
                Ok(json!({
                    "staged": staged.len(),
                    "events": staged,
                }))
            }
            "validate_events" => {
                let profile_id = args.require_profile()?;
                let date = resolve_date(args.event_date.as_deref())?;
                let validated = self.db.validate_events(&profile_id, date)?;
                Ok(json!({
                    "validated": validated.len(),
                    "events": validated,
                }))
            }
            "recalculate_projection" => {
                let profile_id = args.require_profile()?;
                let date = resolve_date(args.event_date.as_deref())?;
                let projection = self.recalculate_projection(&profile_id, date)?;
                Ok(serde_json::to_value(projection)?)
            }
            "generate_plan" => {
                let profile_id = args.require_profile()?;
                let date = resolve_date(args.event_date.as_deref())?;
                self.db.ensure_profile(&profile_id)?;
                let plan = self.generate_plan(advisor, &profile_id, date)?;
                Ok(serde_json::to_value(plan)?)
            }
            "update_plan_status" => {
                let plan_id = args.plan_id.context("Missing plan_id argument")?;
                let status = args.status.as_deref().context("Missing status argument")?;
                let plan = self.db.set_plan_status(plan_id, status)?;
                Ok(serde_json::to_value(plan)?)
            }
            "get_user_profile" => {
                let profile_id = args.require_profile()?;
                let profile = self.db.get_profile(&profile_id)?;
                Ok(serde_json::to_value(profile)?)
            }
            _ => bail!("Unknown tool '{name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecommendationItem;

    struct MockAdvisor {
        items: Vec<RecommendationItem>,
        fail: bool,
    }

    impl PlanAdvisor for MockAdvisor {
        fn advise(&self, _ctx: &PlanContext) -> Result<Vec<RecommendationItem>> {
            if self.fail {
                bail!("coach offline");
            }
            Ok(self.items.clone())
        }
    }

    fn mock_items() -> Vec<RecommendationItem> {
        vec![RecommendationItem {
            action: "Drink 400ml water now".to_string(),
            reason: "Morning deficit".to_string(),
        }]
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn complete_profile(svc: &WaterBarService, id: &str) {
        svc.update_profile(
            id,
            &ProfileUpdate {
                name: Some("Deniz".to_string()),
                height_cm: Some(170.0),
                weight_kg: Some(70.0),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
    }

    fn request(profile_id: &str) -> RespondRequest {
        RespondRequest {
            profile_id: profile_id.to_string(),
            event_date: Some("2025-06-15".to_string()),
            ..RespondRequest::default()
        }
    }

    fn fluid(name: &str, amount: f64) -> NewEvent {
        NewEvent {
            event_type: "fluid".to_string(),
            name: name.to_string(),
            amount,
            unit: None,
            logged_at: None,
            notes: None,
        }
    }

    #[test]
    fn test_respond_gates_on_profile() {
        let svc = WaterBarService::new_in_memory().unwrap();
        let reply = svc.respond(None, &request("u1")).unwrap();
        assert_eq!(reply.step, Step::AwaitingProfile);
        assert!(reply.message.contains("complete your profile"));
        assert_eq!(reply.steps[0].label, "session_started");
    }

    #[test]
    fn test_respond_gates_on_body_comp() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let reply = svc.respond(None, &request("u1")).unwrap();
        assert_eq!(reply.step, Step::AwaitingBodyComp);
        let options = reply.options.unwrap();
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn test_respond_body_type_label_sets_body_fat() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_composition_label: Some("athletic".to_string()),
            ..ProfileUpdate::default()
        });
        let reply = svc.respond(None, &req).unwrap();

        assert_eq!(reply.step, Step::AwaitingIntake);
        assert!(reply.steps.iter().any(|n| n.label == "projection_updated"
            && n.message.starts_with("Baseline calculated")));

        let profile = svc.profile("u1").unwrap();
        assert_eq!(profile.body_fat_pct, Some(20.0));
        assert_eq!(profile.body_composition_label.as_deref(), Some("Athletic"));
        assert!(svc.projection("u1", test_date()).unwrap().is_some());
    }

    #[test]
    fn test_respond_unknown_body_type_reoffers_options() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_composition_label: Some("bulky".to_string()),
            ..ProfileUpdate::default()
        });
        let reply = svc.respond(None, &req).unwrap();

        assert_eq!(reply.step, Step::AwaitingBodyComp);
        assert!(reply.message.contains("Unknown body type"));
        assert!(reply.options.is_some());
        assert!(svc.profile("u1").unwrap().body_fat_pct.is_none());
    }

    #[test]
    fn test_respond_profile_updates_ignore_non_body_fields() {
        let svc = WaterBarService::new_in_memory().unwrap();

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            name: Some("Intruder".to_string()),
            weight_kg: Some(120.0),
            ..ProfileUpdate::default()
        });
        let reply = svc.respond(None, &req).unwrap();

        // The restricted patch is empty, so the profile gate still applies
        assert_eq!(reply.step, Step::AwaitingProfile);
        let profile = svc.profile("u1").unwrap();
        assert!(profile.name.is_none());
        assert!(profile.weight_kg.is_none());
    }

    #[test]
    fn test_respond_duplicate_start_reports_existing() {
        let svc = WaterBarService::new_in_memory().unwrap();
        svc.respond(None, &request("u1")).unwrap();

        let reply = svc.respond(None, &request("u1")).unwrap();
        assert_eq!(
            reply.message,
            "Session started and timeline already initialized."
        );
        assert!(reply.steps.is_empty());
    }

    #[test]
    fn test_respond_stages_events() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.events = Some(vec![fluid("Water", 500.0), fluid("Ayran", 250.0)]);
        let reply = svc.respond(None, &req).unwrap();

        assert_eq!(reply.step, Step::ReadyForPlan);
        assert!(reply.steps.iter().any(|n| n.label == "batch_logged"));
        assert_eq!(svc.staged_events("u1", test_date()).unwrap().len(), 2);
    }

    #[test]
    fn test_respond_finalize_uses_coach() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");
        let advisor = MockAdvisor {
            items: mock_items(),
            fail: false,
        };

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.events = Some(vec![fluid("Water", 500.0)]);
        req.finalize = true;
        let reply = svc.respond(Some(&advisor), &req).unwrap();

        assert_eq!(reply.step, Step::PlanGenerated);
        let plan = reply.plan.unwrap();
        assert_eq!(plan.source, "coach");
        assert_eq!(plan.items, mock_items());

        // Staged rows were promoted to validated
        assert!(svc.staged_events("u1", test_date()).unwrap().is_empty());
        assert_eq!(svc.validated_events("u1", test_date()).unwrap().len(), 1);

        let labels: Vec<&str> = reply.steps.iter().map(|n| n.label.as_str()).collect();
        assert!(labels.contains(&"batch_validated"));
        assert!(labels.contains(&"plan_generated"));
    }

    #[test]
    fn test_respond_finalize_falls_back_on_coach_error() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");
        let advisor = MockAdvisor {
            items: vec![],
            fail: true,
        };

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.finalize = true;
        let reply = svc.respond(Some(&advisor), &req).unwrap();

        let plan = reply.plan.unwrap();
        assert_eq!(plan.source, "fallback");
        assert_eq!(plan.items, coach::fallback_plan());
    }

    #[test]
    fn test_respond_finalize_without_advisor() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.finalize = true;
        let reply = svc.respond(None, &req).unwrap();

        assert_eq!(reply.plan.unwrap().source, "fallback");
    }

    #[test]
    fn test_respond_new_events_reopen_generated_plan() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.finalize = true;
        svc.respond(None, &req).unwrap();

        let mut more = request("u1");
        more.events = Some(vec![fluid("Tea", 200.0)]);
        let reply = svc.respond(None, &more).unwrap();
        assert_eq!(reply.step, Step::ReadyForPlan);
    }

    #[test]
    fn test_full_conversation_flow() {
        let svc = WaterBarService::new_in_memory().unwrap();

        // 1. Bare start hits the profile gate
        let reply = svc.respond(None, &request("u1")).unwrap();
        assert_eq!(reply.step, Step::AwaitingProfile);

        // 2. Profile completed out of band, body comp gate next
        complete_profile(&svc, "u1");
        let mut req = request("u1");
        req.events = Some(vec![fluid("Water", 500.0)]);
        let reply = svc.respond(None, &req).unwrap();
        assert_eq!(reply.step, Step::AwaitingBodyComp);

        // 3. Body type chosen, baseline projected
        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_composition_label: Some("Lean".to_string()),
            ..ProfileUpdate::default()
        });
        let reply = svc.respond(None, &req).unwrap();
        assert_eq!(reply.step, Step::AwaitingIntake);

        // 4. Events staged
        let mut req = request("u1");
        req.events = Some(vec![fluid("Water", 500.0), fluid("Coconut water", 240.0)]);
        let reply = svc.respond(None, &req).unwrap();
        assert_eq!(reply.step, Step::ReadyForPlan);

        // 5. Finalize validates and plans
        let mut req = request("u1");
        req.finalize = true;
        let reply = svc.respond(None, &req).unwrap();
        assert_eq!(reply.step, Step::PlanGenerated);
        assert_eq!(svc.validated_events("u1", test_date()).unwrap().len(), 2);
        assert!(reply.plan.is_some());

        let session = svc.session("u1", test_date()).unwrap().unwrap();
        assert_eq!(session.step, Step::PlanGenerated);
    }

    #[test]
    fn test_run_tool_reset_session() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");
        let mut req = request("u1");
        req.profile_updates = Some(ProfileUpdate {
            body_fat_pct: Some(22.0),
            ..ProfileUpdate::default()
        });
        req.events = Some(vec![fluid("Water", 500.0)]);
        svc.respond(None, &req).unwrap();

        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            event_date: Some("2025-06-15".to_string()),
            ..ToolArgs::default()
        };
        let output = svc.run_tool(None, "reset_session", &args).unwrap();
        assert_eq!(output["step"], "awaiting_profile");
        assert!(svc.staged_events("u1", test_date()).unwrap().is_empty());
    }

    #[test]
    fn test_run_tool_log_and_validate() {
        let svc = WaterBarService::new_in_memory().unwrap();

        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            event_date: Some("2025-06-15".to_string()),
            events: Some(vec![fluid("Water", 500.0), fluid("ORS", 200.0)]),
            ..ToolArgs::default()
        };
        let output = svc.run_tool(None, "log_event_batch", &args).unwrap();
        assert_eq!(output["staged"], 2);

        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            event_date: Some("2025-06-15".to_string()),
            ..ToolArgs::default()
        };
        let output = svc.run_tool(None, "validate_events", &args).unwrap();
        assert_eq!(output["validated"], 2);
    }

    #[test]
    fn test_run_tool_log_rejects_empty_batch() {
        let svc = WaterBarService::new_in_memory().unwrap();
        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            ..ToolArgs::default()
        };
        assert!(svc.run_tool(None, "log_event_batch", &args).is_err());
    }

    #[test]
    fn test_run_tool_projection_and_plan() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");
        svc.update_profile(
            "u1",
            &ProfileUpdate {
                body_fat_pct: Some(22.0),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();

        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            event_date: Some("2025-06-15".to_string()),
            ..ToolArgs::default()
        };
        let output = svc
            .run_tool(None, "recalculate_projection", &args)
            .unwrap();
        assert_eq!(output["tbw_loss_ml"], 2790);

        let advisor = MockAdvisor {
            items: mock_items(),
            fail: false,
        };
        let output = svc
            .run_tool(Some(&advisor), "generate_plan", &args)
            .unwrap();
        assert_eq!(output["source"], "coach");
        let plan_id = output["id"].as_i64().unwrap();

        let args = ToolArgs {
            plan_id: Some(plan_id),
            status: Some("accept".to_string()),
            ..ToolArgs::default()
        };
        let output = svc.run_tool(None, "update_plan_status", &args).unwrap();
        assert_eq!(output["status"], "accepted");
    }

    #[test]
    fn test_run_tool_get_profile() {
        let svc = WaterBarService::new_in_memory().unwrap();
        complete_profile(&svc, "u1");

        let args = ToolArgs {
            profile_id: Some("u1".to_string()),
            ..ToolArgs::default()
        };
        let output = svc.run_tool(None, "get_user_profile", &args).unwrap();
        assert_eq!(output["name"], "Deniz");
    }

    #[test]
    fn test_run_tool_unknown_name() {
        let svc = WaterBarService::new_in_memory().unwrap();
        let args = ToolArgs::default();
        let result = svc.run_tool(None, "summon_rain", &args);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unknown tool"));
    }

    #[test]
    fn test_run_tool_requires_profile_id() {
        let svc = WaterBarService::new_in_memory().unwrap();
        let args = ToolArgs::default();
        assert!(svc.run_tool(None, "get_user_profile", &args).is_err());
    }

    #[test]
    fn test_tool_registry_matches_dispatch() {
        let svc = WaterBarService::new_in_memory().unwrap();
        for name in TOOL_NAMES {
            let err = svc.run_tool(None, name, &ToolArgs::default()).unwrap_err();
            assert!(
                !err.to_string().contains("Unknown tool"),
                "'{name}' is listed but not dispatchable"
            );
        }
    }
}
