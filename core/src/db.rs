use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{
    BodyCompOption, DaySummary, LossProjection, NewEvent, PlanRecord, Profile, ProfileUpdate,
    RecommendationItem, StagedEvent, ValidatedEvent, activity_sweat_ml, fluid_volume_ml,
    validate_event, validate_plan_status,
};
use crate::session::{LossFigures, Session, Step};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS profiles (
                    id TEXT PRIMARY KEY,
                    name TEXT,
                    height_cm REAL,
                    weight_kg REAL,
                    age INTEGER,
                    sex TEXT,
                    body_fat_pct REAL,
                    lean_mass_multiplier REAL,
                    body_composition_label TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    profile_id TEXT NOT NULL REFERENCES profiles(id),
                    event_date TEXT NOT NULL,
                    step TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_profile_date
                    ON sessions(profile_id, event_date);

                CREATE TABLE IF NOT EXISTS hydration_event_staging (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    profile_id TEXT NOT NULL REFERENCES profiles(id),
                    event_date TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    amount REAL NOT NULL,
                    unit TEXT NOT NULL,
                    logged_at TEXT NOT NULL,
                    notes TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_staging_profile_date
                    ON hydration_event_staging(profile_id, event_date);

                CREATE TABLE IF NOT EXISTS hydration_event_validated (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    profile_id TEXT NOT NULL REFERENCES profiles(id),
                    event_date TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    amount REAL NOT NULL,
                    unit TEXT NOT NULL,
                    logged_at TEXT NOT NULL,
                    notes TEXT,
                    validated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_validated_profile_date
                    ON hydration_event_validated(profile_id, event_date);

                CREATE TABLE IF NOT EXISTS projected_loss_summary (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    profile_id TEXT NOT NULL REFERENCES profiles(id),
                    event_date TEXT NOT NULL,
                    tbw_l REAL NOT NULL,
                    tbw_loss_ml INTEGER NOT NULL,
                    icf_loss_ml INTEGER NOT NULL,
                    ecf_loss_ml INTEGER NOT NULL,
                    isf_loss_ml INTEGER NOT NULL,
                    ivf_loss_ml INTEGER NOT NULL,
                    baseline_sodium_mg INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(profile_id, event_date)
                );

                CREATE TABLE IF NOT EXISTS plan_recommendations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    profile_id TEXT NOT NULL REFERENCES profiles(id),
                    event_date TEXT NOT NULL,
                    items TEXT NOT NULL,
                    source TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'proposed',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_plans_profile_date
                    ON plan_recommendations(profile_id, event_date);

                CREATE TABLE IF NOT EXISTS body_composition_lookup (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    label TEXT NOT NULL UNIQUE,
                    body_fat_pct REAL NOT NULL,
                    description TEXT NOT NULL
                );

                INSERT OR IGNORE INTO body_composition_lookup (label, body_fat_pct, description) VALUES
                    ('Lean', 15.0, 'Visible muscle definition, low body fat'),
                    ('Athletic', 20.0, 'Toned with moderate muscle mass'),
                    ('Average', 25.0, 'Typical build, neither lean nor soft'),
                    ('Soft', 32.0, 'Higher body fat, limited muscle definition');

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mappers ---

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        Ok(Profile {
            id: row.get(0)?,
            name: row.get(1)?,
            height_cm: row.get(2)?,
            weight_kg: row.get(3)?,
            age: row.get(4)?,
            sex: row.get(5)?,
            body_fat_pct: row.get(6)?,
            lean_mass_multiplier: row.get(7)?,
            body_composition_label: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn session_from_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let step_str: String = row.get(3)?;
        let step = Step::parse(&step_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(Session {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            event_date: row.get(2)?,
            step,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn staged_from_row(row: &rusqlite::Row) -> rusqlite::Result<StagedEvent> {
        Ok(StagedEvent {
            id: row.get(0)?,
            uuid: row.get(1)?,
            profile_id: row.get(2)?,
            event_date: row.get(3)?,
            event_type: row.get(4)?,
            name: row.get(5)?,
            amount: row.get(6)?,
            unit: row.get(7)?,
            logged_at: row.get(8)?,
            notes: row.get(9)?,
            status: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn validated_from_row(row: &rusqlite::Row) -> rusqlite::Result<ValidatedEvent> {
        Ok(ValidatedEvent {
            id: row.get(0)?,
            uuid: row.get(1)?,
            profile_id: row.get(2)?,
            event_date: row.get(3)?,
            event_type: row.get(4)?,
            name: row.get(5)?,
            amount: row.get(6)?,
            unit: row.get(7)?,
            logged_at: row.get(8)?,
            notes: row.get(9)?,
            validated_at: row.get(10)?,
        })
    }

    fn projection_from_row(row: &rusqlite::Row) -> rusqlite::Result<LossProjection> {
        Ok(LossProjection {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            event_date: row.get(2)?,
            tbw_l: row.get(3)?,
            tbw_loss_ml: row.get(4)?,
            icf_loss_ml: row.get(5)?,
            ecf_loss_ml: row.get(6)?,
            isf_loss_ml: row.get(7)?,
            ivf_loss_ml: row.get(8)?,
            baseline_sodium_mg: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlanRecord> {
        let items_json: String = row.get(3)?;
        let items: Vec<RecommendationItem> = serde_json::from_str(&items_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(PlanRecord {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            event_date: row.get(2)?,
            items,
            source: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn body_comp_from_row(row: &rusqlite::Row) -> rusqlite::Result<BodyCompOption> {
        Ok(BodyCompOption {
            label: row.get(0)?,
            body_fat_pct: row.get(1)?,
            description: row.get(2)?,
        })
    }

    // --- Profiles ---

    /// Fetch a profile, creating an empty row first if none exists.
    pub fn ensure_profile(&self, id: &str) -> Result<Profile> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO profiles (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![id, now],
        )?;
        self.get_profile(id)
    }

    pub fn get_profile(&self, id: &str) -> Result<Profile> {
        self.conn
            .query_row(
                "SELECT id, name, height_cm, weight_kg, age, sex, body_fat_pct,
                        lean_mass_multiplier, body_composition_label, created_at, updated_at
                 FROM profiles WHERE id = ?1",
                params![id],
                Self::profile_from_row,
            )
            .context("Profile not found")
    }

    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        // Verify existence
        self.get_profile(id)?;

        let now = Local::now().to_rfc3339();
        if let Some(ref name) = update.name {
            self.conn.execute(
                "UPDATE profiles SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )?;
        }
        if let Some(height_cm) = update.height_cm {
            self.conn.execute(
                "UPDATE profiles SET height_cm = ?1, updated_at = ?2 WHERE id = ?3",
                params![height_cm, now, id],
            )?;
        }
        if let Some(weight_kg) = update.weight_kg {
            self.conn.execute(
                "UPDATE profiles SET weight_kg = ?1, updated_at = ?2 WHERE id = ?3",
                params![weight_kg, now, id],
            )?;
        }
        if let Some(age) = update.age {
            self.conn.execute(
                "UPDATE profiles SET age = ?1, updated_at = ?2 WHERE id = ?3",
                params![age, now, id],
            )?;
        }
        if let Some(ref sex) = update.sex {
            self.conn.execute(
                "UPDATE profiles SET sex = ?1, updated_at = ?2 WHERE id = ?3",
                params![sex, now, id],
            )?;
        }
        if let Some(body_fat_pct) = update.body_fat_pct {
            self.conn.execute(
                "UPDATE profiles SET body_fat_pct = ?1, updated_at = ?2 WHERE id = ?3",
                params![body_fat_pct, now, id],
            )?;
        }
        if let Some(lean_mass_multiplier) = update.lean_mass_multiplier {
            self.conn.execute(
                "UPDATE profiles SET lean_mass_multiplier = ?1, updated_at = ?2 WHERE id = ?3",
                params![lean_mass_multiplier, now, id],
            )?;
        }
        if let Some(ref label) = update.body_composition_label {
            self.conn.execute(
                "UPDATE profiles SET body_composition_label = ?1, updated_at = ?2 WHERE id = ?3",
                params![label, now, id],
            )?;
        }

        self.get_profile(id)
    }

    // --- Sessions ---

    /// Start (or rejoin) the session for one profile and date. The unique
    /// index on (profile_id, event_date) makes concurrent starts collapse
    /// onto a single row; the bool reports whether this call created it.
    pub fn start_session(&self, profile_id: &str, date: NaiveDate) -> Result<(Session, bool)> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sessions (id, profile_id, event_date, step, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, profile_id, date_str, Step::initial().as_str(), now],
        )?;
        let session = self
            .get_session(profile_id, date)?
            .context("Session missing after start")?;
        Ok((session, inserted > 0))
    }

    pub fn get_session(&self, profile_id: &str, date: NaiveDate) -> Result<Option<Session>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, profile_id, event_date, step, created_at, updated_at
             FROM sessions WHERE profile_id = ?1 AND event_date = ?2",
        )?;
        let mut rows = stmt.query(params![profile_id, date_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::session_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_session_step(
        &self,
        profile_id: &str,
        date: NaiveDate,
        step: Step,
    ) -> Result<Session> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE sessions SET step = ?1, updated_at = ?2
             WHERE profile_id = ?3 AND event_date = ?4",
            params![step.as_str(), now, profile_id, date_str],
        )?;
        if changed == 0 {
            bail!("No session for {profile_id} on {date_str}");
        }
        self.get_session(profile_id, date)?
            .context("Session missing after update")
    }

    /// Clear the day back to a clean slate: session row, staged events,
    /// projection and plans. Validated history is kept.
    pub fn reset_session(&self, profile_id: &str, date: NaiveDate) -> Result<()> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM hydration_event_staging WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        tx.execute(
            "DELETE FROM projected_loss_summary WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        tx.execute(
            "DELETE FROM plan_recommendations WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        tx.commit()?;
        Ok(())
    }

    // --- Staged events ---

    pub fn insert_staged_event(
        &self,
        profile_id: &str,
        date: NaiveDate,
        event: &NewEvent,
    ) -> Result<StagedEvent> {
        validate_event(event)?;
        let date_str = date.format("%Y-%m-%d").to_string();
        let event_type = event.event_type.to_lowercase();
        let unit = event
            .unit
            .clone()
            .unwrap_or_else(|| crate::models::default_unit(&event_type).to_string());
        let now = Local::now().to_rfc3339();
        let logged_at = event.logged_at.clone().unwrap_or_else(|| now.clone());
        let uuid = Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO hydration_event_staging
                 (uuid, profile_id, event_date, event_type, name, amount, unit,
                  logged_at, notes, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)",
            params![
                uuid, profile_id, date_str, event_type, event.name, event.amount, unit,
                logged_at, event.notes, now
            ],
        )?;
        self.get_staged_event(self.conn.last_insert_rowid())
    }

    pub fn get_staged_event(&self, id: i64) -> Result<StagedEvent> {
        self.conn
            .query_row(
                "SELECT id, uuid, profile_id, event_date, event_type, name, amount, unit,
                        logged_at, notes, status, created_at
                 FROM hydration_event_staging WHERE id = ?1",
                params![id],
                Self::staged_from_row,
            )
            .context("Staged event not found")
    }

    pub fn get_staged_events(&self, profile_id: &str, date: NaiveDate) -> Result<Vec<StagedEvent>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, profile_id, event_date, event_type, name, amount, unit,
                    logged_at, notes, status, created_at
             FROM hydration_event_staging
             WHERE profile_id = ?1 AND event_date = ?2 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![profile_id, date_str], Self::staged_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn delete_staged_events(&self, profile_id: &str, date: NaiveDate) -> Result<usize> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let deleted = self.conn.execute(
            "DELETE FROM hydration_event_staging WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        Ok(deleted)
    }

    // --- Validated events ---

    /// Move the day's staged events into the validated table. The insert and
    /// delete run in one transaction, and the carried uuid makes a replayed
    /// validation a no-op instead of a duplicate.
    pub fn validate_events(&self, profile_id: &str, date: NaiveDate) -> Result<Vec<ValidatedEvent>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO hydration_event_validated
                 (uuid, profile_id, event_date, event_type, name, amount, unit,
                  logged_at, notes, validated_at)
             SELECT uuid, profile_id, event_date, event_type, name, amount, unit,
                    logged_at, notes, ?1
             FROM hydration_event_staging
             WHERE profile_id = ?2 AND event_date = ?3",
            params![now, profile_id, date_str],
        )?;
        tx.execute(
            "DELETE FROM hydration_event_staging WHERE profile_id = ?1 AND event_date = ?2",
            params![profile_id, date_str],
        )?;
        tx.commit()?;
        self.get_validated_events(profile_id, date)
    }

    pub fn get_validated_events(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ValidatedEvent>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, profile_id, event_date, event_type, name, amount, unit,
                    logged_at, notes, validated_at
             FROM hydration_event_validated
             WHERE profile_id = ?1 AND event_date = ?2 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![profile_id, date_str], Self::validated_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // --- Loss projections ---

    pub fn save_projection(
        &self,
        profile_id: &str,
        date: NaiveDate,
        figures: &LossFigures,
    ) -> Result<LossProjection> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO projected_loss_summary
                 (profile_id, event_date, tbw_l, tbw_loss_ml, icf_loss_ml, ecf_loss_ml,
                  isf_loss_ml, ivf_loss_ml, baseline_sodium_mg, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                profile_id,
                date_str,
                figures.tbw_l,
                figures.tbw_loss_ml,
                figures.icf_loss_ml,
                figures.ecf_loss_ml,
                figures.isf_loss_ml,
                figures.ivf_loss_ml,
                figures.baseline_sodium_mg,
                now
            ],
        )?;
        self.get_projection(profile_id, date)?
            .context("Projection missing after save")
    }

    pub fn get_projection(
        &self,
        profile_id: &str,
        date: NaiveDate,
    ) -> Result<Option<LossProjection>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, profile_id, event_date, tbw_l, tbw_loss_ml, icf_loss_ml, ecf_loss_ml,
                    isf_loss_ml, ivf_loss_ml, baseline_sodium_mg, created_at
             FROM projected_loss_summary WHERE profile_id = ?1 AND event_date = ?2",
        )?;
        let mut rows = stmt.query(params![profile_id, date_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::projection_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    // --- Plans ---

    pub fn insert_plan(
        &self,
        profile_id: &str,
        date: NaiveDate,
        items: &[RecommendationItem],
        source: &str,
    ) -> Result<PlanRecord> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let items_json = serde_json::to_string(items)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO plan_recommendations
                 (profile_id, event_date, items, source, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'proposed', ?5)",
            params![profile_id, date_str, items_json, source, now],
        )?;
        self.get_plan(self.conn.last_insert_rowid())
    }

    pub fn get_plan(&self, id: i64) -> Result<PlanRecord> {
        self.conn
            .query_row(
                "SELECT id, profile_id, event_date, items, source, status, created_at
                 FROM plan_recommendations WHERE id = ?1",
                params![id],
                Self::plan_from_row,
            )
            .context("Plan not found")
    }

    pub fn latest_plan(&self, profile_id: &str, date: NaiveDate) -> Result<Option<PlanRecord>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, profile_id, event_date, items, source, status, created_at
             FROM plan_recommendations
             WHERE profile_id = ?1 AND event_date = ?2 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![profile_id, date_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::plan_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_plan_status(&self, id: i64, status: &str) -> Result<PlanRecord> {
        let status = validate_plan_status(status)?;
        // Verify existence
        self.get_plan(id)?;
        self.conn.execute(
            "UPDATE plan_recommendations SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        self.get_plan(id)
    }

    // --- Body composition lookup ---

    pub fn body_comp_options(&self) -> Result<Vec<BodyCompOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT label, body_fat_pct, description
             FROM body_composition_lookup ORDER BY body_fat_pct",
        )?;
        let options = stmt
            .query_map([], Self::body_comp_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }

    pub fn get_body_comp_option(&self, label: &str) -> Result<Option<BodyCompOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT label, body_fat_pct, description
             FROM body_composition_lookup WHERE label = ?1 COLLATE NOCASE",
        )?;
        let mut rows = stmt.query(params![label])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::body_comp_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    // --- Day summary ---

    pub fn build_day_summary(&self, profile_id: &str, date: NaiveDate) -> Result<DaySummary> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let session = self.get_session(profile_id, date)?;
        let projection = self.get_projection(profile_id, date)?;
        let staged = self.get_staged_events(profile_id, date)?;
        let validated = self.get_validated_events(profile_id, date)?;
        let plan = self.latest_plan(profile_id, date)?;

        let mut fluid_in_ml = 0.0;
        let mut sweat_loss_ml = 0.0;
        let mut osmole_intake_mosm = 0.0;
        for event in &validated {
            match event.event_type.as_str() {
                "fluid" => fluid_in_ml += fluid_volume_ml(event.amount, &event.unit),
                "food" => osmole_intake_mosm += event.amount,
                "activity" => sweat_loss_ml += activity_sweat_ml(event.amount, &event.unit),
                _ => {}
            }
        }

        Ok(DaySummary {
            date: date_str,
            step: session.map(|s| s.step.as_str().to_string()),
            projection,
            staged,
            validated,
            plan,
            fluid_in_ml,
            sweat_loss_ml,
            net_fluid_ml: fluid_in_ml - sweat_loss_ml,
            osmole_intake_mosm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn fluid_event(name: &str, amount: f64) -> NewEvent {
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
    fn test_ensure_profile_idempotent() {
        let db = test_db();
        let first = db.ensure_profile("u1").unwrap();
        let second = db.ensure_profile("u1").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(first.name.is_none());
    }

    #[test]
    fn test_update_profile_patches_fields() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let updated = db
            .update_profile(
                "u1",
                &ProfileUpdate {
                    name: Some("Deniz".to_string()),
                    height_cm: Some(170.0),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Deniz"));
        assert_eq!(updated.height_cm, Some(170.0));
        assert!(updated.weight_kg.is_none());

        let updated = db
            .update_profile(
                "u1",
                &ProfileUpdate {
                    weight_kg: Some(70.0),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        // Earlier fields survive a later patch
        assert_eq!(updated.name.as_deref(), Some("Deniz"));
        assert_eq!(updated.weight_kg, Some(70.0));
    }

    #[test]
    fn test_update_missing_profile_fails() {
        let db = test_db();
        let result = db.update_profile("ghost", &ProfileUpdate::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_start_session_collapses_duplicates() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let (first, created) = db.start_session("u1", test_date()).unwrap();
        assert!(created);
        assert_eq!(first.step, Step::AwaitingProfile);

        let (second, created) = db.start_session("u1", test_date()).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_duplicate_start_keeps_step() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        db.start_session("u1", test_date()).unwrap();
        db.set_session_step("u1", test_date(), Step::ReadyForPlan)
            .unwrap();

        let (session, created) = db.start_session("u1", test_date()).unwrap();
        assert!(!created);
        assert_eq!(session.step, Step::ReadyForPlan);
    }

    #[test]
    fn test_set_step_requires_session() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        let result = db.set_session_step("u1", test_date(), Step::AwaitingIntake);
        assert!(result.is_err());
    }

    #[test]
    fn test_sessions_are_per_date() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        let other_date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();

        let (_, created) = db.start_session("u1", test_date()).unwrap();
        assert!(created);
        let (_, created) = db.start_session("u1", other_date).unwrap();
        assert!(created);
    }

    #[test]
    fn test_stage_event_defaults() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let staged = db
            .insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();
        assert_eq!(staged.unit, "ml");
        assert_eq!(staged.status, "pending");
        assert!(!staged.uuid.is_empty());
        assert!(!staged.logged_at.is_empty());

        let food = NewEvent {
            event_type: "Food".to_string(),
            name: "Dates".to_string(),
            amount: 413.0,
            unit: None,
            logged_at: None,
            notes: None,
        };
        let staged = db.insert_staged_event("u1", test_date(), &food).unwrap();
        // Type is normalized and the unit default follows it
        assert_eq!(staged.event_type, "food");
        assert_eq!(staged.unit, "mosm");
    }

    #[test]
    fn test_stage_event_rejects_invalid() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let zero = fluid_event("Water", 0.0);
        assert!(db.insert_staged_event("u1", test_date(), &zero).is_err());

        let bad_type = NewEvent {
            event_type: "nap".to_string(),
            name: "Nap".to_string(),
            amount: 30.0,
            unit: None,
            logged_at: None,
            notes: None,
        };
        assert!(db.insert_staged_event("u1", test_date(), &bad_type).is_err());
    }

    #[test]
    fn test_validate_moves_staged_rows() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Ayran", 250.0))
            .unwrap();

        let validated = db.validate_events("u1", test_date()).unwrap();
        assert_eq!(validated.len(), 2);
        assert!(!validated[0].validated_at.is_empty());
        assert!(db.get_staged_events("u1", test_date()).unwrap().is_empty());
    }

    #[test]
    fn test_validate_twice_does_not_duplicate() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();

        let first = db.validate_events("u1", test_date()).unwrap();
        let second = db.validate_events("u1", test_date()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].uuid, second[0].uuid);
    }

    #[test]
    fn test_validate_only_moves_matching_date() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        let other_date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();
        db.insert_staged_event("u1", other_date, &fluid_event("Tea", 200.0))
            .unwrap();

        db.validate_events("u1", test_date()).unwrap();
        assert_eq!(db.get_staged_events("u1", other_date).unwrap().len(), 1);
        assert!(db.get_validated_events("u1", other_date).unwrap().is_empty());
    }

    #[test]
    fn test_projection_upsert() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let first = LossFigures {
            tbw_l: 39.858,
            tbw_loss_ml: 2790,
            icf_loss_ml: 1841,
            ecf_loss_ml: 949,
            isf_loss_ml: 712,
            ivf_loss_ml: 237,
            baseline_sodium_mg: 128_343,
        };
        db.save_projection("u1", test_date(), &first).unwrap();

        let second = LossFigures {
            tbw_l: 42.0,
            tbw_loss_ml: 2940,
            ..first
        };
        db.save_projection("u1", test_date(), &second).unwrap();

        let stored = db.get_projection("u1", test_date()).unwrap().unwrap();
        assert!((stored.tbw_l - 42.0).abs() < f64::EPSILON);
        assert_eq!(stored.tbw_loss_ml, 2940);
    }

    #[test]
    fn test_plan_lifecycle() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();

        let items = vec![
            RecommendationItem {
                action: "Drink 500ml water with lunch".to_string(),
                reason: "Meet fluid target".to_string(),
            },
            RecommendationItem {
                action: "Add electrolyte tablet in afternoon".to_string(),
                reason: "Meet sodium target".to_string(),
            },
        ];
        let plan = db.insert_plan("u1", test_date(), &items, "fallback").unwrap();
        assert_eq!(plan.status, "proposed");
        assert_eq!(plan.items, items);

        let latest = db.latest_plan("u1", test_date()).unwrap().unwrap();
        assert_eq!(latest.id, plan.id);

        let accepted = db.set_plan_status(plan.id, "accept").unwrap();
        assert_eq!(accepted.status, "accepted");

        assert!(db.set_plan_status(plan.id, "paused").is_err());
        assert!(db.set_plan_status(9999, "accepted").is_err());
    }

    #[test]
    fn test_latest_plan_wins() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        let items = vec![RecommendationItem {
            action: "Drink water".to_string(),
            reason: "Fluid target".to_string(),
        }];
        db.insert_plan("u1", test_date(), &items, "fallback").unwrap();
        let newer = db.insert_plan("u1", test_date(), &items, "coach").unwrap();

        let latest = db.latest_plan("u1", test_date()).unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.source, "coach");
    }

    #[test]
    fn test_body_comp_lookup_is_seeded() {
        let db = test_db();
        let options = db.body_comp_options().unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options[0].label, "Lean");

        let athletic = db.get_body_comp_option("athletic").unwrap().unwrap();
        assert!((athletic.body_fat_pct - 20.0).abs() < f64::EPSILON);
        assert!(db.get_body_comp_option("bulky").unwrap().is_none());
    }

    #[test]
    fn test_day_summary_totals() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        db.start_session("u1", test_date()).unwrap();

        db.insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();
        let food = NewEvent {
            event_type: "food".to_string(),
            name: "Dates".to_string(),
            amount: 300.0,
            unit: None,
            logged_at: None,
            notes: None,
        };
        db.insert_staged_event("u1", test_date(), &food).unwrap();
        let activity = NewEvent {
            event_type: "activity".to_string(),
            name: "Indoor cycling".to_string(),
            amount: 30.0,
            unit: None,
            logged_at: None,
            notes: None,
        };
        db.insert_staged_event("u1", test_date(), &activity).unwrap();
        db.validate_events("u1", test_date()).unwrap();

        let summary = db.build_day_summary("u1", test_date()).unwrap();
        assert_eq!(summary.step.as_deref(), Some("awaiting_profile"));
        assert_eq!(summary.validated.len(), 3);
        assert!(summary.staged.is_empty());
        assert!((summary.fluid_in_ml - 500.0).abs() < f64::EPSILON);
        assert!((summary.osmole_intake_mosm - 300.0).abs() < f64::EPSILON);
        // 30 min at 0.8 L/h
        assert!((summary.sweat_loss_ml - 400.0).abs() < 1e-9);
        assert!((summary.net_fluid_ml - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_session_clears_day_keeps_validated() {
        let db = test_db();
        db.ensure_profile("u1").unwrap();
        db.start_session("u1", test_date()).unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Water", 500.0))
            .unwrap();
        db.validate_events("u1", test_date()).unwrap();
        db.insert_staged_event("u1", test_date(), &fluid_event("Tea", 200.0))
            .unwrap();
        let figures = LossFigures {
            tbw_l: 42.0,
            tbw_loss_ml: 2940,
            icf_loss_ml: 1940,
            ecf_loss_ml: 1000,
            isf_loss_ml: 750,
            ivf_loss_ml: 250,
            baseline_sodium_mg: 135_240,
        };
        db.save_projection("u1", test_date(), &figures).unwrap();
        let items = vec![RecommendationItem {
            action: "Drink water".to_string(),
            reason: "Fluid target".to_string(),
        }];
        db.insert_plan("u1", test_date(), &items, "fallback").unwrap();

        db.reset_session("u1", test_date()).unwrap();

        assert!(db.get_session("u1", test_date()).unwrap().is_none());
        assert!(db.get_staged_events("u1", test_date()).unwrap().is_empty());
        assert!(db.get_projection("u1", test_date()).unwrap().is_none());
        assert!(db.latest_plan("u1", test_date()).unwrap().is_none());
        assert_eq!(db.get_validated_events("u1", test_date()).unwrap().len(), 1);
    }
}
