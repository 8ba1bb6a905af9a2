use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Solute levels for one fluid compartment. Concentrations are nominal
/// model units, water is litres. Fields a compartment does not use stay 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Solutes {
    pub na: f64,
    pub k: f64,
    pub cl: f64,
    pub glucose: f64,
    pub bun: f64,
    pub albumin: f64,
    pub mg: f64,
    pub pi: f64,
    pub urea: f64,
    pub skin: f64,
    pub sweat: f64,
    pub h2o: f64,
}

impl Solutes {
    /// Effective osmolality: `2*(Na+K+Cl) + glucose/18 + BUN/2.8`, rounded.
    #[must_use]
    pub fn osmolality(&self) -> f64 {
        (2.0 * (self.na + self.k + self.cl) + self.glucose / 18.0 + self.bun / 2.8).round()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Hormones {
    pub adh: f64,
    pub aldosterone: f64,
    pub cortisol: f64,
    pub estrogen: f64,
    pub testosterone: f64,
}

/// The four-compartment fluid model: intravascular, interstitial,
/// intracellular, and the transcellular "fourth" compartment that collects
/// excreted load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompartmentState {
    pub ivf: Solutes,
    pub isf: Solutes,
    pub icf: Solutes,
    pub fourth: Solutes,
    pub hormones: Hormones,
}

/// Nominal compartment volumes in litres, used as the ideal distribution.
pub const IDEAL_VOLUMES_L: [f64; 3] = [3.0, 12.0, 25.0];

/// Score below which the engine suggests drinking water.
pub const LOW_SCORE_THRESHOLD: i64 = 70;

/// Intravascular sodium below which the engine suggests electrolytes.
pub const LOW_SODIUM_THRESHOLD: f64 = 135.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Water,
    Miso,
    Banana,
    Run,
    Electrolyte,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Water,
        Action::Miso,
        Action::Banana,
        Action::Run,
        Action::Electrolyte,
    ];

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "water" => Ok(Action::Water),
            "miso" => Ok(Action::Miso),
            "banana" => Ok(Action::Banana),
            "run" => Ok(Action::Run),
            "electrolyte" | "electrolytes" => Ok(Action::Electrolyte),
            _ => bail!("Unknown action '{s}'. Valid actions: water, miso, banana, run, electrolyte"),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Action::Water => "Drink Water",
            Action::Miso => "Miso Broth",
            Action::Banana => "Banana",
            Action::Run => "Run 20 min",
            Action::Electrolyte => "Electrolyte Drink",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Action::Water => "Pure water is quickly absorbed into your bloodstream.",
            Action::Miso => "Adds sodium and umami compounds to your bloodstream.",
            Action::Banana => "Adds potassium and glucose, primarily affecting your cells.",
            Action::Run => {
                "Exercise depletes electrolytes through sweat and increases metabolic activity."
            }
            Action::Electrolyte => {
                "Replenishes sodium and water, helping maintain fluid balance."
            }
        }
    }
}

impl CompartmentState {
    /// Euvolemic starting point.
    #[must_use]
    pub fn baseline() -> Self {
        Self {
            ivf: Solutes {
                na: 140.0,
                albumin: 4.0,
                bun: 15.0,
                glucose: 90.0,
                h2o: 3.0,
                ..Solutes::default()
            },
            isf: Solutes {
                na: 140.0,
                cl: 100.0,
                glucose: 90.0,
                h2o: 12.0,
                ..Solutes::default()
            },
            icf: Solutes {
                k: 140.0,
                mg: 30.0,
                pi: 100.0,
                glucose: 20.0,
                h2o: 25.0,
                ..Solutes::default()
            },
            fourth: Solutes {
                h2o: 1.0,
                ..Solutes::default()
            },
            hormones: Hormones::default(),
        }
    }

    /// Apply one action's solute and hormone deltas.
    #[must_use]
    pub fn apply(mut self, action: Action) -> Self {
        match action {
            Action::Water => {
                self.ivf.h2o += 2.0;
                self.hormones.adh -= 1.0;
            }
            Action::Miso => {
                self.ivf.na += 5.0;
                self.ivf.bun += 1.0;
                self.hormones.aldosterone -= 1.0;
            }
            Action::Banana => {
                self.icf.k += 5.0;
                self.icf.glucose += 2.0;
                self.hormones.aldosterone -= 2.0;
            }
            Action::Run => {
                self.isf.na -= 3.0;
                self.isf.cl -= 3.0;
                self.ivf.bun += 1.0;
                self.icf.k -= 2.0;
                self.fourth.urea += 1.0;
                self.fourth.skin += 1.0;
                self.fourth.sweat += 2.0;
                self.hormones.aldosterone += 2.0;
                self.hormones.adh += 2.0;
                self.hormones.cortisol += 1.0;
                self.hormones.testosterone += 1.0;
            }
            Action::Electrolyte => {
                self.ivf.na += 3.0;
                self.ivf.h2o += 2.0;
                self.isf.h2o += 1.0;
                self.hormones.adh -= 1.0;
            }
        }
        self
    }

    /// Blended 0-100 hydration score: total water (up to 50), distribution
    /// against the ideal volumes (up to 30), osmolality uniformity (up to 20).
    #[must_use]
    pub fn hydration_score(&self) -> i64 {
        let total_h2o = self.ivf.h2o + self.isf.h2o + self.icf.h2o + self.fourth.h2o;
        let water_score = (total_h2o / 50.0).min(1.0) * 50.0;

        let actual = [self.ivf.h2o, self.isf.h2o, self.icf.h2o];
        let deviation: f64 = IDEAL_VOLUMES_L
            .iter()
            .zip(actual)
            .map(|(ideal, a)| (ideal - a).abs())
            .sum();
        let distribution_score = (30.0 - deviation).max(0.0);

        let ivf_osm = self.ivf.osmolality();
        let isf_osm = self.isf.osmolality();
        let icf_osm = self.icf.osmolality();
        let avg_osm = (ivf_osm + isf_osm + icf_osm) / 3.0;
        let osm_deviation =
            (ivf_osm - avg_osm).abs() + (isf_osm - avg_osm).abs() + (icf_osm - avg_osm).abs();
        let osm_score = (20.0 - osm_deviation).max(0.0);

        (water_score + distribution_score + osm_score).round() as i64
    }

    /// Rule-based timeline hints: water when the score is low, electrolytes
    /// when intravascular sodium dips.
    #[must_use]
    pub fn suggest(&self) -> Vec<Action> {
        let mut suggestions = Vec::new();
        if self.hydration_score() < LOW_SCORE_THRESHOLD {
            suggestions.push(Action::Water);
        }
        if self.ivf.na < LOW_SODIUM_THRESHOLD {
            suggestions.push(Action::Electrolyte);
        }
        suggestions
    }
}

#[must_use]
pub fn score_status(score: i64) -> &'static str {
    if score >= 80 {
        "Well Hydrated"
    } else if score >= 60 {
        "Adequately Hydrated"
    } else if score >= 40 {
        "Mildly Dehydrated"
    } else {
        "Dehydrated"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationStep {
    pub action: Action,
    pub name: &'static str,
    pub score: i64,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub initial_score: i64,
    pub final_score: i64,
    pub final_status: &'static str,
    pub steps: Vec<SimulationStep>,
    pub suggestions: Vec<Action>,
    pub state: CompartmentState,
}

/// Fold a sequence of actions over the baseline state, scoring after each.
#[must_use]
pub fn simulate(actions: &[Action]) -> SimulationReport {
    let mut state = CompartmentState::baseline();
    let initial_score = state.hydration_score();

    let mut steps = Vec::with_capacity(actions.len());
    for &action in actions {
        state = state.apply(action);
        let score = state.hydration_score();
        steps.push(SimulationStep {
            action,
            name: action.name(),
            score,
            status: score_status(score),
        });
    }

    let final_score = state.hydration_score();
    SimulationReport {
        initial_score,
        final_score,
        final_status: score_status(final_score),
        steps,
        suggestions: state.suggest(),
        state,
    }
}
