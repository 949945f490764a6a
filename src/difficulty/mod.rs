//! Adaptive difficulty
//!
//! Turns a rolling history of player performance into a multiplier in
//! `[min_multiplier, max_multiplier]` and a coarse tier. A hand-tuned
//! heuristic always runs; once a learned model has been trained its
//! prediction is blended in. Model training never happens inside a
//! simulation tick: the controller only raises a request, and the host calls
//! `run_pending_training` from an idle point.

pub mod model;
pub mod storage;

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::RUN_SPEED_BASE;
use crate::tuning::DifficultyTuning;

pub use model::{ModelError, ModelState, RegressionModel, TinyMlp, TrainOptions, TrainingSample};
pub use storage::{JsonFileModelStorage, MemoryModelStorage, ModelStorage};

/// Reaction time assumed when none has been recorded (ms)
const DEFAULT_REACTION_MS: f32 = 100.0;
/// How many recent samples feed the heuristic
const HEURISTIC_WINDOW: usize = 3;
/// How many recent samples feed the confidence estimate
const CONFIDENCE_WINDOW: usize = 5;

/// Coarse difficulty band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifficultyTier {
    Relax,
    #[default]
    Flow,
    Hardcore,
}

/// Observable controller output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyState {
    /// 10..=95
    pub confidence: f32,
    pub tier: DifficultyTier,
    pub multiplier: f32,
    pub using_heuristics: bool,
    pub using_model: bool,
    /// Time of the last adjustment (seconds)
    pub last_adjustment: f64,
}

impl Default for DifficultyState {
    fn default() -> Self {
        Self {
            confidence: 50.0,
            tier: DifficultyTier::Flow,
            multiplier: 1.0,
            using_heuristics: true,
            using_model: false,
            last_adjustment: 0.0,
        }
    }
}

/// One sample of player performance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub deaths: u32,
    pub score: f32,
    /// Seconds since the session started
    pub session_length: f64,
    /// Average recent reaction time (ms)
    pub reaction_time: f32,
    pub distance: f32,
    pub current_speed: f32,
    pub obstacle_density: f32,
    pub timestamp: f64,
}

/// Partial metrics report from the host; missing or non-finite fields fall
/// back to defaults
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsUpdate {
    pub score: Option<f32>,
    pub distance: Option<f32>,
    pub current_speed: Option<f32>,
    pub obstacle_density: Option<f32>,
}

/// Debug view of the controller's buffers
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: DifficultyState,
    pub model_state: ModelState,
    pub death_count: u32,
    pub history_len: usize,
    pub reaction_times: Vec<f32>,
    pub training_examples: usize,
    pub training_requested: bool,
}

pub struct DifficultyController {
    tuning: DifficultyTuning,
    state: DifficultyState,
    history: VecDeque<PerformanceMetrics>,
    reaction_times: VecDeque<f32>,
    death_count: u32,
    session_start: f64,
    last_adjustment: Option<f64>,
    model: Option<Box<dyn RegressionModel>>,
    model_state: ModelState,
    storage: Box<dyn ModelStorage>,
    training: VecDeque<TrainingSample>,
    training_requested: bool,
    rng: Pcg32,
}

impl std::fmt::Debug for DifficultyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifficultyController")
            .field("state", &self.state)
            .field("model_state", &self.model_state)
            .field("history", &self.history.len())
            .field("training", &self.training.len())
            .finish_non_exhaustive()
    }
}

fn finite_or(value: Option<f32>, default: f32) -> f32 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Heuristic multiplier over a window of samples.
///
/// Deaths pull it down; score, quick reactions and distance push it up.
fn heuristic_multiplier(samples: &[PerformanceMetrics]) -> f32 {
    if samples.is_empty() {
        return 1.0;
    }
    let n = samples.len() as f32;
    let avg = |f: fn(&PerformanceMetrics) -> f32| samples.iter().map(f).sum::<f32>() / n;

    let deaths = avg(|m| m.deaths as f32);
    let score = avg(|m| m.score);
    let reaction = avg(|m| m.reaction_time);
    let distance = avg(|m| m.distance);

    let mut multiplier = 1.0;
    multiplier -= (deaths * 0.15).min(0.5);
    multiplier += (score / 1000.0 * 0.1).min(0.4);
    multiplier += (300.0 - reaction.clamp(50.0, 300.0)) / 300.0 * 0.2;
    multiplier += (distance / 1000.0 * 0.05).min(0.2);
    multiplier
}

/// Normalized model inputs: score, inverse density, reaction time
fn features(m: &PerformanceMetrics) -> [f32; 3] {
    [
        (m.score / 10_000.0).min(1.0),
        1.0 - m.obstacle_density.min(1.0),
        (m.reaction_time / 500.0).min(1.0),
    ]
}

impl DifficultyController {
    /// Controller backed by a fresh `TinyMlp`, loading saved weights if any
    pub fn new(tuning: DifficultyTuning, storage: Box<dyn ModelStorage>, seed: u64) -> Self {
        Self::with_model(tuning, Box::new(TinyMlp::new(seed)), storage, seed)
    }

    /// Controller with a caller-supplied regressor
    pub fn with_model(
        tuning: DifficultyTuning,
        model: Box<dyn RegressionModel>,
        storage: Box<dyn ModelStorage>,
        seed: u64,
    ) -> Self {
        let mut controller = Self::build(tuning, Some(model), storage, seed);
        controller.initialize_model();
        controller
    }

    /// Controller that never consults a learned model
    pub fn heuristic_only(tuning: DifficultyTuning) -> Self {
        Self::build(tuning, None, Box::new(MemoryModelStorage::default()), 0)
    }

    fn build(
        tuning: DifficultyTuning,
        model: Option<Box<dyn RegressionModel>>,
        storage: Box<dyn ModelStorage>,
        seed: u64,
    ) -> Self {
        Self {
            tuning: tuning.validated(),
            state: DifficultyState::default(),
            history: VecDeque::new(),
            reaction_times: VecDeque::new(),
            death_count: 0,
            session_start: 0.0,
            last_adjustment: None,
            model,
            model_state: ModelState::Uninitialized,
            storage,
            training: VecDeque::new(),
            training_requested: false,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    fn initialize_model(&mut self) {
        let Some(model) = self.model.as_mut() else {
            return;
        };
        self.model_state = match model.load(self.storage.as_ref()) {
            Ok(true) => {
                log::info!("Loaded saved difficulty model");
                ModelState::Trained
            }
            Ok(false) => ModelState::HeuristicOnly,
            Err(e) => {
                log::warn!("Could not load difficulty model, using heuristics: {e}");
                ModelState::HeuristicOnly
            }
        };
        self.state.using_model = self.model_state == ModelState::Trained;
    }

    pub fn start_session(&mut self, now: f64) {
        self.session_start = now;
        self.death_count = 0;
        self.history.clear();
        self.reaction_times.clear();
        self.last_adjustment = None;
    }

    pub fn record_death(&mut self) {
        self.death_count += 1;
    }

    /// Record a reaction time in milliseconds; invalid values are dropped
    pub fn record_reaction_time(&mut self, ms: f32) {
        if !ms.is_finite() || ms < 0.0 {
            return;
        }
        self.reaction_times.push_back(ms);
        while self.reaction_times.len() > self.tuning.reaction_capacity {
            self.reaction_times.pop_front();
        }
    }

    fn average_reaction_time(&self) -> f32 {
        if self.reaction_times.is_empty() {
            return DEFAULT_REACTION_MS;
        }
        self.reaction_times.iter().sum::<f32>() / self.reaction_times.len() as f32
    }

    /// Append a performance sample and adjust if the interval has elapsed.
    ///
    /// Returns true when an adjustment ran.
    pub fn update_metrics(&mut self, update: MetricsUpdate, now: f64) -> bool {
        let sample = PerformanceMetrics {
            deaths: self.death_count,
            score: finite_or(update.score, 0.0).max(0.0),
            session_length: (now - self.session_start).max(0.0),
            reaction_time: self.average_reaction_time(),
            distance: finite_or(update.distance, 0.0).max(0.0),
            current_speed: finite_or(update.current_speed, RUN_SPEED_BASE),
            obstacle_density: finite_or(update.obstacle_density, 1.0),
            timestamp: now,
        };
        self.history.push_back(sample);
        while self.history.len() > self.tuning.history_capacity {
            self.history.pop_front();
        }

        let due = match self.last_adjustment {
            None => true,
            Some(last) => now - last >= self.tuning.adjustment_interval,
        };
        due && self.adjust_difficulty(now)
    }

    /// Recompute the multiplier, tier and confidence from recent history.
    ///
    /// Needs at least two samples; returns false otherwise.
    pub fn adjust_difficulty(&mut self, now: f64) -> bool {
        if self.history.len() < 2 {
            return false;
        }

        let recent: Vec<PerformanceMetrics> = self
            .history
            .iter()
            .rev()
            .take(HEURISTIC_WINDOW)
            .copied()
            .collect();
        let heuristic = heuristic_multiplier(&recent);
        let mut multiplier = heuristic;

        if self.model_state == ModelState::Trained {
            if let Some(model) = self.model.as_ref() {
                match model.predict(features(&recent[0])) {
                    Ok(y) => {
                        let learned = 0.5 + y * 1.5;
                        let w = self.tuning.heuristic_weight;
                        multiplier = heuristic * w + learned * (1.0 - w);
                    }
                    Err(e) => log::warn!("Difficulty model prediction failed: {e}"),
                }
            }
        }
        if !multiplier.is_finite() {
            multiplier = if heuristic.is_finite() { heuristic } else { 1.0 };
        }
        let multiplier = multiplier.clamp(self.tuning.min_multiplier, self.tuning.max_multiplier);

        self.state.multiplier = multiplier;
        self.state.tier = self.tier_for(multiplier);
        self.state.confidence = self.compute_confidence();
        self.state.using_heuristics = true;
        self.state.using_model = self.model_state == ModelState::Trained;
        self.state.last_adjustment = now;
        self.last_adjustment = Some(now);

        log::debug!(
            "Difficulty {:.2} ({:?}, confidence {:.0})",
            multiplier,
            self.state.tier,
            self.state.confidence
        );

        if self.training.len() >= self.tuning.min_training_examples
            && self.rng.random::<f32>() < self.tuning.training_probability
        {
            self.training_requested = true;
        }
        true
    }

    fn tier_for(&self, multiplier: f32) -> DifficultyTier {
        if multiplier < self.tuning.relax_cutoff {
            DifficultyTier::Relax
        } else if multiplier > self.tuning.hardcore_cutoff {
            DifficultyTier::Hardcore
        } else {
            DifficultyTier::Flow
        }
    }

    /// High when recent single-sample heuristics agree
    fn compute_confidence(&self) -> f32 {
        let values: Vec<f32> = self
            .history
            .iter()
            .rev()
            .take(CONFIDENCE_WINDOW)
            .map(|m| heuristic_multiplier(std::slice::from_ref(m)))
            .collect();
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        (100.0 - variance.sqrt() * 100.0).clamp(10.0, 95.0)
    }

    /// Buffer a labelled example: `actual_multiplier` is what turned out to suit the player
    pub fn add_training_data(&mut self, metrics: &PerformanceMetrics, actual_multiplier: f32) {
        let features = features(metrics);
        if !actual_multiplier.is_finite() || features.iter().any(|f| !f.is_finite()) {
            return;
        }
        let label = ((actual_multiplier - 0.5) / 1.5).clamp(0.0, 1.0);
        self.training.push_back(TrainingSample { features, label });
        while self.training.len() > self.tuning.training_capacity {
            self.training.pop_front();
        }
    }

    /// Ask for a training run at the next idle point
    pub fn request_training(&mut self) {
        self.training_requested = true;
    }

    pub fn training_pending(&self) -> bool {
        self.training_requested
    }

    /// Train the model if a run was requested. Failures are logged and leave
    /// the previous model state in place. Returns true when a run succeeded.
    pub fn run_pending_training(&mut self) -> bool {
        if !self.training_requested {
            return false;
        }
        self.training_requested = false;

        let Some(model) = self.model.as_mut() else {
            return false;
        };
        if self.training.len() < self.tuning.min_training_examples {
            log::debug!(
                "Skipping training: {} of {} examples",
                self.training.len(),
                self.tuning.min_training_examples
            );
            return false;
        }

        let samples: Vec<TrainingSample> = self.training.iter().copied().collect();
        let options = TrainOptions {
            epochs: self.tuning.epochs,
            batch_size: self.tuning.batch_size,
            learning_rate: self.tuning.learning_rate,
        };
        match model.fit(&samples, &options) {
            Ok(loss) => {
                log::info!("Difficulty model trained on {} examples, loss {loss:.4}", samples.len());
                self.model_state = ModelState::Trained;
                self.state.using_model = true;
                if let Err(e) = model.save(self.storage.as_mut()) {
                    log::warn!("Failed to save difficulty model: {e}");
                }
                true
            }
            Err(e) => {
                log::warn!("Difficulty model training failed: {e}");
                false
            }
        }
    }

    pub fn state(&self) -> DifficultyState {
        self.state
    }

    pub fn difficulty_multiplier(&self) -> f32 {
        self.state.multiplier
    }

    pub fn confidence(&self) -> f32 {
        self.state.confidence
    }

    pub fn current_tier(&self) -> DifficultyTier {
        self.state.tier
    }

    pub fn model_state(&self) -> ModelState {
        self.model_state
    }

    pub fn latest_metrics(&self) -> Option<&PerformanceMetrics> {
        self.history.back()
    }

    pub fn snapshot_internal_state(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            model_state: self.model_state,
            death_count: self.death_count,
            history_len: self.history.len(),
            reaction_times: self.reaction_times.iter().copied().collect(),
            training_examples: self.training.len(),
            training_requested: self.training_requested,
        }
    }

    /// Drop all history and output; the model and its state are kept
    #[doc(hidden)]
    pub fn reset_for_test(&mut self) {
        self.state = DifficultyState {
            using_model: self.model_state == ModelState::Trained,
            ..DifficultyState::default()
        };
        self.history.clear();
        self.reaction_times.clear();
        self.death_count = 0;
        self.session_start = 0.0;
        self.last_adjustment = None;
        self.training.clear();
        self.training_requested = false;
    }
}
