//! Fixed timestep scheduler
//!
//! Decouples simulation rate from render rate. The host calls `update` once per
//! rendered frame with a monotonically increasing timestamp (seconds); the loop
//! runs zero or more fixed steps and then exactly one render pass.

use crate::consts::{MAX_FRAME_TIME, MAX_STEPS_PER_UPDATE, SIM_DT};
use crate::tuning::TimestepTuning;

/// Receives the two callbacks of a scheduler update
pub trait FrameHandler {
    /// One simulation step of exactly `dt` seconds
    fn fixed_update(&mut self, dt: f32);
    /// One render pass; `alpha` is the fraction of a step left in the accumulator
    fn render(&mut self, alpha: f32);
}

struct ClosureHandler<F, R> {
    fixed: F,
    render: R,
}

impl<F: FnMut(f32), R: FnMut(f32)> FrameHandler for ClosureHandler<F, R> {
    fn fixed_update(&mut self, dt: f32) {
        (self.fixed)(dt)
    }

    fn render(&mut self, alpha: f32) {
        (self.render)(alpha)
    }
}

/// A sampled scalar input signal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    /// When the sample was taken (seconds)
    pub timestamp: f64,
    /// Signal value (pointer position, axis, ...)
    pub value: f32,
}

/// Diagnostics view of the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopStats {
    pub running: bool,
    pub accumulator: f64,
    pub fixed_dt: f64,
    pub max_frame_time: f64,
    /// Fixed steps run by the most recent `update`
    pub last_step_count: u32,
}

/// Accumulator-based fixed timestep loop
#[derive(Debug, Clone)]
pub struct FixedTimestepLoop {
    fixed_dt: f64,
    max_frame_time: f64,
    max_steps: u32,
    accumulator: f64,
    /// `None` until the first update after `start`
    last_time: Option<f64>,
    running: bool,
    last_step_count: u32,
    current_input: InputState,
    previous_input: InputState,
}

impl Default for FixedTimestepLoop {
    fn default() -> Self {
        Self::new(SIM_DT as f64, MAX_FRAME_TIME as f64)
    }
}

impl FixedTimestepLoop {
    pub fn new(fixed_dt: f64, max_frame_time: f64) -> Self {
        Self {
            fixed_dt,
            max_frame_time,
            max_steps: MAX_STEPS_PER_UPDATE,
            accumulator: 0.0,
            last_time: None,
            running: false,
            last_step_count: 0,
            current_input: InputState::default(),
            previous_input: InputState::default(),
        }
    }

    pub fn from_tuning(tuning: &TimestepTuning) -> Self {
        let mut lp = Self::new(tuning.fixed_dt, tuning.max_frame_time);
        lp.max_steps = tuning.max_steps_per_update.max(1);
        lp
    }

    /// Begin running; the next `update` only records its timestamp
    pub fn start(&mut self) {
        self.running = true;
        self.accumulator = 0.0;
        self.last_time = None;
    }

    /// Stop running. Accumulator and timestamps are left as they are.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Stop and forget all timing state
    pub fn reset(&mut self) {
        self.running = false;
        self.accumulator = 0.0;
        self.last_time = None;
        self.last_step_count = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advance to `now`, returning how many fixed steps ran
    pub fn update<H: FrameHandler + ?Sized>(&mut self, now: f64, handler: &mut H) -> u32 {
        if !self.running {
            return 0;
        }

        let Some(last) = self.last_time else {
            self.last_time = Some(now);
            self.last_step_count = 0;
            return 0;
        };

        // Clamp frame time to prevent spiral of death
        let frame_time = (now - last).clamp(0.0, self.max_frame_time);
        self.last_time = Some(now);
        self.accumulator += frame_time;

        let mut steps = 0;
        while self.accumulator >= self.fixed_dt && steps < self.max_steps {
            handler.fixed_update(self.fixed_dt as f32);
            self.accumulator -= self.fixed_dt;
            steps += 1;
        }

        // Backlog beyond the step cap is dropped, not carried into later frames
        if self.accumulator >= self.fixed_dt {
            log::debug!(
                "Timestep backlog of {:.3}s discarded after {} steps",
                self.accumulator,
                steps
            );
            self.accumulator %= self.fixed_dt;
        }
        self.last_step_count = steps;

        handler.render(self.alpha());
        steps
    }

    /// Closure form of [`update`](Self::update)
    pub fn update_with<F, R>(&mut self, now: f64, fixed_update: F, render: R) -> u32
    where
        F: FnMut(f32),
        R: FnMut(f32),
    {
        let mut handler = ClosureHandler {
            fixed: fixed_update,
            render,
        };
        self.update(now, &mut handler)
    }

    /// Interpolation factor between the last two fixed steps
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.fixed_dt) as f32
    }

    pub fn update_input_state(&mut self, state: InputState) {
        self.previous_input = self.current_input;
        self.current_input = state;
    }

    pub fn current_input_state(&self) -> InputState {
        self.current_input
    }

    /// Linear blend of the previous and current input samples
    pub fn interpolated_input_state(&self, alpha: f32) -> InputState {
        let prev = self.previous_input;
        let cur = self.current_input;
        InputState {
            timestamp: prev.timestamp + (cur.timestamp - prev.timestamp) * alpha as f64,
            value: prev.value + (cur.value - prev.value) * alpha,
        }
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            running: self.running,
            accumulator: self.accumulator,
            fixed_dt: self.fixed_dt,
            max_frame_time: self.max_frame_time,
            last_step_count: self.last_step_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Recorder {
        fixed: Vec<f32>,
        renders: Vec<f32>,
    }

    impl FrameHandler for Recorder {
        fn fixed_update(&mut self, dt: f32) {
            self.fixed.push(dt);
        }

        fn render(&mut self, alpha: f32) {
            self.renders.push(alpha);
        }
    }

    const DT: f64 = 1.0 / 60.0;

    #[test]
    fn test_not_running_is_noop() {
        let mut lp = FixedTimestepLoop::default();
        let mut rec = Recorder::default();
        lp.update(0.0, &mut rec);
        lp.update(1.0, &mut rec);
        assert!(rec.fixed.is_empty());
        assert!(rec.renders.is_empty());
    }

    #[test]
    fn test_first_update_primes_only() {
        let mut lp = FixedTimestepLoop::new(DT, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        assert_eq!(lp.update(5.0, &mut rec), 0);
        assert!(rec.fixed.is_empty());
        assert!(rec.renders.is_empty());
    }

    #[test]
    fn test_one_step_per_frame_at_sixty_hz() {
        let mut lp = FixedTimestepLoop::new(DT, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        lp.update(0.0, &mut rec);
        lp.update(DT, &mut rec);

        assert_eq!(rec.fixed.len(), 1);
        assert!((rec.fixed[0] - (1.0 / 60.0) as f32).abs() < 1e-7);
        assert_eq!(rec.renders.len(), 1);
    }

    #[test]
    fn test_long_frame_is_clamped_and_capped() {
        let mut lp = FixedTimestepLoop::new(DT, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        lp.update(0.0, &mut rec);
        let steps = lp.update(0.5, &mut rec);

        // 0.25s clamp would allow 15 steps; the per-call cap wins
        let uncapped = (0.25 / DT).floor() as u32;
        assert_eq!(steps, uncapped.min(MAX_STEPS_PER_UPDATE));
        assert_eq!(rec.renders.len(), 1);
        // Backlog discarded
        assert!(lp.stats().accumulator < DT);
    }

    #[test]
    fn test_clamped_frame_below_cap_runs_every_step() {
        let mut lp = FixedTimestepLoop::new(0.05, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        lp.update(0.0, &mut rec);
        let steps = lp.update(0.5, &mut rec);
        assert_eq!(steps, 5);
    }

    #[test]
    fn test_alpha_reflects_leftover() {
        let mut lp = FixedTimestepLoop::new(0.1, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        lp.update(0.0, &mut rec);
        lp.update(0.15, &mut rec);
        assert_eq!(rec.fixed.len(), 1);
        assert!((rec.renders[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_pause_keeps_accumulator_and_start_resets() {
        let mut lp = FixedTimestepLoop::new(0.1, 0.25);
        let mut rec = Recorder::default();
        lp.start();
        lp.update(0.0, &mut rec);
        lp.update(0.15, &mut rec);
        let acc = lp.stats().accumulator;

        lp.pause();
        lp.update(10.0, &mut rec);
        assert_eq!(lp.stats().accumulator, acc);
        assert_eq!(rec.fixed.len(), 1);

        lp.start();
        assert_eq!(lp.stats().accumulator, 0.0);
        // Re-primes instead of computing a 10s delta
        assert_eq!(lp.update(20.0, &mut rec), 0);
    }

    #[test]
    fn test_reset() {
        let mut lp = FixedTimestepLoop::new(0.1, 0.25);
        lp.start();
        lp.update_with(0.0, |_| {}, |_| {});
        lp.update_with(0.05, |_| {}, |_| {});
        lp.reset();
        let stats = lp.stats();
        assert!(!stats.running);
        assert_eq!(stats.accumulator, 0.0);
    }

    #[test]
    fn test_update_with_closures() {
        let mut lp = FixedTimestepLoop::new(DT, 0.25);
        let mut steps = 0;
        let mut renders = 0;
        lp.start();
        lp.update_with(0.0, |_| steps += 1, |_| renders += 1);
        lp.update_with(3.0 * DT + 0.001, |_| steps += 1, |_| renders += 1);
        assert_eq!(steps, 3);
        assert_eq!(renders, 1);
    }

    #[test]
    fn test_input_interpolation() {
        let mut lp = FixedTimestepLoop::default();
        lp.update_input_state(InputState { timestamp: 1.0, value: 0.0 });
        lp.update_input_state(InputState { timestamp: 2.0, value: 10.0 });

        assert_eq!(lp.current_input_state().value, 10.0);
        let mid = lp.interpolated_input_state(0.5);
        assert!((mid.value - 5.0).abs() < 1e-6);
        assert!((mid.timestamp - 1.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_step_bound_and_single_render(deltas in prop::collection::vec(0.0f64..2.0, 1..60)) {
            let mut lp = FixedTimestepLoop::new(DT, 0.25);
            let mut rec = Recorder::default();
            lp.start();
            let mut now = 0.0;
            lp.update(now, &mut rec);

            for d in deltas {
                now += d;
                let before_renders = rec.renders.len();
                let steps = lp.update(now, &mut rec);
                prop_assert!(steps <= MAX_STEPS_PER_UPDATE);
                prop_assert_eq!(rec.renders.len(), before_renders + 1);
                prop_assert!(lp.alpha() < 1.0 + 1e-6);
            }
        }
    }
}
