//! Scroll velocity tracking.
//!
//! Fed with every scroll offset; tells the viewport which way the user is
//! heading and how far ahead it is worth preloading.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples no further apart than this are ignored
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Number of recent deltas kept for the stability check
const HISTORY_LEN: usize = 5;

/// Mean absolute delta below which scrolling counts as settling
const STABLE_MEAN_DELTA: f64 = 50.0;

/// Offset changes at or below this don't flip the direction
const DIRECTION_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollDirection {
    #[default]
    None,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Default)]
pub struct ScrollPredictor {
    offset: f64,
    last_update: Option<Instant>,
    /// Units per second, signed
    velocity: f64,
    direction: ScrollDirection,
    deltas: VecDeque<f64>,
}

impl ScrollPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, offset: f64) {
        self.update_at(offset, Instant::now());
    }

    /// Record an offset observed at `now`
    pub fn update_at(&mut self, offset: f64, now: Instant) {
        let Some(last) = self.last_update else {
            self.offset = offset;
            self.last_update = Some(now);
            return;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed <= MIN_SAMPLE_INTERVAL {
            return;
        }

        let delta = offset - self.offset;
        self.velocity = delta / elapsed.as_secs_f64();
        if delta.abs() > DIRECTION_THRESHOLD {
            self.direction = if delta > 0.0 {
                ScrollDirection::Forward
            } else {
                ScrollDirection::Backward
            };
        }

        self.deltas.push_back(delta);
        if self.deltas.len() > HISTORY_LEN {
            self.deltas.pop_front();
        }
        self.offset = offset;
        self.last_update = Some(now);
    }

    /// How many items to preload at the current speed
    pub fn preload_count(&self) -> usize {
        match self.velocity.abs() {
            v if v > 2000.0 => 200,
            v if v > 1000.0 => 150,
            v if v > 500.0 => 100,
            _ => 50,
        }
    }

    /// True when recent movement is small (or there is none yet)
    pub fn is_stabilizing(&self) -> bool {
        if self.deltas.is_empty() {
            return true;
        }
        let mean = self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64;
        mean < STABLE_MEAN_DELTA
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
