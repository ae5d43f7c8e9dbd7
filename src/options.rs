//! Engine options (`open`'s parameter record), per §4.9 and the environment controls of §6.

use std::time::Duration;

use serde::Deserialize;

use crate::downsample::DEFAULT_MINMAX_RATIO;
use crate::filter::{DEFAULT_SAMPLE_RATIO, DEFAULT_SAMPLE_ROWS_MIN};

const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MAX_DISPLAY_POINTS: usize = 4_000;

/// Options accepted by [`crate::Engine::open`]. Four fields are additionally overridable from
/// the environment when the caller leaves them at their default, per §6 "Environment controls".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub follow: bool,
    pub sample_rows_min: usize,
    pub sample_ratio: f64,
    pub max_display_points: usize,
    pub minmax_ratio: usize,
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            follow: false,
            sample_rows_min: DEFAULT_SAMPLE_ROWS_MIN,
            sample_ratio: DEFAULT_SAMPLE_RATIO,
            max_display_points: DEFAULT_MAX_DISPLAY_POINTS,
            minmax_ratio: DEFAULT_MINMAX_RATIO,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl EngineOptions {
    /// Applies environment-variable overrides for any field still at its default value.
    /// Caller-supplied non-default values always win.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let defaults = Self::default();

        if self.poll_interval == defaults.poll_interval {
            if let Some(ms) = env_u64("LIVEPLOT_POLL_INTERVAL_MS") {
                self.poll_interval = Duration::from_millis(ms);
            }
        }
        if self.max_display_points == defaults.max_display_points {
            if let Some(v) = env_usize("LIVEPLOT_MAX_DISPLAY_POINTS") {
                self.max_display_points = v;
            }
        }
        if self.minmax_ratio == defaults.minmax_ratio {
            if let Some(v) = env_usize("LIVEPLOT_MINMAX_RATIO") {
                self.minmax_ratio = v;
            }
        }
        if self.sample_rows_min == defaults.sample_rows_min {
            if let Some(v) = env_usize("LIVEPLOT_SAMPLE_ROWS_MIN") {
                self.sample_rows_min = v;
            }
        }
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_table() {
        let opts = EngineOptions::default();
        assert_eq!(opts.poll_interval, Duration::from_secs(5));
        assert_eq!(opts.max_display_points, 4_000);
        assert_eq!(opts.minmax_ratio, 4);
        assert_eq!(opts.sample_rows_min, 64);
    }

    #[test]
    fn caller_override_is_not_clobbered_by_env() {
        unsafe {
            std::env::set_var("LIVEPLOT_MAX_DISPLAY_POINTS", "9999");
        }
        let mut opts = EngineOptions::default();
        opts.max_display_points = 100;
        let opts = opts.with_env_overrides();
        assert_eq!(opts.max_display_points, 100);
        unsafe {
            std::env::remove_var("LIVEPLOT_MAX_DISPLAY_POINTS");
        }
    }
}
