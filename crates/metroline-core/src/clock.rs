//! Simulation clock: real-time deltas in, simulated seconds and calendar out.
//!
//! Callers feed the clock monotonic real timestamps. The clock turns each
//! into a simulated delta by clamping it to the configured maximum (a long
//! stall such as a suspended tab must not replay minutes of simulation at
//! once) and scaling it by the current [`TimeMultiplier`].
//!
//! Days and weeks are derived from the elapsed simulated time, never stored
//! independently.

use serde::{Deserialize, Serialize};

use metroline_types::TimeMultiplier;

use crate::config::TimeConfig;

/// Errors that can occur when building a clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Invalid time configuration.
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// What one call to [`SimClock::advance`] produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockAdvance {
    /// Simulated seconds that passed.
    pub dt: f64,
    /// Whether this step crossed into a new day.
    pub new_day: bool,
    /// Whether this step crossed a week boundary.
    pub week_rolled: bool,
}

/// Simulation clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    /// Simulated seconds since the session started.
    elapsed: f64,
    /// Current speed setting.
    multiplier: TimeMultiplier,
    /// Simulated seconds per day.
    seconds_per_day: f64,
    /// Days per week.
    days_per_week: u32,
    /// Largest real delta a single step may consume, in seconds.
    max_delta_secs: f64,
    /// Last real timestamp seen, in milliseconds. Not persisted: a restored
    /// clock starts a fresh real-time baseline.
    #[serde(skip)]
    last_timestamp_ms: Option<f64>,
}

impl SimClock {
    /// Create a clock at simulated time zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the day length is not
    /// positive or the week has no days.
    pub fn new(config: &TimeConfig) -> Result<Self, ClockError> {
        if !(config.seconds_per_day.is_finite() && config.seconds_per_day > 0.0) {
            return Err(ClockError::InvalidConfig {
                reason: "seconds_per_day must be positive".to_owned(),
            });
        }
        if config.days_per_week == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "days_per_week must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            elapsed: 0.0,
            multiplier: TimeMultiplier::default(),
            seconds_per_day: config.seconds_per_day,
            days_per_week: config.days_per_week,
            max_delta_secs: millis_to_secs(config.max_tick_delta_ms),
            last_timestamp_ms: None,
        })
    }

    /// Simulated seconds since the session started.
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Current speed setting.
    pub const fn multiplier(&self) -> TimeMultiplier {
        self.multiplier
    }

    /// Change the speed setting.
    pub const fn set_multiplier(&mut self, multiplier: TimeMultiplier) {
        self.multiplier = multiplier;
    }

    /// Completed days.
    pub fn day(&self) -> u64 {
        whole(self.elapsed / self.seconds_per_day)
    }

    /// Completed weeks.
    pub fn week(&self) -> u64 {
        self.day() / u64::from(self.days_per_week)
    }

    /// Day within the current week, starting at zero.
    pub fn day_of_week(&self) -> u64 {
        self.day() % u64::from(self.days_per_week)
    }

    /// Feed a monotonic real timestamp in milliseconds.
    ///
    /// The first call only establishes the baseline and advances nothing.
    /// Timestamps that go backwards count as zero elapsed time.
    pub fn advance(&mut self, timestamp_ms: f64) -> ClockAdvance {
        let real_secs = self
            .last_timestamp_ms
            .map_or(0.0, |last| (timestamp_ms - last) / 1000.0);
        self.last_timestamp_ms = Some(timestamp_ms);
        self.advance_real(real_secs)
    }

    /// Move the real-time baseline to `timestamp_ms` without advancing.
    ///
    /// Used while the session is paused or halted so that resuming does
    /// not count the pause as elapsed time.
    pub const fn rebase(&mut self, timestamp_ms: f64) {
        self.last_timestamp_ms = Some(timestamp_ms);
    }

    /// Advance by a real-time delta in seconds, applying the clamp and the
    /// multiplier.
    pub fn advance_real(&mut self, real_secs: f64) -> ClockAdvance {
        let clamped = if real_secs.is_finite() {
            real_secs.clamp(0.0, self.max_delta_secs)
        } else {
            0.0
        };
        let dt = clamped * self.multiplier.factor();

        let day_before = self.day();
        let week_before = self.week();
        self.elapsed += dt;
        ClockAdvance {
            dt,
            new_day: self.day() > day_before,
            week_rolled: self.week() > week_before,
        }
    }
}

fn millis_to_secs(ms: u64) -> f64 {
    u32::try_from(ms).map_or(f64::from(u32::MAX), f64::from) / 1000.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u64
    } else {
        0
    }
}
