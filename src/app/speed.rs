//! Throughput sampling and time-remaining estimates
//!
//! The estimator keeps a short sliding window of instantaneous throughput
//! samples, one per chunk, each computed from the time elapsed since the
//! previous chunk arrived. The average of the window drives the estimate.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::constants::speed;

/// Human-readable estimate of the time left for a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRemaining {
    /// No throughput samples yet
    #[default]
    Calculating,
    /// Waiting for a concurrency slot
    Waiting,
    /// Nothing left to estimate
    Done,
    /// Under a minute
    Seconds(u64),
    /// Under an hour, rounded up
    Minutes(u64),
    /// An hour or more
    HoursMinutes(u64, u64),
}

impl TimeRemaining {
    /// Format a remaining duration given in milliseconds
    ///
    /// Under a minute reports whole seconds, under an hour whole minutes,
    /// otherwise hours plus the remaining minutes. Values are rounded up and
    /// a rounded-up unit carries into the next one, so "60s" and "1 h 60 min"
    /// never appear.
    pub fn from_millis(remaining_ms: f64) -> Self {
        if !remaining_ms.is_finite() || remaining_ms < 0.0 {
            return Self::Calculating;
        }

        let seconds = (remaining_ms / speed::MS_PER_SECOND).ceil() as u64;
        if seconds < 60 {
            return Self::Seconds(seconds);
        }

        let minutes = (remaining_ms / speed::MS_PER_MINUTE).ceil() as u64;
        if minutes < 60 {
            Self::Minutes(minutes)
        } else {
            Self::HoursMinutes(minutes / 60, minutes % 60)
        }
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calculating => write!(f, "calculating"),
            Self::Waiting => write!(f, "waiting"),
            Self::Done => Ok(()),
            Self::Seconds(s) => write!(f, "{}s", s),
            Self::Minutes(m) => write!(f, "{} min", m),
            Self::HoursMinutes(h, m) => write!(f, "{} h {} min", h, m),
        }
    }
}

impl Serialize for TimeRemaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rolling-window throughput estimator for one download run
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    /// Recent samples in bytes per millisecond
    samples: VecDeque<f64>,
    /// Arrival time of the previous chunk (or the run start)
    last_arrival: Instant,
    /// Maximum number of samples kept
    window: usize,
}

impl SpeedEstimator {
    /// Create an estimator whose first sample is measured from `start`
    pub fn new(start: Instant) -> Self {
        Self::with_window(start, speed::WINDOW_SAMPLES)
    }

    /// Create an estimator with a custom window size (at least one sample)
    pub fn with_window(start: Instant, window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            last_arrival: start,
            window,
        }
    }

    /// Record a chunk of `bytes` that arrived at `at`
    ///
    /// Chunks arriving in the same instant as the previous one update the
    /// arrival time without adding a sample.
    pub fn record(&mut self, bytes: u64, at: Instant) {
        let elapsed_ms = at.saturating_duration_since(self.last_arrival).as_secs_f64()
            * speed::MS_PER_SECOND;

        if elapsed_ms > 0.0 {
            self.samples.push_back(bytes as f64 / elapsed_ms);
            while self.samples.len() > self.window {
                self.samples.pop_front();
            }
        }

        self.last_arrival = at;
    }

    /// Number of samples currently in the window
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Average throughput in bytes per millisecond, if it is meaningful
    pub fn average_speed(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        if average.is_finite() && average > 0.0 {
            Some(average)
        } else {
            None
        }
    }

    /// Average throughput in bytes per second
    pub fn bytes_per_second(&self) -> Option<f64> {
        self.average_speed().map(|speed| speed * speed::MS_PER_SECOND)
    }

    /// Estimate the time needed to fetch the rest of the resource
    pub fn time_remaining(&self, total_size: u64, downloaded: u64) -> TimeRemaining {
        match self.average_speed() {
            Some(speed) => {
                let remaining_bytes = total_size.saturating_sub(downloaded) as f64;
                TimeRemaining::from_millis(remaining_bytes / speed)
            }
            None => TimeRemaining::Calculating,
        }
    }
}
