//! CPU load metering.
//!
//! Tracks what fraction of the real-time budget each block's processing
//! consumed, exposed as both a smoothed running average and a worst-case
//! value over a recent window — the same two numbers a host's CPU meter
//! widget needs (smoothed for the needle, peak for "you're about to glitch").

use std::collections::VecDeque;
use std::time::Duration;

/// EMA smoothing factor; ~20 blocks to settle, matching the host-facing
/// meter's perceived "instant but not jittery" feel.
const EMA_ALPHA: f32 = 0.1;

/// How long the peak-hold window looks back.
const PEAK_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuLoad {
    /// Exponential moving average of `block_time / block_duration`.
    pub average: f32,
    /// Maximum single-block ratio observed within the peak window.
    pub peak: f32,
}

#[derive(Debug)]
pub struct CpuMeter {
    average: f32,
    samples: VecDeque<(Duration, f32)>,
    clock: Duration,
}

impl CpuMeter {
    pub fn new() -> Self {
        Self {
            average: 0.0,
            samples: VecDeque::new(),
            clock: Duration::ZERO,
        }
    }

    /// Record one block's processing time against the wall-clock duration
    /// that block represents (`frames / sample_rate`).
    pub fn record(&mut self, processing_time: Duration, block_duration: Duration) {
        let ratio = if block_duration.is_zero() {
            0.0
        } else {
            processing_time.as_secs_f32() / block_duration.as_secs_f32()
        };

        self.average += EMA_ALPHA * (ratio - self.average);

        self.clock += block_duration;
        self.samples.push_back((self.clock, ratio));
        while let Some((ts, _)) = self.samples.front() {
            if self.clock.saturating_sub(*ts) > PEAK_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn load(&self) -> CpuLoad {
        let peak = self
            .samples
            .iter()
            .map(|(_, r)| *r)
            .fold(0.0f32, f32::max);
        CpuLoad {
            average: self.average,
            peak,
        }
    }
}

impl Default for CpuMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_within_window() {
        let mut meter = CpuMeter::new();
        let block = Duration::from_millis(5);
        meter.record(Duration::from_millis(1), block);
        meter.record(Duration::from_millis(4), block);
        meter.record(Duration::from_micros(500), block);
        let load = meter.load();
        assert!((load.peak - 0.8).abs() < 1e-3);
    }

    #[test]
    fn old_peaks_fall_out_of_window() {
        let mut meter = CpuMeter::new();
        let block = Duration::from_secs(1);
        meter.record(Duration::from_millis(900), block);
        for _ in 0..3 {
            meter.record(Duration::from_millis(10), block);
        }
        let load = meter.load();
        assert!(load.peak < 0.9);
    }
}
