//! Truncated Gutenberg-Richter magnitude-frequency distribution.
//!
//! `log10 N(>= m) = a - b*m`, truncated to `[min_mag, max_mag]` and
//! discretized into bins of `bin_width` centred half a bin above the rounded
//! minimum magnitude. Values are immutable: every modification returns a new
//! distribution, and modifications that leave no room for a single bin yield
//! `None` (a null fork).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::BIN_TOLERANCE;
use crate::error::{CollapseError, Result};

/// A parametric change applied to a distribution by one branch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MfdModification {
    /// Add to b, keeping the cumulative rate at the minimum magnitude fixed.
    IncrementB(f64),
    /// Add to the maximum magnitude.
    IncrementMaxMag(f64),
    /// Replace the maximum magnitude.
    SetMaxMag(f64),
    /// Replace both a and b.
    SetAb { a: f64, b: f64 },
}

impl fmt::Display for MfdModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MfdModification::IncrementB(d) => write!(f, "b {d:+}"),
            MfdModification::IncrementMaxMag(d) => write!(f, "mmax {d:+}"),
            MfdModification::SetMaxMag(m) => write!(f, "mmax = {m}"),
            MfdModification::SetAb { a, b } => write!(f, "a = {a}, b = {b}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruncatedGr {
    pub min_mag: f64,
    pub max_mag: f64,
    pub a_val: f64,
    pub b_val: f64,
    pub bin_width: f64,
}

impl TruncatedGr {
    pub fn new(min_mag: f64, max_mag: f64, a_val: f64, b_val: f64, bin_width: f64) -> Result<Self> {
        Self {
            min_mag,
            max_mag,
            a_val,
            b_val,
            bin_width,
        }
        .checked()
    }

    fn checked(self) -> Result<Self> {
        let invalid = |reason: String| Err(CollapseError::InvalidDistribution { reason });

        let finite = [self.min_mag, self.max_mag, self.a_val, self.b_val, self.bin_width]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return invalid(format!("non-finite parameter in {self}"));
        }
        if !(0.0 <= self.min_mag && self.min_mag <= self.max_mag) {
            return invalid(format!(
                "need 0 <= min_mag <= max_mag, got min_mag={} max_mag={}",
                self.min_mag, self.max_mag
            ));
        }
        if !(self.bin_width > 0.0 && self.bin_width <= self.max_mag - self.min_mag + BIN_TOLERANCE) {
            return invalid(format!(
                "bin width {} does not fit between min_mag={} and max_mag={}",
                self.bin_width, self.min_mag, self.max_mag
            ));
        }
        if self.b_val <= 0.0 {
            return invalid(format!("b value must be positive, got {}", self.b_val));
        }
        Ok(self)
    }

    /// Whether `max_mag` leaves room for at least one bin above `min_mag`.
    fn has_room_for(&self, max_mag: f64) -> bool {
        max_mag >= self.min_mag + self.bin_width
    }

    pub fn increment_b(&self, delta: f64) -> Result<Self> {
        Self {
            a_val: self.a_val + delta * self.min_mag,
            b_val: self.b_val + delta,
            ..*self
        }
        .checked()
    }

    pub fn increment_max_mag(&self, delta: f64) -> Result<Option<Self>> {
        self.set_max_mag(self.max_mag + delta)
    }

    pub fn set_max_mag(&self, max_mag: f64) -> Result<Option<Self>> {
        if !self.has_room_for(max_mag) {
            return Ok(None);
        }
        Self { max_mag, ..*self }.checked().map(Some)
    }

    pub fn set_ab(&self, a_val: f64, b_val: f64) -> Result<Self> {
        Self {
            a_val,
            b_val,
            ..*self
        }
        .checked()
    }

    /// Apply one branch modification; `Ok(None)` when the result is null.
    pub fn apply(&self, modification: &MfdModification) -> Result<Option<Self>> {
        match *modification {
            MfdModification::IncrementB(delta) => self.increment_b(delta).map(Some),
            MfdModification::IncrementMaxMag(delta) => self.increment_max_mag(delta),
            MfdModification::SetMaxMag(max_mag) => self.set_max_mag(max_mag),
            MfdModification::SetAb { a, b } => self.set_ab(a, b).map(Some),
        }
    }

    /// Annual rate of events with magnitude at or above `mag`.
    pub fn cumulative_rate(&self, mag: f64) -> f64 {
        10f64.powf(self.a_val - self.b_val * mag)
    }

    /// Centre of the first bin and number of bins.
    fn bin_layout(&self) -> (f64, usize) {
        let bw = self.bin_width;
        let mut min_mag = (self.min_mag / bw).round_ties_even() * bw;
        let mut max_mag = (self.max_mag / bw).round_ties_even() * bw;
        if min_mag != max_mag {
            min_mag += bw / 2.0;
            max_mag -= bw / 2.0;
        }
        let num_bins = ((max_mag - min_mag) / bw).round_ties_even() as usize + 1;
        (min_mag, num_bins)
    }

    pub fn num_bins(&self) -> usize {
        self.bin_layout().1
    }

    /// Centres of the first and last bins.
    pub fn min_max_mag(&self) -> (f64, f64) {
        let (first, num_bins) = self.bin_layout();
        (first, first + self.bin_width * (num_bins - 1) as f64)
    }

    fn bin_rate(&self, mag: f64) -> f64 {
        let half = self.bin_width / 2.0;
        let lo = self.cumulative_rate(mag - half);
        if mag >= self.min_mag && mag < self.max_mag - half {
            lo - self.cumulative_rate(mag + half)
        } else {
            lo - self.cumulative_rate(self.max_mag)
        }
    }

    /// `(bin centre, annual rate)` for every bin.
    pub fn annual_occurrence_rates(&self) -> Vec<(f64, f64)> {
        let (mut mag, num_bins) = self.bin_layout();
        let mut rates = Vec::with_capacity(num_bins);
        for _ in 0..num_bins {
            rates.push((mag, self.bin_rate(mag)));
            mag += self.bin_width;
        }
        rates
    }

    /// Per-bin annual rates.
    pub fn rates(&self) -> Vec<f64> {
        self.annual_occurrence_rates()
            .into_iter()
            .map(|(_, rate)| rate)
            .collect()
    }
}

impl fmt::Display for TruncatedGr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TruncatedGR(min_mag={}, max_mag={}, a={}, b={}, bin_width={})",
            self.min_mag, self.max_mag, self.a_val, self.b_val, self.bin_width
        )
    }
}
