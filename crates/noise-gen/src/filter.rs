//! Butterworth filter design and zero-phase filtering.
//!
//! Filters are realized as cascades of second-order sections (plus one first-order
//! section for odd orders), run in `f64` through `biquad::DirectForm2Transposed`.
//! Second-order sections come from `biquad`'s bilinear designs with per-section
//! Butterworth Q values, which yields the exact digital Butterworth response.

use std::f64::consts::PI;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::error::SynthesisError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterKind {
    Lowpass(f64),
    Highpass(f64),
    /// Realized as highpass(`low`) followed by lowpass(`high`), each of the given order.
    Bandpass { low: f64, high: f64 },
}

/// Immutable filter parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub order: usize,
    pub sample_rate: u32,
}

impl FilterSpec {
    pub fn lowpass(cutoff_hz: f64, order: usize, sample_rate: u32) -> Self {
        Self {
            kind: FilterKind::Lowpass(cutoff_hz),
            order,
            sample_rate,
        }
    }

    pub fn highpass(cutoff_hz: f64, order: usize, sample_rate: u32) -> Self {
        Self {
            kind: FilterKind::Highpass(cutoff_hz),
            order,
            sample_rate,
        }
    }

    pub fn bandpass(low_hz: f64, high_hz: f64, order: usize, sample_rate: u32) -> Self {
        Self {
            kind: FilterKind::Bandpass {
                low: low_hz,
                high: high_hz,
            },
            order,
            sample_rate,
        }
    }

    /// Validate the parameters and derive section coefficients.
    pub fn design(&self) -> Result<SosFilter, SynthesisError> {
        if self.sample_rate == 0 {
            return Err(SynthesisError::InvalidSampleRate(self.sample_rate));
        }
        if self.order == 0 {
            return Err(SynthesisError::InvalidFilter("order must be at least 1".into()));
        }
        let fs = self.sample_rate as f64;
        let mut sections = Vec::new();
        let lowest_cutoff = match self.kind {
            FilterKind::Lowpass(fc) => {
                check_cutoff(fc, fs)?;
                butterworth_sections(Edge::Low, fc, self.order, fs, &mut sections)?;
                fc
            }
            FilterKind::Highpass(fc) => {
                check_cutoff(fc, fs)?;
                butterworth_sections(Edge::High, fc, self.order, fs, &mut sections)?;
                fc
            }
            FilterKind::Bandpass { low, high } => {
                check_cutoff(low, fs)?;
                check_cutoff(high, fs)?;
                if low >= high {
                    return Err(SynthesisError::InvalidFilter(format!(
                        "bandpass edges out of order: {low} >= {high}"
                    )));
                }
                butterworth_sections(Edge::High, low, self.order, fs, &mut sections)?;
                butterworth_sections(Edge::Low, high, self.order, fs, &mut sections)?;
                low
            }
        };
        Ok(SosFilter {
            sections,
            sample_rate: self.sample_rate,
            lowest_cutoff,
        })
    }
}

fn check_cutoff(fc: f64, fs: f64) -> Result<(), SynthesisError> {
    if !fc.is_finite() || fc <= 0.0 || fc >= fs / 2.0 {
        return Err(SynthesisError::InvalidFilter(format!(
            "cutoff {fc} Hz must lie in (0, {}) Hz",
            fs / 2.0
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Edge {
    Low,
    High,
}

fn butterworth_sections(
    edge: Edge,
    fc: f64,
    order: usize,
    fs: f64,
    out: &mut Vec<Coefficients<f64>>,
) -> Result<(), SynthesisError> {
    let n = order as f64;
    for k in 1..=order / 2 {
        let q = 1.0 / (2.0 * ((2 * k - 1) as f64 * PI / (2.0 * n)).sin());
        let ty = match edge {
            Edge::Low => Type::LowPass,
            Edge::High => Type::HighPass,
        };
        let coeffs = Coefficients::<f64>::from_params(ty, fs.hz(), fc.hz(), q)
            .map_err(|e| SynthesisError::InvalidFilter(format!("{e:?}")))?;
        out.push(coeffs);
    }
    if order % 2 == 1 {
        out.push(first_order(edge, fc, fs));
    }
    Ok(())
}

/// Bilinear transform of `wc/(s+wc)` or `s/(s+wc)`, prewarped at `fc`.
fn first_order(edge: Edge, fc: f64, fs: f64) -> Coefficients<f64> {
    let k = (PI * fc / fs).tan();
    let a1 = (k - 1.0) / (k + 1.0);
    let (b0, b1) = match edge {
        Edge::Low => (k / (1.0 + k), k / (1.0 + k)),
        Edge::High => (1.0 / (1.0 + k), -1.0 / (1.0 + k)),
    };
    Coefficients {
        a1,
        a2: 0.0,
        b0,
        b1,
        b2: 0.0,
    }
}

/// A designed cascade of filter sections.
#[derive(Clone, Debug)]
pub struct SosFilter {
    sections: Vec<Coefficients<f64>>,
    sample_rate: u32,
    lowest_cutoff: f64,
}

impl SosFilter {
    pub fn sections(&self) -> usize {
        self.sections.len()
    }

    /// Causal pass with zeroed state.
    pub fn process(&self, data: &mut [f64]) {
        for coeffs in &self.sections {
            let mut section = DirectForm2Transposed::<f64>::new(*coeffs);
            for x in data.iter_mut() {
                *x = section.run(*x);
            }
        }
    }

    /// Edge padding used by [`SosFilter::filtfilt`]: three time constants of the
    /// lowest cutoff, so start-up transients settle before real samples.
    pub fn padding(&self) -> usize {
        (3.0 * self.sample_rate as f64 / self.lowest_cutoff).ceil() as usize
    }

    /// Zero-phase (forward-backward) filtering with odd-reflection edge padding.
    ///
    /// The magnitude response is squared; phase is exactly zero.
    pub fn filtfilt(&self, data: &mut [f64]) {
        let n = data.len();
        if n == 0 {
            return;
        }
        let pad = self.padding().min(n - 1);
        let first = data[0];
        let last = data[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
        ext.extend_from_slice(data);
        ext.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

        self.process(&mut ext);
        ext.reverse();
        self.process(&mut ext);
        ext.reverse();

        data.copy_from_slice(&ext[pad..pad + n]);
    }

    /// Magnitude of the cascade's frequency response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / self.sample_rate as f64;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        self.sections.iter().fold(1.0, |acc, c| {
            let num_re = c.b0 + c.b1 * c1 + c.b2 * c2;
            let num_im = c.b1 * s1 + c.b2 * s2;
            let den_re = 1.0 + c.a1 * c1 + c.a2 * c2;
            let den_im = c.a1 * s1 + c.a2 * s2;
            acc * (num_re.hypot(num_im) / den_re.hypot(den_im))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 8_000;

    fn sine(freq: f64, frames: usize) -> Vec<f64> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f64 / FS as f64).sin())
            .collect()
    }

    #[test]
    fn design_rejects_bad_specs() {
        assert!(FilterSpec::lowpass(0.0, 2, FS).design().is_err());
        assert!(FilterSpec::lowpass(4_000.0, 2, FS).design().is_err());
        assert!(FilterSpec::highpass(100.0, 0, FS).design().is_err());
        assert!(FilterSpec::bandpass(500.0, 100.0, 2, FS).design().is_err());
        assert!(FilterSpec::lowpass(100.0, 2, 0).design().is_err());
    }

    #[test]
    fn section_counts_follow_order() {
        assert_eq!(FilterSpec::lowpass(100.0, 1, FS).design().unwrap().sections(), 1);
        assert_eq!(FilterSpec::lowpass(100.0, 2, FS).design().unwrap().sections(), 1);
        assert_eq!(FilterSpec::lowpass(100.0, 3, FS).design().unwrap().sections(), 2);
        assert_eq!(
            FilterSpec::bandpass(1.0, 500.0, 2, FS).design().unwrap().sections(),
            2
        );
    }

    #[test]
    fn butterworth_is_3db_down_at_cutoff() {
        for order in 1..=4 {
            let lp = FilterSpec::lowpass(500.0, order, FS).design().unwrap();
            let hp = FilterSpec::highpass(20.0, order, FS).design().unwrap();
            let half_power = std::f64::consts::FRAC_1_SQRT_2;
            assert!((lp.magnitude_at(500.0) - half_power).abs() < 1e-6, "order {order}");
            assert!((hp.magnitude_at(20.0) - half_power).abs() < 1e-6, "order {order}");
        }
    }

    #[test]
    fn bandpass_passes_midband_and_rejects_edges() {
        let bp = FilterSpec::bandpass(1.0, 500.0, 2, FS).design().unwrap();
        assert!((bp.magnitude_at(50.0) - 1.0).abs() < 0.01);
        assert!(bp.magnitude_at(2_000.0) < 0.1);
        assert!(bp.magnitude_at(0.05) < 0.01);
    }

    #[test]
    fn filtfilt_has_no_phase_lag() {
        let lp = FilterSpec::lowpass(400.0, 2, FS).design().unwrap();
        let input = sine(100.0, 4_000);
        let mut forward = input.clone();
        lp.process(&mut forward);
        let mut zero_phase = input.clone();
        lp.filtfilt(&mut zero_phase);

        // Compare in the middle, away from edge effects.
        let mid = 1_000..3_000;
        let err_zero: f64 = mid
            .clone()
            .map(|i| (zero_phase[i] - input[i]).abs())
            .fold(0.0, f64::max);
        let err_fwd: f64 = mid
            .map(|i| (forward[i] - input[i]).abs())
            .fold(0.0, f64::max);
        assert!(err_zero < 0.02, "zero-phase error {err_zero}");
        assert!(err_fwd > err_zero * 5.0, "causal pass should lag: {err_fwd}");
    }

    #[test]
    fn filtfilt_handles_tiny_inputs() {
        let lp = FilterSpec::lowpass(400.0, 2, FS).design().unwrap();
        let mut one = vec![0.5];
        lp.filtfilt(&mut one);
        assert!(one[0].is_finite());
        let mut empty: Vec<f64> = Vec::new();
        lp.filtfilt(&mut empty);
    }
}
