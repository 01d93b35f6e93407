use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};

use crate::config;
use crate::types::EqParams;

fn peaking_coefficients(sample_rate: f32, centre_hz: f32, gain_db: f32) -> Coefficients<f32> {
    // from_params only fails on non-positive frequencies; the centres are
    // compile-time constants so fall back to unity rather than propagate.
    Coefficients::<f32>::from_params(
        Type::PeakingEQ(gain_db),
        sample_rate.hz(),
        centre_hz.min(sample_rate * 0.45).hz(),
        config::EQ_BANDWIDTH_Q,
    )
    .unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

struct Band {
    left: DirectForm1<f32>,
    right: DirectForm1<f32>,
    centre_hz: f32,
    applied_gain_db: f32,
}

impl Band {
    fn new(sample_rate: f32, centre_hz: f32) -> Self {
        let coeffs = peaking_coefficients(sample_rate, centre_hz, 0.0);
        Band {
            left: DirectForm1::<f32>::new(coeffs),
            right: DirectForm1::<f32>::new(coeffs),
            centre_hz,
            applied_gain_db: 0.0,
        }
    }

    fn retune(&mut self, sample_rate: f32, gain_db: f32) {
        if (gain_db - self.applied_gain_db).abs() <= config::EQ_RECALC_THRESHOLD_DB {
            return;
        }
        let coeffs = peaking_coefficients(sample_rate, self.centre_hz, gain_db);
        self.left.update_coefficients(coeffs);
        self.right.update_coefficients(coeffs);
        self.applied_gain_db = gain_db;
    }
}

/// Stereo three-band parametric EQ: peaking biquads at 100 Hz, 1 kHz and
/// 12 kHz with one-octave bandwidth. Coefficient recalculation happens
/// inside the callback but only when a gain moved past the recalc
/// threshold; the math allocates nothing.
pub struct EqChain {
    sample_rate: f32,
    low: Band,
    mid: Band,
    high: Band,
}

impl EqChain {
    pub fn new(sample_rate: f32) -> Self {
        EqChain {
            sample_rate,
            low: Band::new(sample_rate, config::EQ_LOW_HZ),
            mid: Band::new(sample_rate, config::EQ_MID_HZ),
            high: Band::new(sample_rate, config::EQ_HIGH_HZ),
        }
    }

    /// Re-derive coefficients for any band whose target gain moved.
    pub fn retune(&mut self, params: &EqParams) {
        self.low.retune(self.sample_rate, params.low_gain_db);
        self.mid.retune(self.sample_rate, params.mid_gain_db);
        self.high.retune(self.sample_rate, params.high_gain_db);
    }

    /// Run one stereo frame through all three bands.
    #[inline]
    pub fn run(&mut self, left: f32, right: f32) -> (f32, f32) {
        let l = self.high.left.run(self.mid.left.run(self.low.left.run(left)));
        let r = self
            .high
            .right
            .run(self.mid.right.run(self.low.right.run(right)));
        (l, r)
    }

    /// Drop accumulated filter state, e.g. after a track swap.
    pub fn reset(&mut self) {
        self.low = Band::new(self.sample_rate, config::EQ_LOW_HZ);
        self.mid = Band::new(self.sample_rate, config::EQ_MID_HZ);
        self.high = Band::new(self.sample_rate, config::EQ_HIGH_HZ);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_eq_is_identity_within_rounding() {
        let mut eq = EqChain::new(48_000.0);
        eq.retune(&EqParams::default());
        for i in 0..512 {
            let x = (i as f32 * 0.1).sin() * 0.5;
            let (l, r) = eq.run(x, -x);
            assert!((l - x).abs() < 1e-4, "left diverged at {}: {} vs {}", i, l, x);
            assert!((r + x).abs() < 1e-4);
        }
    }

    #[test]
    fn boosted_low_band_raises_low_frequency_energy() {
        let mut eq = EqChain::new(48_000.0);
        eq.retune(&EqParams {
            low_gain_db: 12.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
        });
        // 100 Hz tone at 48 kHz
        let omega = 2.0 * std::f32::consts::PI * 100.0 / 48_000.0;
        let mut energy_in = 0.0;
        let mut energy_out = 0.0;
        for i in 0..48_000 {
            let x = (omega * i as f32).sin() * 0.25;
            let (l, _) = eq.run(x, x);
            // Skip the filter warm-up.
            if i > 4_800 {
                energy_in += x * x;
                energy_out += l * l;
            }
        }
        assert!(energy_out > energy_in * 2.0);
    }

    #[test]
    fn retune_below_threshold_keeps_coefficients() {
        let mut eq = EqChain::new(44_100.0);
        eq.retune(&EqParams {
            low_gain_db: 0.05,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
        });
        assert_eq!(eq.low.applied_gain_db, 0.0);
        eq.retune(&EqParams {
            low_gain_db: 3.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
        });
        assert_eq!(eq.low.applied_gain_db, 3.0);
    }
}
