//! Decibel conversions: device power to SPL, distance attenuation, energy
//! summation of two sources and the perceptual loudness scale.
//!
//! All functions are pure and operate on `f32` to match the precision of
//! the capture devices feeding them.

use crate::error::MeteringError;

/// Lowest power a capture device reports (dBFS). Treated as silence.
pub const DEVICE_POWER_FLOOR: f32 = -160.0;

/// Offset of the linear dBFS → dB SPL mapping
pub const SPL_OFFSET: f32 = 100.0;

/// Decibel level of a source that contributes no energy
pub const SILENCE: f32 = f32::NEG_INFINITY;

/// SPL that maps to exactly one loudness unit
pub const REFERENCE_LOUDNESS_DB: f32 = 40.0;

/// Convert a device power reading (dBFS) to an SPL-like decibel value.
///
/// Assumes a linear offset and never returns a negative level.
pub fn to_spl(device_power: f32) -> f32 {
    (device_power + SPL_OFFSET).max(0.0)
}

/// Level heard at `distance_ratio` times the reference distance
/// (inverse-square law).
pub fn attenuate(decibel: f32, distance_ratio: f32) -> f32 {
    let loss = 20.0 * distance_ratio.log10();
    decibel - loss
}

/// Sum the energies of two incoherent sources and convert back to decibels.
pub fn combine(decibel_a: f32, decibel_b: f32) -> f32 {
    let energy_a = 10f32.powf(decibel_a / 10.0);
    let energy_b = 10f32.powf(decibel_b / 10.0);
    10.0 * (energy_a + energy_b).log10()
}

/// Perceived loudness where 40 dB is one unit and every +10 dB doubles it.
pub fn to_loudness(decibel: f32) -> f32 {
    2f32.powf((decibel - REFERENCE_LOUDNESS_DB) / 10.0)
}

/// How many times louder the combined sound feels compared to the baseline.
///
/// # Errors
/// `MeteringError::ZeroBaselineLoudness` if the baseline loudness is zero or
/// not finite.
pub fn ratio(baseline_loudness: f32, combined_loudness: f32) -> Result<f32, MeteringError> {
    if baseline_loudness == 0.0 || !baseline_loudness.is_finite() {
        return Err(MeteringError::ZeroBaselineLoudness);
    }
    Ok(combined_loudness / baseline_loudness)
}

/// Average power of a block of normalized samples in dBFS.
///
/// Empty or silent blocks report [`DEVICE_POWER_FLOOR`].
pub fn power_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return DEVICE_POWER_FLOOR;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_square.sqrt();
    if rms <= 0.0 {
        return DEVICE_POWER_FLOOR;
    }
    (20.0 * rms.log10()).max(DEVICE_POWER_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-3;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < TOLERANCE,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_to_spl_floor_is_zero() {
        assert_eq!(to_spl(DEVICE_POWER_FLOOR), 0.0);
        assert_eq!(to_spl(-100.0), 0.0);
        assert_eq!(to_spl(-40.0), 60.0);
    }

    #[test]
    fn test_to_spl_monotonic_and_non_negative() {
        let mut previous = to_spl(-200.0);
        for step in -200..=20 {
            let value = to_spl(step as f32);
            assert!(value >= 0.0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_attenuate_by_distance_ratio() {
        assert_close(attenuate(70.0, 3.0), 60.457_573);
        assert_close(attenuate(70.0, 1.0), 70.0);
        // Doubling the distance costs ~6 dB
        assert_close(attenuate(60.0, 2.0), 53.979_4);
    }

    #[test]
    fn test_combine_with_silence_is_identity() {
        assert_close(combine(55.0, SILENCE), 55.0);
        assert_close(combine(SILENCE, 40.0), 40.0);
    }

    #[test]
    fn test_combine_is_commutative() {
        for (a, b) in [(40.0, 60.0), (12.5, 80.0), (55.0, 55.0)] {
            assert_close(combine(a, b), combine(b, a));
        }
        // Two equal sources add ~3 dB
        assert_close(combine(50.0, 50.0), 53.0103);
    }

    #[test]
    fn test_loudness_reference_and_monotonicity() {
        assert_eq!(to_loudness(40.0), 1.0);
        assert_close(to_loudness(50.0), 2.0);
        assert_close(to_loudness(30.0), 0.5);

        let mut previous = to_loudness(0.0);
        for decibel in 1..=120 {
            let loudness = to_loudness(decibel as f32);
            assert!(loudness > previous);
            assert!(loudness > 0.0);
            previous = loudness;
        }
    }

    #[test]
    fn test_hand_computed_listener_scenario() {
        let background = 40.0;
        let perceived = attenuate(70.0, 3.0);
        let combined = combine(background, perceived);
        let result = ratio(to_loudness(background), to_loudness(combined)).unwrap();

        assert_close(perceived, 60.457_573);
        assert_close(combined, 60.496_487);
        assert!((result - 4.140_05).abs() < 1e-2);
    }

    #[test]
    fn test_ratio_rejects_zero_baseline() {
        assert_eq!(ratio(0.0, 2.0), Err(MeteringError::ZeroBaselineLoudness));
        assert_eq!(
            ratio(f32::INFINITY, 2.0),
            Err(MeteringError::ZeroBaselineLoudness)
        );
        assert_eq!(ratio(2.0, 3.0), Ok(1.5));
    }

    #[test]
    fn test_power_dbfs() {
        assert_eq!(power_dbfs(&[]), DEVICE_POWER_FLOOR);
        assert_eq!(power_dbfs(&[0.0; 64]), DEVICE_POWER_FLOOR);
        assert_close(power_dbfs(&[1.0, -1.0, 1.0, -1.0]), 0.0);
        assert_close(power_dbfs(&[0.1; 32]), -20.0);
    }
}
