use log::warn;

pub const MIN_BITRATE_KBPS: u32 = 64;
pub const MAX_BITRATE_KBPS: u32 = 320;

/// Duration assumed when nothing better is known. A rough estimation: real
/// files are rarely exactly a minute long, so the computed bitrate is only a
/// target, not a guarantee of output size.
pub const DEFAULT_ASSUMED_DURATION_SECS: f64 = 60.0;

/// Maps a target output size to a target bitrate. The duration source is
/// injectable; callers that know the real duration should pass it in.
#[derive(Debug, Clone)]
pub struct SizeEstimator {
    assumed_duration_secs: f64,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self {
            assumed_duration_secs: DEFAULT_ASSUMED_DURATION_SECS,
        }
    }
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(assumed_duration_secs: f64) -> Self {
        if !assumed_duration_secs.is_finite() || assumed_duration_secs <= 0.0 {
            warn!(
                "Ignoring invalid assumed duration {}s, using {}s",
                assumed_duration_secs, DEFAULT_ASSUMED_DURATION_SECS
            );
            return Self::default();
        }
        Self {
            assumed_duration_secs,
        }
    }

    pub fn target_bitrate_kbps(&self, target_size_mb: f64) -> u32 {
        let raw = (target_size_mb * 8.0 * 1024.0 / self.assumed_duration_secs).round();
        raw.clamp(MIN_BITRATE_KBPS as f64, MAX_BITRATE_KBPS as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_megabytes_clamps_to_the_ceiling() {
        // 5 * 8 * 1024 / 60 ≈ 682.67 -> clamped to 320.
        assert_eq!(SizeEstimator::new().target_bitrate_kbps(5.0), 320);
    }

    #[test]
    fn tiny_targets_clamp_to_the_floor() {
        assert_eq!(SizeEstimator::new().target_bitrate_kbps(0.1), 64);
        assert_eq!(SizeEstimator::new().target_bitrate_kbps(0.0), 64);
    }

    #[test]
    fn mid_range_targets_round_to_the_computed_rate() {
        // 1 * 8 * 1024 / 60 ≈ 136.53 -> 137.
        assert_eq!(SizeEstimator::new().target_bitrate_kbps(1.0), 137);
    }

    #[test]
    fn output_is_always_within_bounds() {
        let estimator = SizeEstimator::new();
        for size in [0.0, 0.5, 1.0, 2.0, 5.0, 50.0, 500.0] {
            let bitrate = estimator.target_bitrate_kbps(size);
            assert!((MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&bitrate));
        }
    }

    #[test]
    fn injected_duration_changes_the_estimate() {
        // 5 MB over 240 s: 5 * 8 * 1024 / 240 ≈ 170.67 -> 171.
        assert_eq!(SizeEstimator::with_duration(240.0).target_bitrate_kbps(5.0), 171);
    }

    #[test]
    fn invalid_duration_falls_back_to_the_default() {
        assert_eq!(SizeEstimator::with_duration(0.0).target_bitrate_kbps(5.0), 320);
        assert_eq!(
            SizeEstimator::with_duration(f64::NAN).target_bitrate_kbps(5.0),
            320
        );
    }
}
