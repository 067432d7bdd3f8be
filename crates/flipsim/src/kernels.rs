//! Radial kernels of squared distance.
//!
//! Both vanish at the support radius `h` and are never negative.

/// Smooth falloff `1 - r²/h²`, zero beyond `h`.
#[inline]
pub fn smooth(r2: f32, h: f32) -> f32 {
    (1.0 - r2 / (h * h)).max(0.0)
}

/// Sharp falloff `h²/r² - 1`, zero beyond `h`.
///
/// `r²` is floored at 1e-5 so coincident points get a large finite weight.
#[inline]
pub fn sharpen(r2: f32, h: f32) -> f32 {
    (h * h / r2.max(1.0e-5) - 1.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the smooth kernel is one at zero distance
    #[test]
    fn test_smooth_at_center_is_one() {
        assert!((smooth(0.0, 2.0) - 1.0).abs() < 1e-6);
    }

    /// Test that the smooth kernel is zero at and past its support
    #[test]
    fn test_smooth_vanishes_at_support() {
        assert_eq!(smooth(4.0, 2.0), 0.0);
        assert_eq!(smooth(9.0, 2.0), 0.0);
        assert!((smooth(1.0, 2.0) - 0.75).abs() < 1e-6);
    }

    /// Test that the sharpen kernel stays finite for coincident points
    #[test]
    fn test_sharpen_is_finite_at_zero() {
        let w = sharpen(0.0, 1.4);
        assert!(w.is_finite());
        assert!(w > 1.0e4);
    }

    /// Test that the sharpen kernel decreases with distance
    #[test]
    fn test_sharpen_decreases_with_distance() {
        let h = 1.4;
        let near = sharpen(0.25, h);
        let far = sharpen(1.0, h);
        assert!(near > far);
        assert!(far > 0.0);
        assert_eq!(sharpen(h * h, h), 0.0);
        assert_eq!(sharpen(4.0, h), 0.0);
    }
}
