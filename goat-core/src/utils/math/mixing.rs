//! Differential-drive mixing for the two-wheeled GOAT rover.
//!
//! `DifferentialMix` combines a forward and a steering command into left and
//! right wheel commands and scales both down together whenever either one
//! would leave the `[-1, 1]` range.
//!
//! # Example
//! ```rust
//! use goat_core::utils::math::mixing::DifferentialMix;
//! let (left, right) = DifferentialMix::mix(1.0, 1.0);
//! assert_eq!((left, right), (1.0, 0.0));
//! ```

/// Forward/steering to per-wheel mixer.
pub struct DifferentialMix;

impl DifferentialMix {
    /// Per-wheel commands before normalization: `(forward + steering, forward - steering)`.
    pub fn raw(
        forward: f32,
        steering: f32,
    ) -> (f32, f32) {
        (forward + steering, forward - steering)
    }

    /// Divisor that brings the larger wheel command back to unit magnitude.
    ///
    /// Never below `1.0`, so commands that already fit are passed through untouched.
    pub fn scale(
        left: f32,
        right: f32,
    ) -> f32 {
        left.abs().max(right.abs()).max(1.0)
    }

    /// Mix and normalize. Returns `(left, right)`, each within `[-1, 1]` for finite input.
    ///
    /// The left/right ratio is preserved when scaling kicks in, so a saturated
    /// turn keeps its shape instead of being clipped per wheel.
    pub fn mix(
        forward: f32,
        steering: f32,
    ) -> (f32, f32) {
        let (left, right) = Self::raw(forward, steering);
        let scale = Self::scale(left, right);
        (left / scale, right / scale)
    }
}
