//! Servo-style pulse and duty-cycle mapping.
//!
//! A normalized command in `[-1, 1]` is turned into a pulse width in
//! microseconds, and the pulse width into a 12-bit duty cycle for a PWM
//! channel running at `frequency_hz`. The command is truncated toward zero to
//! whole thousandths, then every integer re-mapping floors, so small commands
//! either side of zero both land on the neutral pulse.

use serde::{Deserialize, Serialize};

/// PWM base frequency used for all actuator channels (Hz).
pub const BASE_FREQUENCY_HZ: u32 = 333;
/// Timer resolution in bits.
pub const RESOLUTION_BITS: u8 = 12;
/// Largest duty value at `RESOLUTION_BITS`.
pub const MAX_DUTY: u16 = 4095;
/// Pulse width for a command of `-1.0` (µs).
pub const SERVO_MIN_US: u32 = 500;
/// Pulse width for a command of `+1.0` (µs).
pub const SERVO_MAX_US: u32 = 2500;

/// Bound on the command in thousandths, keeps every i64 product in range.
const MILLI_LIMIT: f32 = 1.0e9;

/// Pulse timing for the actuator outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoTiming {
    /// PWM frequency (Hz)
    pub frequency_hz: u32,
    /// Pulse width at command `-1.0` (µs)
    pub pulse_min_us: u32,
    /// Pulse width at command `+1.0` (µs)
    pub pulse_max_us: u32,
    /// Period the hardware actually runs at, when it cannot hit `frequency_hz` exactly (µs)
    pub period_override_us: Option<u32>,
}

impl Default for ServoTiming {
    fn default() -> Self {
        Self {
            frequency_hz: BASE_FREQUENCY_HZ,
            pulse_min_us: SERVO_MIN_US,
            pulse_max_us: SERVO_MAX_US,
            period_override_us: None,
        }
    }
}

impl ServoTiming {
    /// PWM period in whole microseconds (3003 at 333 Hz), `0` for a zero frequency.
    ///
    /// `period_override_us` wins when set.
    pub fn period_us(&self) -> u32 {
        match self.period_override_us {
            Some(period) => period,
            None => 1_000_000u32.checked_div(self.frequency_hz).unwrap_or(0),
        }
    }

    /// True when the timing can produce a meaningful duty cycle.
    pub fn is_valid(&self) -> bool {
        self.period_us() > 0 && self.pulse_min_us < self.pulse_max_us
    }

    /// Pulse width (µs) for a normalized command.
    ///
    /// The command is truncated toward zero to thousandths first. Out-of-range commands
    /// extrapolate past the pulse limits; NaN maps to the centre pulse.
    pub fn pulse_width(
        &self,
        command: f32,
    ) -> i64 {
        let milli = libm::truncf(command * 1000.0).clamp(-MILLI_LIMIT, MILLI_LIMIT) as i64;
        map_range(
            milli,
            -1000,
            1000,
            self.pulse_min_us as i64,
            self.pulse_max_us as i64,
        )
    }

    /// Duty cycle for a pulse width, clamped to `[0, MAX_DUTY]`.
    pub fn duty_for_pulse(
        &self,
        pulse_us: i64,
    ) -> u16 {
        let duty = map_range(pulse_us, 0, self.period_us() as i64, 0, MAX_DUTY as i64);
        duty.clamp(0, MAX_DUTY as i64) as u16
    }

    /// Full command to duty-cycle pipeline.
    pub fn duty(
        &self,
        command: f32,
    ) -> u16 {
        self.duty_for_pulse(self.pulse_width(command))
    }
}

/// Linear re-mapping of `x` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// Integer arithmetic with floor division. No clamping: values outside the
/// input range extrapolate. A zero-width input range returns `out_min`.
pub fn map_range(
    x: i64,
    in_min: i64,
    in_max: i64,
    out_min: i64,
    out_max: i64,
) -> i64 {
    let span = in_max - in_min;
    if span == 0 {
        return out_min;
    }
    floor_div((x - in_min) * (out_max - out_min), span) + out_min
}

/// Rescale `value` against `value_max` onto the 12-bit duty range.
///
/// `(MAX_DUTY / value_max) * min(value, value_max)` with integer division, so
/// the result never exceeds `MAX_DUTY`. A `value_max` of zero gives zero.
pub fn scale_duty(
    value: u32,
    value_max: u32,
) -> u16 {
    match (MAX_DUTY as u32).checked_div(value_max) {
        Some(step) => (step * value.min(value_max)) as u16,
        None => 0,
    }
}

fn floor_div(
    n: i64,
    d: i64,
) -> i64 {
    let q = n / d;
    if n % d != 0 && ((n < 0) != (d < 0)) {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEUTRAL: u16 = 2045;
    const FULL_FORWARD: u16 = 3409;
    const FULL_REVERSE: u16 = 681;

    #[test]
    fn test_period_at_base_frequency() {
        assert_eq!(ServoTiming::default().period_us(), 3003);
    }

    #[test]
    fn test_pulse_width_endpoints() {
        let t = ServoTiming::default();
        assert_eq!(t.pulse_width(-1.0), 500);
        assert_eq!(t.pulse_width(0.0), 1500);
        assert_eq!(t.pulse_width(1.0), 2500);
        assert_eq!(t.pulse_width(2.0), 3500);
    }

    #[test]
    fn test_reference_duty_values() {
        let t = ServoTiming::default();
        assert_eq!(t.duty(0.0), NEUTRAL);
        assert_eq!(t.duty(1.0), FULL_FORWARD);
        assert_eq!(t.duty(-1.0), FULL_REVERSE);
        assert_eq!(t.duty(0.5), 2727);
    }

    #[test]
    fn test_duty_clamps_out_of_range() {
        let t = ServoTiming::default();
        assert_eq!(t.duty(2.0), MAX_DUTY);
        assert_eq!(t.duty(-3.0), 0);
        assert_eq!(t.duty(f32::INFINITY), MAX_DUTY);
        assert_eq!(t.duty(f32::NEG_INFINITY), 0);
        assert_eq!(t.duty(1.0e30), MAX_DUTY);
    }

    #[test]
    fn test_small_commands_around_zero_are_neutral() {
        let t = ServoTiming::default();
        assert_eq!(t.duty(-0.0001), NEUTRAL);
        assert_eq!(t.duty(0.0001), NEUTRAL);
        assert_eq!(t.pulse_width(-0.0009), 1500);
    }

    #[test]
    fn test_negative_commands_truncate_toward_zero() {
        let t = ServoTiming::default();
        // -333.7 thousandths -> -333 -> 1167 µs
        assert_eq!(t.pulse_width(-0.3337), 1167);
        assert_eq!(t.duty(-0.3337), 1591);
        assert_eq!(t.duty(-0.1234), 1877);
    }

    #[test]
    fn test_period_override() {
        let t = ServoTiming {
            period_override_us: Some(2949),
            ..Default::default()
        };
        assert_eq!(t.period_us(), 2949);
        // 1500 * 4095 / 2949
        assert_eq!(t.duty(0.0), 2082);
    }

    #[test]
    fn test_nan_is_neutral() {
        assert_eq!(ServoTiming::default().duty(f32::NAN), NEUTRAL);
    }

    #[test]
    fn test_duty_monotonic_over_unit_range() {
        let t = ServoTiming::default();
        let mut last = 0u16;
        for i in -1000..=1000 {
            let duty = t.duty(i as f32 / 1000.0);
            assert!(duty >= last, "duty decreased at {}", i);
            last = duty;
        }
    }

    #[test]
    fn test_map_range_floors_negative() {
        // -7 / 2 floors to -4
        assert_eq!(map_range(-7, 0, 2, 0, 1), -4);
        assert_eq!(map_range(7, 0, 2, 0, 1), 3);
        assert_eq!(map_range(5, 3, 3, 9, 10), 9);
    }

    #[test]
    fn test_scale_duty_bounds() {
        assert_eq!(scale_duty(2045, 4095), 2045);
        assert_eq!(scale_duty(9000, 4095), 4095);
        assert_eq!(scale_duty(200, 255), 16 * 200);
        assert_eq!(scale_duty(400, 255), 16 * 255);
        assert_eq!(scale_duty(10, 0), 0);
        assert_eq!(scale_duty(u32::MAX, 5000), 0);
    }

    #[test]
    fn test_validity() {
        assert!(ServoTiming::default().is_valid());
        let zero = ServoTiming {
            frequency_hz: 0,
            ..Default::default()
        };
        assert!(!zero.is_valid());
        let inverted = ServoTiming {
            pulse_min_us: 2500,
            pulse_max_us: 500,
            ..Default::default()
        };
        assert!(!inverted.is_valid());
    }
}
