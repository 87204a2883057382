//! Drive mixer for the GOAT rover.
//!
//! Turns forward/steering/winch commands into duty cycles for the left
//! wheel, right wheel and winch PWM channels, and writes them through a
//! `PwmDriver`. The mixer keeps no state between calls beyond its fixed
//! channel assignment and timing.
//!
//! `begin` must run once before any `update`; writing to unconfigured channels
//! is left to the driver to handle.

use super::{pwm::PwmDriver, DriveCommand};
use crate::utils::math::{
    mixing::DifferentialMix,
    servo::{scale_duty, ServoTiming, MAX_DUTY, RESOLUTION_BITS},
};

/// Errors raised while building or starting a `DriveMixer`.
#[derive(Debug)]
pub enum DriveError<E: core::fmt::Debug> {
    Pwm(E),
    /// Two logical roles were given the same PWM channel.
    DuplicateChannel { channel: u8 },
    /// Zero frequency, zero period, or an empty pulse range.
    InvalidTiming,
}

/// PWM channel used by each logical actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAssignment {
    pub left: u8,
    pub right: u8,
    pub winch: u8,
}

impl ChannelAssignment {
    pub fn new(
        left: u8,
        right: u8,
        winch: u8,
    ) -> Self {
        Self { left, right, winch }
    }

    /// The first channel shared by two roles, if any.
    pub fn duplicate(&self) -> Option<u8> {
        if self.left == self.right || self.left == self.winch {
            Some(self.left)
        } else if self.right == self.winch {
            Some(self.right)
        } else {
            None
        }
    }
}

/// Physical pins wired to each actuator. Front and back pins of a side share its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAssignment {
    pub left_front: u8,
    pub right_front: u8,
    pub left_back: u8,
    pub right_back: u8,
    pub winch: u8,
}

/// Duty cycles produced by one `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycles {
    pub left: u16,
    pub right: u16,
    pub winch: u16,
}

/// Differential-drive plus winch mixer over a `PwmDriver`.
pub struct DriveMixer<P> {
    pwm: P,
    channels: ChannelAssignment,
    timing: ServoTiming,
}

impl<P> DriveMixer<P>
where
    P: PwmDriver,
{
    /// Build a mixer with the default 333 Hz, 500-2500 µs timing.
    pub fn new(
        pwm: P,
        channels: ChannelAssignment,
    ) -> Result<Self, DriveError<P::Error>> {
        Self::with_timing(pwm, channels, ServoTiming::default())
    }

    pub fn with_timing(
        pwm: P,
        channels: ChannelAssignment,
        timing: ServoTiming,
    ) -> Result<Self, DriveError<P::Error>> {
        if let Some(channel) = channels.duplicate() {
            return Err(DriveError::DuplicateChannel { channel });
        }
        if !timing.is_valid() {
            return Err(DriveError::InvalidTiming);
        }
        Ok(Self {
            pwm,
            channels,
            timing,
        })
    }

    pub fn channels(&self) -> ChannelAssignment {
        self.channels
    }

    pub fn timing(&self) -> ServoTiming {
        self.timing
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    /// Give back the driver.
    pub fn release(self) -> P {
        self.pwm
    }

    /// Configure all three channels and attach their pins.
    pub fn begin(
        &mut self,
        pins: PinAssignment,
    ) -> Result<(), DriveError<P::Error>> {
        let ChannelAssignment { left, right, winch } = self.channels;
        self.setup_channel(left, &[pins.left_front, pins.left_back])?;
        self.setup_channel(right, &[pins.right_front, pins.right_back])?;
        self.setup_channel(winch, &[pins.winch])?;
        // Map pulses against the period the hardware really produces.
        if let Some(period) = self.pwm.period_us(left) {
            if period > 0 && period != self.timing.period_us() {
                tracing::info!(
                    "PWM period {} us differs from requested {} us, using achieved period",
                    period,
                    self.timing.period_us()
                );
                self.timing.period_override_us = Some(period);
            }
        }
        tracing::info!(
            "Drive channels ready: left={} right={} winch={} @ {} Hz",
            left,
            right,
            winch,
            self.timing.frequency_hz
        );
        Ok(())
    }

    fn setup_channel(
        &mut self,
        channel: u8,
        pins: &[u8],
    ) -> Result<(), DriveError<P::Error>> {
        self.pwm
            .configure_channel(channel, self.timing.frequency_hz, RESOLUTION_BITS)
            .map_err(DriveError::Pwm)?;
        for &pin in pins {
            self.pwm.attach_pin(pin, channel).map_err(DriveError::Pwm)?;
        }
        Ok(())
    }

    /// Mix forward/steering into the wheels and drive the winch independently.
    ///
    /// Wheel commands are scaled down together when either exceeds unit
    /// magnitude. The winch command is mapped as given.
    pub fn update(
        &mut self,
        forward: f32,
        steering: f32,
        winch: f32,
    ) -> DutyCycles {
        let (left, right) = DifferentialMix::mix(forward, steering);
        let duties = DutyCycles {
            left: self.timing.duty(left),
            right: self.timing.duty(right),
            winch: self.timing.duty(winch),
        };
        tracing::debug!(?duties, "mixed f={} s={} w={}", forward, steering, winch);

        let ChannelAssignment {
            left: left_ch,
            right: right_ch,
            winch: winch_ch,
        } = self.channels;
        self.analog_write(left_ch, duties.left as u32, MAX_DUTY as u32);
        self.analog_write(right_ch, duties.right as u32, MAX_DUTY as u32);
        self.analog_write(winch_ch, duties.winch as u32, MAX_DUTY as u32);
        duties
    }

    /// Drive the wheels from per-wheel commands, leaving the winch alone.
    ///
    /// No normalization is applied: a command beyond `±1` is mapped as is and
    /// then clamped at the duty limits. Returns `(left, right)` duty cycles.
    pub fn update_right_left(
        &mut self,
        left: f32,
        right: f32,
    ) -> (u16, u16) {
        let left_duty = self.timing.duty(left);
        let right_duty = self.timing.duty(right);
        tracing::debug!("direct l={} r={} -> ({}, {})", left, right, left_duty, right_duty);

        self.analog_write(self.channels.left, left_duty as u32, MAX_DUTY as u32);
        self.analog_write(self.channels.right, right_duty as u32, MAX_DUTY as u32);
        (left_duty, right_duty)
    }

    /// Apply a `DriveCommand`.
    pub fn execute(
        &mut self,
        command: DriveCommand,
    ) {
        match command {
            DriveCommand::M { f, s, w } => {
                self.update(f, s, w);
            }
            DriveCommand::D { l, r } => {
                self.update_right_left(l, r);
            }
            DriveCommand::Stop => {
                self.update(0.0, 0.0, 0.0);
            }
        }
    }

    /// Rescale `value` against `value_max` and write it. Returns the duty written.
    ///
    /// Write failures are logged, not returned.
    pub fn analog_write(
        &mut self,
        channel: u8,
        value: u32,
        value_max: u32,
    ) -> u16 {
        let duty = scale_duty(value, value_max);
        if let Err(e) = self.pwm.write_duty(channel, duty) {
            tracing::error!("PWM write to channel {} failed: {:?}", channel, e);
        }
        duty
    }
}
