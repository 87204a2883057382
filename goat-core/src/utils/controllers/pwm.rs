//! PWM output collaborators for the drive mixer.
//!
//! `PwmDriver` is the channel-addressed PWM peripheral the mixer writes to.
//! `Pca9685Pwm` implements it for a PCA9685 on a shared I2C bus: logical
//! channels are routed to one or more of the chip's 16 outputs, so redundant
//! front/back wiring is a matter of attaching two outputs to the same channel.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Address as PwmAddress, Channel, Error as PwmError, Pca9685};

use crate::utils::math::servo::{MAX_DUTY, RESOLUTION_BITS};

/// Channel-addressed PWM peripheral.
///
/// Channels must be configured before pins are attached to them, and both
/// before any duty is written.
pub trait PwmDriver {
    type Error: core::fmt::Debug;

    /// Set up `channel` with a base frequency and timer resolution.
    fn configure_channel(
        &mut self,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), Self::Error>;

    /// Route physical `pin` to `channel`. Several pins may share a channel.
    fn attach_pin(
        &mut self,
        pin: u8,
        channel: u8,
    ) -> Result<(), Self::Error>;

    /// Write a duty value in `[0, 2^resolution_bits - 1]` to `channel`.
    fn write_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error>;

    /// Period a configured channel really runs at (µs), when the hardware
    /// cannot produce the requested frequency exactly.
    fn period_us(
        &self,
        _channel: u8,
    ) -> Option<u32> {
        None
    }
}

impl<P: PwmDriver + ?Sized> PwmDriver for &mut P {
    type Error = P::Error;

    fn configure_channel(
        &mut self,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), Self::Error> {
        (**self).configure_channel(channel, frequency_hz, resolution_bits)
    }

    fn attach_pin(
        &mut self,
        pin: u8,
        channel: u8,
    ) -> Result<(), Self::Error> {
        (**self).attach_pin(pin, channel)
    }

    fn write_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error> {
        (**self).write_duty(channel, duty)
    }

    fn period_us(
        &self,
        channel: u8,
    ) -> Option<u32> {
        (**self).period_us(channel)
    }
}

/// Number of PWM outputs on a PCA9685.
pub const OUTPUT_COUNT: usize = 16;
/// PCA9685 internal oscillator (Hz).
const OSC_CLOCK_HZ: u64 = 25_000_000;

const OUTPUTS: [Channel; OUTPUT_COUNT] = [
    Channel::C0,
    Channel::C1,
    Channel::C2,
    Channel::C3,
    Channel::C4,
    Channel::C5,
    Channel::C6,
    Channel::C7,
    Channel::C8,
    Channel::C9,
    Channel::C10,
    Channel::C11,
    Channel::C12,
    Channel::C13,
    Channel::C14,
    Channel::C15,
];

/// Errors raised by the PCA9685 adapter.
#[derive(Debug)]
pub enum Pca9685Error<E: core::fmt::Debug> {
    Pwm(PwmError<E>),
    /// Output index beyond the 16 available.
    InvalidPin(u8),
    /// Only the native 12-bit resolution is supported.
    UnsupportedResolution(u8),
    /// No prescale value in `3..=255` reaches this frequency.
    FrequencyOutOfRange(u32),
    /// The chip has one prescaler; all channels must share its frequency.
    FrequencyMismatch { configured: u32, requested: u32 },
}

/// PCA9685-backed `PwmDriver`.
pub struct Pca9685Pwm<'a, I2C: 'static> {
    pca: Pca9685<RefCellDevice<'a, I2C>>,
    /// Logical channel each output is attached to.
    routes: [Option<u8>; OUTPUT_COUNT],
    /// Requested frequency and the prescale programmed for it.
    frequency_hz: Option<u32>,
    prescale: Option<u8>,
}

impl<'a, I2C, E> Pca9685Pwm<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    /// Wrap the PCA9685 at `address` on the shared bus. No bus traffic happens here.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
    ) -> Result<Self, Pca9685Error<E>> {
        let pca = Pca9685::new(RefCellDevice::new(i2c_bus), PwmAddress::from(address))
            .map_err(Pca9685Error::Pwm)?;
        Ok(Self {
            pca,
            routes: [None; OUTPUT_COUNT],
            frequency_hz: None,
            prescale: None,
        })
    }

    /// Prescale register value for `frequency_hz`, if the chip can produce it.
    ///
    /// `round(25 MHz / (4096 * f)) - 1`, valid within `3..=255`.
    pub fn prescale_for(frequency_hz: u32) -> Option<u8> {
        let steps = 4096 * frequency_hz as u64;
        if steps == 0 {
            return None;
        }
        let prescale = ((OSC_CLOCK_HZ + steps / 2) / steps).checked_sub(1)?;
        if (3..=255).contains(&prescale) {
            Some(prescale as u8)
        } else {
            None
        }
    }

    /// Output frequency produced by `prescale`: `25 MHz / (4096 * (prescale + 1))`.
    pub fn frequency_for(prescale: u8) -> f32 {
        OSC_CLOCK_HZ as f32 / (4096.0 * (prescale as f32 + 1.0))
    }

    /// Period produced by `prescale`, in whole microseconds.
    pub fn period_for(prescale: u8) -> u32 {
        ((prescale as u64 + 1) * 4096 * 1_000_000 / OSC_CLOCK_HZ) as u32
    }

    /// Frequency the chip actually runs at, once configured.
    ///
    /// 333 Hz requested gives prescale 17 and about 339.08 Hz.
    pub fn achieved_frequency_hz(&self) -> Option<f32> {
        self.prescale.map(Self::frequency_for)
    }

    /// Outputs currently attached to `channel`.
    pub fn outputs(
        &self,
        channel: u8,
    ) -> impl Iterator<Item = u8> + '_ {
        self.routes
            .iter()
            .enumerate()
            .filter(move |(_, route)| **route == Some(channel))
            .map(|(pin, _)| pin as u8)
    }
}

impl<'a, I2C, E> PwmDriver for Pca9685Pwm<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    type Error = Pca9685Error<E>;

    fn configure_channel(
        &mut self,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), Self::Error> {
        if resolution_bits != RESOLUTION_BITS {
            return Err(Pca9685Error::UnsupportedResolution(resolution_bits));
        }
        match self.frequency_hz {
            Some(configured) if configured == frequency_hz => return Ok(()),
            Some(configured) => {
                return Err(Pca9685Error::FrequencyMismatch {
                    configured,
                    requested: frequency_hz,
                })
            }
            None => {}
        }

        let prescale = Self::prescale_for(frequency_hz)
            .ok_or(Pca9685Error::FrequencyOutOfRange(frequency_hz))?;
        self.pca.enable().map_err(Pca9685Error::Pwm)?;
        self.pca.set_prescale(prescale).map_err(Pca9685Error::Pwm)?;
        self.frequency_hz = Some(frequency_hz);
        self.prescale = Some(prescale);
        tracing::info!(
            "PCA9685 enabled for channel {}: requested {} Hz, achieved {} Hz (prescale {}, period {} us)",
            channel,
            frequency_hz,
            Self::frequency_for(prescale),
            prescale,
            Self::period_for(prescale)
        );
        Ok(())
    }

    fn period_us(
        &self,
        _channel: u8,
    ) -> Option<u32> {
        self.prescale.map(Self::period_for)
    }

    fn attach_pin(
        &mut self,
        pin: u8,
        channel: u8,
    ) -> Result<(), Self::Error> {
        let route = self
            .routes
            .get_mut(pin as usize)
            .ok_or(Pca9685Error::InvalidPin(pin))?;
        if let Some(previous) = route.replace(channel) {
            if previous != channel {
                tracing::warn!("Output {} moved from channel {} to {}", pin, previous, channel);
            }
        }
        Ok(())
    }

    fn write_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error> {
        let duty = duty.min(MAX_DUTY);
        let routes = self.routes;
        let mut written = false;
        let mut first_error = None;
        // Redundant outputs are all attempted so they stay in step.
        for (pin, (output, route)) in OUTPUTS.iter().zip(routes.iter()).enumerate() {
            if *route == Some(channel) {
                written = true;
                if let Err(e) = self.pca.set_channel_on_off(*output, 0, duty) {
                    tracing::warn!("Output {} on channel {} not written: {:?}", pin, channel, e);
                    if first_error.is_none() {
                        first_error = Some(Pca9685Error::Pwm(e));
                    }
                }
            }
        }
        if !written {
            tracing::warn!("No outputs attached to channel {}", channel);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
