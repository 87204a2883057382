//! Module Exports
//!
//! - `drive`: the differential-drive and winch mixer
//! - `pwm`: the PWM driver trait and the PCA9685 implementation
//!
//! Drive commands reach the mixer through `DRIVE_CHANNEL`, drained by
//! `DriveController::drive_ch`.

pub mod drive;
pub mod pwm;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{with_timeout, Duration};
use serde::{Deserialize, Serialize};

use crate::utils::math::servo::ServoTiming;

pub use drive::{ChannelAssignment, DriveError, DriveMixer, DutyCycles, PinAssignment};
pub use pwm::{Pca9685Error, Pca9685Pwm, PwmDriver};

/// Channel used to receive drive commands (`DriveCommand` messages).
pub static DRIVE_CHANNEL: Channel<CriticalSectionRawMutex, DriveCommand, 16> = Channel::new();

/// Outputs go neutral when no command arrives for this long.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Drive command variants.
///
/// Serialized as JSON with tag `"dc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "dc", rename_all = "snake_case")] // dc = drive command
pub enum DriveCommand {
    /// Forward/steering mix plus winch.
    M { f: f32, s: f32, w: f32 },
    /// Direct left/right wheel commands, no mixing.
    D { l: f32, r: f32 },
    /// Neutral on every channel.
    Stop,
}

pub struct DriveController<P> {
    pub mixer: DriveMixer<P>,
    stale: bool,
}

impl<P> DriveController<P>
where
    P: PwmDriver,
{
    /// Build and start the mixer, leaving all outputs at neutral.
    pub fn new(
        pwm: P,
        channels: ChannelAssignment,
        pins: PinAssignment,
        timing: Option<ServoTiming>,
    ) -> Result<Self, DriveError<P::Error>> {
        let mut mixer = DriveMixer::with_timing(pwm, channels, timing.unwrap_or_default())?;
        mixer.begin(pins)?;
        mixer.execute(DriveCommand::Stop);

        Ok(DriveController {
            mixer,
            stale: false,
        })
    }

    /// True while the command stream has timed out.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Apply a received command, or `None` when the receive timed out.
    pub fn handle(
        &mut self,
        received: Option<DriveCommand>,
    ) {
        match received {
            Some(command) => {
                if self.stale {
                    tracing::info!("Drive commands resumed");
                    self.stale = false;
                }
                tracing::info!("Received Drive Command: {:?}", command);
                self.mixer.execute(command);
            }
            None => {
                if !self.stale {
                    tracing::warn!(
                        "No drive command for {} ms, stopping",
                        COMMAND_TIMEOUT.as_millis()
                    );
                    self.stale = true;
                }
                self.mixer.execute(DriveCommand::Stop);
            }
        }
    }

    pub async fn drive_ch(&mut self) -> ! {
        loop {
            let received = with_timeout(COMMAND_TIMEOUT, DRIVE_CHANNEL.receiver().receive())
                .await
                .ok();
            self.handle(received);
        }
    }
}
