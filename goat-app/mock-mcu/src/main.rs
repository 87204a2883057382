use clap::Parser;
use embassy_executor::Executor;
use goat_core::mk_static;
use goat_core::utils::controllers::{
    ChannelAssignment, DriveCommand, DriveController, PinAssignment, PwmDriver, DRIVE_CHANNEL,
};
use goat_core::utils::ServoTiming;
use std::convert::Infallible;
use std::io::BufRead;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// PWM channel driving the left wheels
    #[clap(long, default_value_t = 0)]
    left_channel: u8,
    /// PWM channel driving the right wheels
    #[clap(long, default_value_t = 1)]
    right_channel: u8,
    /// PWM channel driving the winch
    #[clap(long, default_value_t = 2)]
    winch_channel: u8,
    #[clap(long, default_value_t = 25)]
    left_front_pin: u8,
    #[clap(long, default_value_t = 32)]
    left_back_pin: u8,
    #[clap(long, default_value_t = 26)]
    right_front_pin: u8,
    #[clap(long, default_value_t = 33)]
    right_back_pin: u8,
    #[clap(long, default_value_t = 27)]
    winch_pin: u8,
    /// PWM base frequency in Hz
    #[clap(long, default_value_t = 333)]
    frequency: u32,
    /// Pulse width in µs at full reverse
    #[clap(long, default_value_t = 500)]
    pulse_min: u32,
    /// Pulse width in µs at full forward
    #[clap(long, default_value_t = 2500)]
    pulse_max: u32,
}

/// PWM driver that logs to console
struct ConsolePwm;

impl PwmDriver for ConsolePwm {
    type Error = Infallible;

    fn configure_channel(
        &mut self,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), Self::Error> {
        info!("PWM channel {}: {} Hz, {}-bit", channel, frequency_hz, resolution_bits);
        Ok(())
    }

    fn attach_pin(
        &mut self,
        pin: u8,
        channel: u8,
    ) -> Result<(), Self::Error> {
        info!("PWM pin {} -> channel {}", pin, channel);
        Ok(())
    }

    fn write_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error> {
        debug!("PWM channel {} duty {}", channel, duty);
        Ok(())
    }
}

#[embassy_executor::task]
async fn drive_task(mut ctrl: DriveController<ConsolePwm>) -> ! {
    ctrl.drive_ch().await
}

/// Forward JSON drive commands read from stdin, one per line.
fn stdin_commands() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DriveCommand>(&line) {
            Ok(cmd) => {
                if DRIVE_CHANNEL.try_send(cmd).is_err() {
                    warn!("Drive channel full, dropping {:?}", cmd);
                }
            }
            Err(e) => warn!("Invalid drive command {:?}: {}", line, e),
        }
    }
    info!("stdin closed");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts: Opts = Opts::parse();
    let channels = ChannelAssignment::new(opts.left_channel, opts.right_channel, opts.winch_channel);
    let pins = PinAssignment {
        left_front: opts.left_front_pin,
        right_front: opts.right_front_pin,
        left_back: opts.left_back_pin,
        right_back: opts.right_back_pin,
        winch: opts.winch_pin,
    };
    let timing = ServoTiming {
        frequency_hz: opts.frequency,
        pulse_min_us: opts.pulse_min,
        pulse_max_us: opts.pulse_max,
        ..Default::default()
    };

    let ctrl = match DriveController::new(ConsolePwm, channels, pins, Some(timing)) {
        Ok(ctrl) => ctrl,
        Err(e) => {
            error!("Drive setup failed: {:?}", e);
            std::process::exit(1);
        }
    };

    std::thread::spawn(stdin_commands);
    info!(r#"Reading drive commands from stdin, e.g. {{"dc":"m","f":0.5,"s":0.1,"w":0.0}}"#);

    let executor = mk_static!(Executor, Executor::new());
    executor.run(|spawner| {
        spawner.spawn(drive_task(ctrl)).unwrap();
    });
}
