//! Utility re-exports and helper macros for the GOAT rover.
//!
//! - `controllers`: the drive mixer, PWM drivers and command dispatch
//! - `math`: differential mixing and servo pulse/duty mapping
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod controllers;
pub mod math;

pub use controllers::{DriveCommand, DriveController, DriveMixer, DRIVE_CHANNEL};
pub use math::mixing::DifferentialMix as dm;
pub use math::servo::ServoTiming;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::static_cell::StaticCell<$t> =
            $crate::static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
