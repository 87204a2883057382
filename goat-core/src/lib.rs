//! Drive mixing and PWM actuation for the GOAT differential-drive rover on
//! no-std embedded platforms.
#![no_std]

pub mod utils;

#[doc(hidden)]
pub use static_cell;
