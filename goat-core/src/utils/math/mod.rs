//! Math utilities for the GOAT rover.
//!
//! - `mixing`: forward/steering to per-wheel commands for a differential drive
//! - `servo`: pulse-width and duty-cycle mapping for the PWM outputs

pub mod mixing;
pub mod servo;
