//! Virtual uinput joypad with force-feedback emulation.
//!
//! Creates a gamepad through `/dev/uinput`, accepts the rumble effects applications upload to it
//! and reports the resulting `(strong, weak)` motor magnitudes to a callback.

pub mod config;
pub mod error;
pub mod force_feedback;
#[cfg(target_os = "linux")]
pub mod probe;
pub mod virtual_controller;

pub use config::Config;
pub use error::{Error, Result};
