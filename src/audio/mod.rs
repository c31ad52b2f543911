//! Audio capture, mixing and level metering.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod level;
pub mod mixer;
pub mod source;
