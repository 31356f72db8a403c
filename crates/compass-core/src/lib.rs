//! Hardware-independent core library for compass-rs
//!
//! This crate contains all platform-agnostic logic for the magnetometer
//! heading service: the driver abstraction, the sensor channel that owns the
//! hardware handle, the power-managing heading service and the command
//! surface the host framework talks to.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod plugin;
pub mod sensors;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CompassConfig;
pub use plugin::{Command, CommandError, Plugin, Reply};
pub use sensors::{MagChannel, Magnetometer, RawSample, SampleSink, SensorError};
pub use service::{ChannelState, Clock, Heading, HeadingService};
