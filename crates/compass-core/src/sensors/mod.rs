//! Magnetometer driver abstraction and sample delivery.
//!
//! A platform provides a [`Magnetometer`] that can open a background
//! [`MagChannel`]. While the channel is open the driver pushes every new
//! reading through the [`SampleSink`] it was handed at open time; the
//! [`SensorChannel`] owns the open handle on behalf of the heading service.

mod channel;
mod events;

pub use channel::SensorChannel;
pub use events::{SAMPLE_QUEUE_DEPTH, SampleEvent, SampleQueue, SampleSink};

use thiserror_no_std::Error;

/// Errors reported by the magnetometer driver or the channel that owns it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The device has no magnetometer. This is a static capability, retrying
    /// will not help.
    #[error("Magnetometer sensor not supported")]
    Unsupported,

    /// The driver could not allocate a channel (already in use, out of
    /// resources). The caller may retry.
    #[error("Magnetometer channel unavailable: {details}")]
    Unavailable { details: &'static str },

    /// The driver failed to release an open channel.
    #[error("Magnetometer channel close failed: {details}")]
    CloseFailed { details: &'static str },
}

/// A single reading as delivered by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawSample {
    /// Heading angle in degrees, as reported by the driver.
    pub heading_deg: f32,
    /// Hardware timestamp in milliseconds, on the same monotonic timebase as
    /// the service clock.
    pub timestamp_ms: u64,
}

impl RawSample {
    pub const fn new(heading_deg: f32, timestamp_ms: u64) -> Self {
        Self {
            heading_deg,
            timestamp_ms,
        }
    }
}

/// Device driver entry point for magnetometer access.
pub trait Magnetometer {
    /// Handle to an open background channel.
    type Channel: MagChannel;

    /// Whether the device has a magnetometer at all.
    fn is_supported(&self) -> bool;

    /// Open a background-mode channel. The driver must post every reading it
    /// produces for this channel to `sink` until the channel is closed.
    fn open_channel(&mut self, sink: SampleSink) -> Result<Self::Channel, SensorError>;
}

/// An open magnetometer channel.
pub trait MagChannel {
    /// Last reading delivered on this channel, without triggering a new
    /// measurement. `None` until the first sample arrives.
    fn latest(&self) -> Option<RawSample>;

    /// Release the hardware channel and stop sample delivery.
    fn close(&mut self) -> Result<(), SensorError>;
}
