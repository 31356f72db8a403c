use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use log::warn;

extern crate alloc;
use alloc::sync::Arc;

use super::RawSample;

/// Queue depth for sample events. Samples posted while the queue is full
/// are dropped.
pub const SAMPLE_QUEUE_DEPTH: usize = 8;

/// Queue carrying samples from the driver callback to the heading service.
pub type SampleQueue = Channel<CriticalSectionRawMutex, SampleEvent, SAMPLE_QUEUE_DEPTH>;

/// A sample tagged with the channel session it was produced for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleEvent {
    pub session: u32,
    pub sample: RawSample,
}

/// Posting handle given to the driver when a channel opens.
///
/// Cloneable and thread-safe so the driver can move it into whatever
/// callback context delivers its readings.
#[derive(Clone)]
pub struct SampleSink {
    queue: Arc<SampleQueue>,
    session: u32,
}

impl SampleSink {
    pub(crate) fn new(queue: Arc<SampleQueue>, session: u32) -> Self {
        Self { queue, session }
    }

    /// Session this sink belongs to.
    pub fn session(&self) -> u32 {
        self.session
    }

    /// Post a sample event. Never blocks; returns `false` if the queue was
    /// full and the sample was dropped.
    pub fn post(&self, sample: RawSample) -> bool {
        let event = SampleEvent {
            session: self.session,
            sample,
        };

        match self.queue.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Sample queue full, dropping sample at {} ms (session {})",
                    sample.timestamp_ms, self.session
                );
                false
            }
        }
    }
}
