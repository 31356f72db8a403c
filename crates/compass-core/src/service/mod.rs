//! Heading service: the command-facing side of the magnetometer.
//!
//! The service opens the sensor channel lazily on the first heading request
//! and closes it again once the driver keeps delivering samples nobody reads.
//! Command calls and sample events share a single lock, so the channel
//! handle, the last access time and the timeout always change together.
//!
//! ## Threads
//!
//! - Command thread: [`HeadingService::get_heading`], [`HeadingService::stop`], ...
//! - Driver thread(s): post samples through the [`SampleSink`](crate::sensors::SampleSink)
//!   handed out at open time. Posting never blocks.
//! - Pump: [`HeadingService::run`] (or [`HeadingService::process_pending`]
//!   on a polling loop) feeds queued samples into the idle check.
//!
//! ## Locking
//!
//! The state lives in an [`AsyncMutex`], like the shared I2C bus in the
//! firmware. Its guard is not a critical section, so driver calls made while
//! holding it (open, close, latest) never stop a driver thread from posting.
//! The only critical sections are the short ones inside the mutex and the
//! sample queue. Synchronous callers acquire the mutex with
//! [`embassy_futures::block_on`].

mod heading;

pub use heading::{Heading, normalize_degrees};

use embassy_futures::block_on;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex as AsyncMutex, MutexGuard};
use embassy_sync::signal::Signal;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

extern crate alloc;
use alloc::sync::Arc;

use crate::config::CompassConfig;
use crate::sensors::{Magnetometer, SampleEvent, SampleQueue, SensorChannel, SensorError};

/// Monotonic millisecond time source. Must share its timebase with the
/// timestamps the driver puts on samples.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Power state of the hardware channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Stopped,
    Started,
}

const TORN_DOWN: SensorError = SensorError::Unavailable {
    details: "heading service torn down",
};

struct ServiceState<M: Magnetometer> {
    channel: SensorChannel<M>,
    last_access_ms: u64,
    timeout_ms: f32,
    /// Set once the device reports it has no magnetometer.
    unsupported: bool,
    torn_down: bool,
}

impl<M: Magnetometer> ServiceState<M> {
    fn status(&self) -> ChannelState {
        if self.channel.is_open() {
            ChannelState::Started
        } else {
            ChannelState::Stopped
        }
    }

    /// Make sure the channel is open, remembering a missing sensor for good.
    fn ensure_started(&mut self) -> Result<(), SensorError> {
        if self.torn_down {
            return Err(TORN_DOWN);
        }
        if self.unsupported {
            return Err(SensorError::Unsupported);
        }

        match self.channel.open() {
            Err(SensorError::Unsupported) => {
                warn!("Magnetometer not supported on this device");
                self.unsupported = true;
                Err(SensorError::Unsupported)
            }
            other => other,
        }
    }

    fn is_idle(&self, event: &SampleEvent) -> bool {
        if !self.channel.is_open() || event.session != self.channel.session() {
            trace!(
                "Ignoring sample from session {} (current {})",
                event.session,
                self.channel.session()
            );
            return false;
        }

        let idle_ms = event.sample.timestamp_ms as f64 - self.last_access_ms as f64;
        if idle_ms > self.timeout_ms as f64 {
            info!(
                "Magnetometer idle for {} ms (timeout {} ms), powering down",
                idle_ms, self.timeout_ms
            );
            return true;
        }
        false
    }
}

/// Magnetometer heading service.
pub struct HeadingService<M: Magnetometer, C: Clock> {
    state: AsyncMutex<CriticalSectionRawMutex, ServiceState<M>>,
    queue: Arc<SampleQueue>,
    shutdown: Signal<CriticalSectionRawMutex, ()>,
    clock: C,
    config: CompassConfig,
}

impl<M: Magnetometer, C: Clock> HeadingService<M, C> {
    pub fn new(driver: M, clock: C, config: CompassConfig) -> Self {
        let queue = Arc::new(SampleQueue::new());

        Self {
            state: AsyncMutex::new(ServiceState {
                channel: SensorChannel::new(driver, queue.clone()),
                last_access_ms: 0,
                timeout_ms: config.idle_timeout_ms,
                unsupported: false,
                torn_down: false,
            }),
            queue,
            shutdown: Signal::new(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CompassConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, CriticalSectionRawMutex, ServiceState<M>> {
        block_on(self.state.lock())
    }

    /// Read the current heading, opening the channel first if it is stopped.
    ///
    /// Fails with [`SensorError::Unavailable`] once the service is torn down.
    pub fn get_heading(&self) -> Result<Heading, SensorError> {
        let mut state = self.lock_state();
        state.ensure_started()?;

        let now = self.clock.now_ms();
        let heading = Heading::from_sample(state.channel.sample(), now);
        state.last_access_ms = now;

        debug!(
            "Heading {} deg at {} ms",
            heading.magnetic_heading, heading.timestamp_ms
        );
        Ok(heading)
    }

    /// Open the channel ahead of the first read. Counts as an access, so the
    /// idle timeout starts now.
    pub fn start(&self) -> Result<(), SensorError> {
        let mut state = self.lock_state();
        state.ensure_started()?;
        state.last_access_ms = self.clock.now_ms();
        Ok(())
    }

    /// Close the channel. The service is stopped afterwards even if the
    /// driver reports a close failure.
    pub fn stop(&self) -> Result<(), SensorError> {
        self.lock_state().channel.close()
    }

    /// Replace the idle timeout. Not validated: zero or negative values close
    /// the channel on the next sample that follows a read.
    pub fn set_timeout(&self, timeout_ms: f32) {
        debug!("Idle timeout set to {} ms", timeout_ms);
        self.lock_state().timeout_ms = timeout_ms;
    }

    pub fn timeout(&self) -> f32 {
        self.lock_state().timeout_ms
    }

    pub fn status(&self) -> ChannelState {
        self.lock_state().status()
    }

    /// Idle check for one delivered sample.
    ///
    /// Events from an earlier session, or arriving after the channel was
    /// closed, are ignored. A close failure here is logged and dropped.
    pub fn on_sample(&self, event: SampleEvent) {
        block_on(self.handle_sample(event))
    }

    async fn handle_sample(&self, event: SampleEvent) {
        let mut state = self.state.lock().await;

        if state.is_idle(&event) {
            if let Err(e) = state.channel.close() {
                warn!("Idle close of magnetometer channel failed: {}", e);
            }
        }
    }

    /// Handle every sample event already queued. Returns how many were
    /// processed.
    pub fn process_pending(&self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.queue.try_receive() {
            self.on_sample(event);
            processed += 1;
        }
        processed
    }

    /// Sample pump. Feeds queued samples into the idle check until
    /// [`teardown`](Self::teardown) is called.
    pub async fn run(&self) {
        loop {
            match select(self.queue.receive(), self.shutdown.wait()).await {
                Either::First(event) => self.handle_sample(event).await,
                Either::Second(()) => {
                    debug!("Sample pump stopped");
                    return;
                }
            }
        }
    }

    /// Force-close the channel and stop the sample pump.
    ///
    /// Terminal: later `get_heading` and `start` calls fail instead of
    /// reopening a channel that no pump would ever power down.
    pub fn teardown(&self) {
        {
            let mut state = self.lock_state();
            state.torn_down = true;
            if let Err(e) = state.channel.close() {
                warn!("Closing magnetometer channel on teardown failed: {}", e);
            }
        }
        self.shutdown.signal(());
    }
}

impl<M: Magnetometer, C: Clock> Drop for HeadingService<M, C> {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().channel.close() {
            warn!("Closing magnetometer channel on drop failed: {}", e);
        }
    }
}
