//! Test doubles for the magnetometer driver and the service clock.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use crate::sensors::{MagChannel, Magnetometer, RawSample, SampleSink, SensorError};
use crate::service::Clock;

#[derive(Default)]
struct FakeState {
    supported: bool,
    fail_open: bool,
    fail_close: bool,
    /// Open starts a delivery thread and waits for its first post.
    handshake_on_open: bool,
    support_queries: usize,
    opens: usize,
    closes: usize,
    open_handles: usize,
    /// `close` calls on a handle that was already released.
    double_closes: usize,
    latest: Option<RawSample>,
    sink: Option<SampleSink>,
}

fn lock(state: &Arc<Mutex<FakeState>>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap()
}

/// In-memory magnetometer driver.
pub(crate) struct FakeMagnetometer {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side view of a [`FakeMagnetometer`]: injects samples and failures,
/// and counts driver calls.
#[derive(Clone)]
pub(crate) struct FakeProbe {
    state: Arc<Mutex<FakeState>>,
}

pub(crate) struct FakeChannel {
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

impl FakeMagnetometer {
    pub(crate) fn new() -> (Self, FakeProbe) {
        Self::with_support(true)
    }

    pub(crate) fn unsupported() -> (Self, FakeProbe) {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> (Self, FakeProbe) {
        let state = Arc::new(Mutex::new(FakeState {
            supported,
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            FakeProbe { state },
        )
    }
}

impl Magnetometer for FakeMagnetometer {
    type Channel = FakeChannel;

    fn is_supported(&self) -> bool {
        let mut state = lock(&self.state);
        state.support_queries += 1;
        state.supported
    }

    fn open_channel(&mut self, sink: SampleSink) -> Result<FakeChannel, SensorError> {
        let handshake = {
            let state = lock(&self.state);
            if state.fail_open {
                return Err(SensorError::Unavailable {
                    details: "channel already in use",
                });
            }
            state.handshake_on_open
        };

        if handshake {
            let (ready_tx, ready_rx) = mpsc::channel();
            let thread_sink = sink.clone();
            thread::spawn(move || {
                thread_sink.post(RawSample::new(0.0, 0));
                ready_tx.send(()).ok();
            });
            ready_rx
                .recv_timeout(Duration::from_secs(2))
                .map_err(|_| SensorError::Unavailable {
                    details: "delivery thread never reported in",
                })?;
        }

        let mut state = lock(&self.state);
        state.opens += 1;
        state.open_handles += 1;
        state.sink = Some(sink);
        Ok(FakeChannel {
            state: self.state.clone(),
            closed: false,
        })
    }
}

impl MagChannel for FakeChannel {
    fn latest(&self) -> Option<RawSample> {
        if self.closed {
            return None;
        }
        lock(&self.state).latest
    }

    fn close(&mut self) -> Result<(), SensorError> {
        let mut state = lock(&self.state);
        state.closes += 1;
        if self.closed {
            state.double_closes += 1;
        } else {
            self.closed = true;
            state.open_handles -= 1;
            state.sink = None;
        }
        if state.fail_close {
            return Err(SensorError::CloseFailed {
                details: "driver refused to release channel",
            });
        }
        Ok(())
    }
}

impl FakeProbe {
    /// Record a new hardware reading and post it to the open channel's sink.
    /// Returns whether the sample was queued.
    pub(crate) fn deliver(&self, heading_deg: f32, timestamp_ms: u64) -> bool {
        let sample = RawSample::new(heading_deg, timestamp_ms);
        let sink = {
            let mut state = lock(&self.state);
            state.latest = Some(sample);
            state.sink.clone()
        };
        sink.is_some_and(|s| s.post(sample))
    }

    /// Sink of the currently open channel, if any.
    pub(crate) fn sink(&self) -> Option<SampleSink> {
        lock(&self.state).sink.clone()
    }

    pub(crate) fn sink_session(&self) -> Option<u32> {
        self.sink().map(|s| s.session())
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    pub(crate) fn set_fail_close(&self, fail: bool) {
        lock(&self.state).fail_close = fail;
    }

    pub(crate) fn set_handshake_on_open(&self, handshake: bool) {
        lock(&self.state).handshake_on_open = handshake;
    }

    pub(crate) fn support_queries(&self) -> usize {
        lock(&self.state).support_queries
    }

    pub(crate) fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    pub(crate) fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub(crate) fn open_handles(&self) -> usize {
        lock(&self.state).open_handles
    }

    pub(crate) fn double_closes(&self) -> usize {
        lock(&self.state).double_closes
    }
}

/// Clock the test moves by hand.
#[derive(Clone, Default)]
pub(crate) struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub(crate) fn at(ms: u64) -> Self {
        let clock = Self::default();
        clock.set(ms);
        clock
    }

    pub(crate) fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
