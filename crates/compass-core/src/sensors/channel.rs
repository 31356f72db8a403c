use log::{error, info};

extern crate alloc;
use alloc::sync::Arc;

use super::{MagChannel, Magnetometer, RawSample, SampleQueue, SampleSink, SensorError};

/// Owns at most one open magnetometer channel and its sample subscription.
///
/// Each successful [`open`](Self::open) starts a new session; samples posted
/// by an earlier session's sink can be told apart by their session id.
pub struct SensorChannel<M: Magnetometer> {
    driver: M,
    handle: Option<M::Channel>,
    queue: Arc<SampleQueue>,
    session: u32,
}

impl<M: Magnetometer> SensorChannel<M> {
    pub fn new(driver: M, queue: Arc<SampleQueue>) -> Self {
        Self {
            driver,
            handle: None,
            queue,
            session: 0,
        }
    }

    /// Open the hardware channel and subscribe the sample queue to it.
    /// Does nothing if the channel is already open.
    pub fn open(&mut self) -> Result<(), SensorError> {
        if self.handle.is_some() {
            return Ok(());
        }

        if !self.driver.is_supported() {
            return Err(SensorError::Unsupported);
        }

        let session = self.session.wrapping_add(1);
        let sink = SampleSink::new(self.queue.clone(), session);
        let handle = self.driver.open_channel(sink).map_err(|e| {
            error!("Failed to open magnetometer channel: {}", e);
            e
        })?;

        self.session = session;
        self.handle = Some(handle);
        info!("Magnetometer channel opened (session {})", session);

        Ok(())
    }

    /// Release the channel if open. The handle is given up even when the
    /// driver reports a failure.
    pub fn close(&mut self) -> Result<(), SensorError> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        info!("Closing magnetometer channel (session {})", self.session);
        handle.close()
    }

    /// Most recent reading delivered on the open channel.
    pub fn sample(&self) -> Option<RawSample> {
        self.handle.as_ref().and_then(|h| h.latest())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Id of the current (or most recent) session.
    pub fn session(&self) -> u32 {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMagnetometer;

    fn channel(driver: FakeMagnetometer) -> SensorChannel<FakeMagnetometer> {
        SensorChannel::new(driver, Arc::new(SampleQueue::new()))
    }

    #[test]
    fn test_open_is_noop_when_already_open() {
        let (driver, probe) = FakeMagnetometer::new();
        let mut ch = channel(driver);

        ch.open().unwrap();
        ch.open().unwrap();

        assert!(ch.is_open());
        assert_eq!(probe.opens(), 1);
        assert_eq!(ch.session(), 1);
    }

    #[test]
    fn test_open_reports_unsupported_without_opening() {
        let (driver, probe) = FakeMagnetometer::unsupported();
        let mut ch = channel(driver);

        assert_eq!(ch.open(), Err(SensorError::Unsupported));
        assert!(!ch.is_open());
        assert_eq!(probe.opens(), 0);
    }

    #[test]
    fn test_failed_open_keeps_session() {
        let (driver, probe) = FakeMagnetometer::new();
        probe.set_fail_open(true);
        let mut ch = channel(driver);

        assert!(matches!(ch.open(), Err(SensorError::Unavailable { .. })));
        assert!(!ch.is_open());
        assert_eq!(ch.session(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (driver, probe) = FakeMagnetometer::new();
        let mut ch = channel(driver);

        ch.open().unwrap();
        ch.close().unwrap();
        ch.close().unwrap();

        assert!(!ch.is_open());
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.open_handles(), 0);
    }

    #[test]
    fn test_close_failure_still_releases_handle() {
        let (driver, probe) = FakeMagnetometer::new();
        let mut ch = channel(driver);

        ch.open().unwrap();
        probe.set_fail_close(true);

        assert!(matches!(ch.close(), Err(SensorError::CloseFailed { .. })));
        assert!(!ch.is_open());
    }

    #[test]
    fn test_sample_reads_latest_delivered_value() {
        let (driver, probe) = FakeMagnetometer::new();
        let mut ch = channel(driver);

        assert_eq!(ch.sample(), None);
        ch.open().unwrap();
        assert_eq!(ch.sample(), None);

        probe.deliver(45.0, 100);
        probe.deliver(47.5, 200);
        assert_eq!(ch.sample(), Some(RawSample::new(47.5, 200)));

        ch.close().unwrap();
        assert_eq!(ch.sample(), None);
    }

    #[test]
    fn test_each_open_starts_new_session() {
        let (driver, probe) = FakeMagnetometer::new();
        let mut ch = channel(driver);

        ch.open().unwrap();
        ch.close().unwrap();
        ch.open().unwrap();

        assert_eq!(ch.session(), 2);
        assert_eq!(probe.sink_session(), Some(2));
    }
}
