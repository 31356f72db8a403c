//! Desktop simulator for the compass-rs heading service.
//!
//! Runs the compass-core heading service against a synthetic magnetometer
//! whose heading slowly sweeps around the dial. Commands are read from stdin,
//! one per line, in the same shape the host framework would dispatch them:
//!
//! | Input              | Action                                 |
//! |--------------------|----------------------------------------|
//! | `getHeading`       | Read the heading (opens the channel)   |
//! | `setTimeout <ms>`  | Change the idle timeout                |
//! | `getTimeout`       | Show the idle timeout                  |
//! | `start` / `stop`   | Open / close the channel explicitly    |
//! | `getStatus`        | Show the channel state                 |
//! | `quit`             | Tear down and exit                     |
//!
//! Set `RUST_LOG=debug` to watch the channel open and power down.
//!
//! # Environment
//!
//! - `COMPASS_IDLE_TIMEOUT_MS`: initial idle timeout (default 30000)
//! - `COMPASS_TIMEOUT_COMMANDS`: `0`/`false` hides setTimeout/getTimeout
//! - `COMPASS_SIM_UNSUPPORTED`: pretend the device has no magnetometer

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use compass_core::{
    CompassConfig, HeadingService, MagChannel, Magnetometer, Plugin, RawSample, Reply,
    SampleSink, SensorError,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Interval between synthetic magnetometer samples.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Degrees per second the synthetic heading sweeps.
const SWEEP_DEG_PER_SEC: f64 = 6.0;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Milliseconds since simulator start. Shared by the service and the
/// synthetic driver so sample timestamps line up with access times.
#[derive(Clone, Copy)]
struct HostClock {
    start: Instant,
}

impl HostClock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl compass_core::Clock for HostClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Synthetic magnetometer
// ---------------------------------------------------------------------------

struct SimMagnetometer {
    clock: HostClock,
    supported: bool,
}

struct SimChannel {
    latest: Arc<Mutex<Option<RawSample>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Heading for a point in time: a slow sweep with a little wobble.
fn synthetic_heading(t_ms: u64) -> f32 {
    let t = t_ms as f64 / 1000.0;
    let heading = SWEEP_DEG_PER_SEC * t + 4.0 * (t / 3.0).sin();
    (heading % 360.0) as f32
}

impl Magnetometer for SimMagnetometer {
    type Channel = SimChannel;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn open_channel(&mut self, sink: SampleSink) -> Result<SimChannel, SensorError> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let clock = self.clock;
        let thread_latest = latest.clone();
        let thread_running = running.clone();

        let worker = thread::Builder::new()
            .name(format!("mag-session-{}", sink.session()))
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    let now = compass_core::Clock::now_ms(&clock);
                    let sample = RawSample::new(synthetic_heading(now), now);

                    if let Ok(mut slot) = thread_latest.lock() {
                        *slot = Some(sample);
                    }
                    sink.post(sample);

                    thread::sleep(SAMPLE_INTERVAL);
                }
            })
            .map_err(|e| {
                warn!("Failed to spawn sample thread: {}", e);
                SensorError::Unavailable {
                    details: "could not start sample thread",
                }
            })?;

        Ok(SimChannel {
            latest,
            running,
            worker: Some(worker),
        })
    }
}

impl MagChannel for SimChannel {
    fn latest(&self) -> Option<RawSample> {
        self.latest.lock().ok().and_then(|slot| *slot)
    }

    fn close(&mut self) -> Result<(), SensorError> {
        self.running.store(false, Ordering::Release);

        // The service lock is not a critical section, so the worker can
        // still post while we wait for it.
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.join().map_err(|_| SensorError::CloseFailed {
            details: "sample thread panicked",
        })
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
}

fn config_from_env() -> CompassConfig {
    let mut config = CompassConfig::default();

    if let Ok(raw) = std::env::var("COMPASS_IDLE_TIMEOUT_MS") {
        match raw.trim().parse::<f32>() {
            Ok(ms) => config = config.with_idle_timeout_ms(ms),
            Err(e) => warn!("Ignoring COMPASS_IDLE_TIMEOUT_MS={:?}: {}", raw, e),
        }
    }
    if let Some(enabled) = env_flag("COMPASS_TIMEOUT_COMMANDS") {
        config = config.with_timeout_commands(enabled);
    }

    config
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Heading(h) => println!(
            "heading: magnetic={:.1} true={:.1} accuracy={} timestamp={}",
            h.magnetic_heading, h.true_heading, h.accuracy, h.timestamp_ms
        ),
        Reply::Timeout(ms) => println!("timeout: {}", ms),
        Reply::Status(state) => println!("status: {:?}", state),
        Reply::Empty => println!("ok"),
    }

    match reply.encode() {
        Ok(bytes) => info!("Encoded reply: {} bytes", bytes.len()),
        Err(e) => println!("error: {}", e),
    }
}

fn main() {
    env_logger::init();

    let clock = HostClock::new();
    let config = config_from_env();
    let driver = SimMagnetometer {
        clock,
        supported: !env_flag("COMPASS_SIM_UNSUPPORTED").unwrap_or(false),
    };

    info!("Starting compass simulator with {:?}", config);
    let service = Arc::new(HeadingService::new(driver, clock, config));

    let pump = {
        let service = service.clone();
        thread::Builder::new()
            .name("sample-pump".into())
            .spawn(move || futures::executor::block_on(service.run()))
            .expect("Failed to spawn sample pump")
    };

    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            print!("> ");
            io::stdout().flush().ok();
            continue;
        };
        if matches!(command, "quit" | "q" | "exit") {
            break;
        }

        let args: Vec<&str> = parts.collect();
        match service.handle(command, &args) {
            Ok(reply) => print_reply(&reply),
            Err(e) => println!("error: {}", e),
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Plugin::teardown(service.as_ref());
    if pump.join().is_err() {
        warn!("Sample pump panicked");
    }
    info!("Simulator stopped");
}
