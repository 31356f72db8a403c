//! Host command surface.
//!
//! The host framework routes a command name plus string arguments to
//! [`Plugin::handle`] and maps the [`Reply`] or [`CommandError`] into its own
//! wire format. [`Plugin::teardown`] is called when the host destroys the
//! plugin instance.

use serde::Serialize;
use thiserror_no_std::Error;

extern crate alloc;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, error};

use crate::sensors::{Magnetometer, SensorError};
use crate::service::{ChannelState, Clock, Heading, HeadingService};

/// Lifecycle interface implemented for the host framework.
pub trait Plugin {
    /// Run one command synchronously.
    fn handle(&self, command: &str, args: &[&str]) -> Result<Reply, CommandError>;

    /// Release everything the plugin holds. Called once by the host.
    ///
    /// Afterwards commands that would open hardware fail with
    /// [`CommandError::SensorUnavailable`]; `stop` and `getStatus` still
    /// answer.
    fn teardown(&self);
}

/// Commands understood by the heading service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetHeading,
    SetTimeout,
    GetTimeout,
    Start,
    Stop,
    GetStatus,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::GetHeading,
        Command::SetTimeout,
        Command::GetTimeout,
        Command::Start,
        Command::Stop,
        Command::GetStatus,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Command::GetHeading => "getHeading",
            Command::SetTimeout => "setTimeout",
            Command::GetTimeout => "getTimeout",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::GetStatus => "getStatus",
        }
    }

    pub fn parse(name: &str) -> Option<Command> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Commands that only exist while the timeout capability is enabled.
    pub const fn needs_timeout_capability(self) -> bool {
        matches!(self, Command::SetTimeout | Command::GetTimeout)
    }
}

/// Successful command result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Reply {
    Heading(Heading),
    /// Timeout in milliseconds, formatted as a float string.
    Timeout(String),
    Status(ChannelState),
    Empty,
}

impl Reply {
    /// Encode the reply for the host transport.
    pub fn encode(&self) -> Result<Vec<u8>, CommandError> {
        postcard::to_allocvec(self).map_err(|e| {
            error!("Failed to encode reply: {}", e);
            CommandError::Encoding(heapless::String::from_truncated(format!("{}", e).as_str()))
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The device has no magnetometer. Permanent.
    #[error("Magnetometer sensor not supported")]
    SensorUnsupported,
    /// The channel could not be allocated or released. The caller may retry.
    #[error("Magnetometer channel unavailable: {0}")]
    SensorUnavailable(heapless::String<64>),
    #[error("Invalid argument: {0}")]
    InvalidArgument(heapless::String<64>),
    /// Unknown command. Names longer than 64 bytes are cut to fit.
    #[error("Magnetometer: Invalid action: {0}")]
    InvalidAction(heapless::String<64>),
    /// Building the structured reply failed. Indicates a bug, not bad input.
    #[error("Encoding error: {0}")]
    Encoding(heapless::String<64>),
}

impl From<SensorError> for CommandError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::Unsupported => CommandError::SensorUnsupported,
            SensorError::Unavailable { details } | SensorError::CloseFailed { details } => {
                CommandError::SensorUnavailable(heapless::String::from_truncated(details))
            }
        }
    }
}

/// Build a bounded string, cutting off whatever does not fit.
pub trait FromTruncated<T> {
    fn from_truncated(value: T) -> Self;
}

impl<'a, const N: usize> FromTruncated<&'a str> for heapless::String<N> {
    fn from_truncated(value: &'a str) -> Self {
        let mut out = heapless::String::new();
        for c in value.chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        out
    }
}

fn parse_timeout(args: &[&str]) -> Result<f32, CommandError> {
    let raw = args.first().ok_or_else(|| {
        CommandError::InvalidArgument(heapless::String::from_truncated(
            "setTimeout expects a timeout in milliseconds",
        ))
    })?;

    raw.trim().parse::<f32>().map_err(|e| {
        CommandError::InvalidArgument(heapless::String::from_truncated(
            format!("{}: {}", raw, e).as_str(),
        ))
    })
}

impl<M: Magnetometer, C: Clock> Plugin for HeadingService<M, C> {
    fn handle(&self, command: &str, args: &[&str]) -> Result<Reply, CommandError> {
        debug!("Dispatching {} {:?}", command, args);

        let timeout_commands = self.config().timeout_commands;
        let cmd = Command::parse(command)
            .filter(|c| timeout_commands || !c.needs_timeout_capability())
            .ok_or_else(|| CommandError::InvalidAction(heapless::String::from_truncated(command)))?;

        match cmd {
            Command::GetHeading => Ok(Reply::Heading(self.get_heading()?)),
            Command::SetTimeout => {
                self.set_timeout(parse_timeout(args)?);
                Ok(Reply::Empty)
            }
            // Debug formatting keeps the decimal point, e.g. "500.0"
            Command::GetTimeout => Ok(Reply::Timeout(format!("{:?}", self.timeout()))),
            Command::Start => {
                self.start()?;
                Ok(Reply::Empty)
            }
            Command::Stop => {
                self.stop()?;
                Ok(Reply::Empty)
            }
            Command::GetStatus => Ok(Reply::Status(self.status())),
        }
    }

    fn teardown(&self) {
        HeadingService::teardown(self);
    }
}
