//! This crate provides a polling driver for Mustek Powermust UPS units and other
//! uninterruptible power supplies speaking the Megatec serial protocol.
//!
//! It supports `no-std` environments by use of the `no_std` feature flag.
//!
//! Example UPS models which this should work with:
//! * Mustek PowerMust 400/600/800/1000 Offline and LCD
//! * Mustek PowerMust 1000/1400/2000 Plus
//! * Other Megatec protocol units (Q1 status inquiry)
//!
//! UPS models which it may work with:
//! * Voltronic/Axpert based units using CRC framing, see [`protocol::Voltronic`]
//!
//! The driver never blocks. [`Powermust::run`] is called from the owner's main loop
//! with the current time; it sends a status inquiry every update interval, collects
//! the reply and publishes the decoded values to output channels owned by the host.
//!
//! The serial port used for UPS comms should be configured like so:
//! * Baud rate: 2400
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

#![cfg_attr(feature = "no_std", no_std)]

pub mod command;
pub mod config;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod publisher;
pub mod registry;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock_serial;

/// Millisecond timestamp supplied by the owner on every call.
pub type Instant = fugit::TimerInstantU64<1000>;

/// Millisecond duration used for intervals and timeouts.
pub type Duration = fugit::MillisDurationU32;

pub use command::{PollingCommand, ShutdownDelay, UpsCommand};
pub use config::{ChannelSpec, PowermustConfig, PowermustConfigBuilder, TransportConfig};
pub use error::{CommandError, ConfigError, ParseError, TransportError};
pub use poller::{CycleEvent, PollerState, Powermust, TickOutcome};
pub use protocol::{CommandOutcome, Dialect, Megatec, Voltronic};
pub use publisher::{Field, OutputSink, Value};
pub use registry::{ChannelHandle, ComponentHandle, Registry};
pub use status::{RatingsRecord, StatusFlags, StatusRecord, UpsInfo};
