//! Our error types for the Powermust UPS driver.

use thiserror::Error;

/// Errors raised while building a component from its configuration.
///
/// These are fatal at startup: the component is never constructed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing transport (UART) reference")]
    MissingTransport,
    #[error("Component ID must not be empty")]
    MissingId,
    #[error("Update interval must be greater than zero")]
    InvalidInterval,
    #[error("Reply timeout must be greater than zero and shorter than the update interval")]
    InvalidTimeout,
    #[error("Could not parse duration")]
    InvalidDuration,
    #[error("Identifier too long")]
    IdTooLong,
    #[error("Output channel bound twice")]
    DuplicateChannel,
    #[error("Too many output channels")]
    TooManyChannels,
    #[error("Host rejected the binding")]
    Rejected,
}

/// Errors reported by the serial transport.
#[derive(Error, Debug)]
pub enum TransportError<I: embedded_io::Error> {
    #[error("Serial communication error")]
    Io(I),
    #[error("No reply within the configured timeout")]
    Timeout,
}

/// Errors decoding a reply frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Length, checksum or field format mismatch.
    #[error("Malformed frame")]
    Malformed,
    /// The frame starts with a header byte this dialect does not produce.
    #[error("Unexpected frame header for this dialect")]
    UnsupportedDialect,
    /// The UPS answered `(NAK`.
    #[error("Request rejected by the UPS")]
    Rejected,
}

/// Errors queueing a control command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command queue full")]
    QueueFull,
    #[error("Component is faulted")]
    Faulted,
    #[error("Command argument out of range")]
    InvalidArgument,
}
