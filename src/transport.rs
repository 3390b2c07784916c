//! Line-oriented serial transport.

use embedded_io::{Read, ReadReady, Write};
use log::{debug, warn};

use crate::{error::TransportError, protocol::TERMINATOR, Duration, Instant};

pub type Result<T, I> = core::result::Result<T, TransportError<I>>;

/// Owns the serial port and frames replies on the carriage return terminator.
///
/// The transport is non-blocking: [`Self::send`] starts a request and [`Self::receive`]
/// is called repeatedly until a frame arrives or the reply timeout expires.
/// `L` is the receive buffer size in bytes.
pub struct SerialTransport<S, const L: usize = 128> {
    interface: S,
    timeout: Duration,
    buffer: heapless::Vec<u8, L>,
    /// When the request in flight was sent, if any.
    started: Option<Instant>,
}

impl<S: Read + Write + ReadReady, const L: usize> SerialTransport<S, L> {
    pub fn new(interface: S, timeout: Duration) -> Self {
        Self {
            interface,
            timeout,
            buffer: heapless::Vec::new(),
            started: None,
        }
    }

    /// Whether a request has been sent and is still waiting for its reply.
    pub fn is_pending(&self) -> bool {
        self.started.is_some()
    }

    /// Discard stale input, write a complete request frame and start the reply timer.
    pub fn send(&mut self, frame: &[u8], now: Instant) -> Result<(), S::Error> {
        self.drain()?;
        self.buffer.clear();

        self.interface.write_all(frame).map_err(TransportError::Io)?;
        self.interface.flush().map_err(TransportError::Io)?;
        self.started = Some(now);
        Ok(())
    }

    /// Collect whatever bytes are available.
    ///
    /// Returns `Ok(None)` while the reply is incomplete, the whole frame (terminator
    /// included) once it has arrived, or [`TransportError::Timeout`] once the reply
    /// timeout has elapsed. Either of the latter ends the request.
    pub fn receive(&mut self, now: Instant) -> Result<Option<heapless::Vec<u8, L>>, S::Error> {
        let Some(started) = self.started else {
            return Ok(None);
        };

        let mut chunk = [0u8; 16];
        while self.interface.read_ready().map_err(TransportError::Io)? {
            let count = self.interface.read(&mut chunk).map_err(TransportError::Io)?;
            if count == 0 {
                break;
            }
            for &byte in &chunk[..count] {
                if self.buffer.push(byte).is_err() {
                    warn!("Reply longer than {} bytes, discarding", L);
                    // Restart from the overflowing byte so a terminator still ends the frame.
                    self.buffer.clear();
                    let _ = self.buffer.push(byte);
                }
                if byte == TERMINATOR {
                    // Anything after the terminator belongs to no request.
                    self.drain()?;
                    self.started = None;
                    return Ok(Some(core::mem::take(&mut self.buffer)));
                }
            }
        }

        let elapsed_ms = now
            .checked_duration_since(started)
            .map_or(0, |elapsed| elapsed.to_millis());
        if elapsed_ms > u64::from(self.timeout.to_millis()) {
            debug!("No reply after {} ms ({} bytes received)", elapsed_ms, self.buffer.len());
            self.cancel();
            return Err(TransportError::Timeout);
        }
        Ok(None)
    }

    /// Abandon any request in flight.
    pub fn cancel(&mut self) {
        self.started = None;
        self.buffer.clear();
    }

    /// Give back the serial port.
    pub fn release(self) -> S {
        self.interface
    }

    #[cfg(test)]
    pub(crate) fn interface(&mut self) -> &mut S {
        &mut self.interface
    }

    fn drain(&mut self) -> Result<(), S::Error> {
        let mut chunk = [0u8; 16];
        while self.interface.read_ready().map_err(TransportError::Io)? {
            if self.interface.read(&mut chunk).map_err(TransportError::Io)? == 0 {
                break;
            }
        }
        Ok(())
    }
}
