//! We use this mocking module in unit tests to emulate the UPS on the end of a serial port.

/// Capacity of each emulated buffer, in bytes.
const CAPACITY: usize = 256;

/// Our mock type used to emulate a serial port.
///
/// Bytes can be made available immediately with [`Self::set_read_data`], or queued
/// with [`Self::queue_response`] to arrive only once a complete (`\r` terminated)
/// request has been written, the way a UPS answers.
pub struct MockSerial {
    /// Everything written to the port.
    write_buffer: heapless::Vec<u8, CAPACITY>,
    /// Data currently available to read.
    read_buffer: heapless::Vec<u8, CAPACITY>,
    read_position: usize,
    /// Replies released one per request written.
    responses: heapless::Deque<heapless::Vec<u8, CAPACITY>, 8>,
    /// Number of complete requests written.
    requests: usize,
    should_error_on_write: bool,
    should_error_on_read: bool,
}

#[derive(Debug)]
pub enum MockSerialError {
    /// Simulated buffer overflow
    BufferOverflow,
    /// Device unplugged
    Disconnected,
    /// Would block - no data available
    WouldBlock,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockSerialError::BufferOverflow => write!(f, "mock buffer overflow"),
            MockSerialError::Disconnected => write!(f, "device disconnected"),
            MockSerialError::WouldBlock => write!(f, "no data available"),
        }
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::Disconnected => embedded_io::ErrorKind::NotConnected,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }

        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        // A terminated request releases the next queued reply.
        for _ in buf.iter().filter(|&&b| b == b'\r') {
            self.requests += 1;
            if let Some(response) = self.responses.pop_front() {
                self.read_buffer
                    .extend_from_slice(&response)
                    .map_err(|_| MockSerialError::BufferOverflow)?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::Disconnected);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::Disconnected);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::WouldBlock);
        }

        let available = &self.read_buffer[self.read_position..];
        let count = core::cmp::min(buf.len(), available.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.read_position += count;

        // Fully consumed, start over so the buffer never fills up.
        if self.read_position == self.read_buffer.len() {
            self.read_buffer.clear();
            self.read_position = 0;
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read_position < self.read_buffer.len())
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            responses: heapless::Deque::new(),
            requests: 0,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Replace the data available to read right now.
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Queue a reply to be delivered after the next complete request.
    pub fn queue_response(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        let mut response = heapless::Vec::new();
        response
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        self.responses
            .push_back(response)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Everything written to this port so far.
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Number of `\r` terminated requests written so far.
    pub fn request_count(&self) -> usize {
        self.requests
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, ReadReady, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        let result = mock.write(b"Q1\r");
        assert_eq!(result.unwrap(), 3);
        assert_eq!(mock.written_data(), b"Q1\r");
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_queued_response_waits_for_request() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"(NAK\r").unwrap();
        assert!(!mock.read_ready().unwrap());

        // Partial request releases nothing.
        mock.write(b"Q1").unwrap();
        assert!(!mock.read_ready().unwrap());

        mock.write(b"\r").unwrap();
        assert!(mock.read_ready().unwrap());
        let mut buffer = [0u8; 8];
        let count = mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"(NAK\r");
        assert!(!mock.read_ready().unwrap());
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Long response data").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Long ");
        assert!(mock.read_ready().unwrap());
    }

    #[test]
    fn test_read_would_block_when_empty() {
        let mut mock = MockSerial::new();
        let mut buffer = [0u8; 10];
        assert!(matches!(mock.read(&mut buffer), Err(MockSerialError::WouldBlock)));
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = [0u8; CAPACITY + 1];
        assert!(matches!(mock.write(&large_data), Err(MockSerialError::BufferOverflow)));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        assert_eq!(mock.written_data().len(), 0);

        mock.set_read_data(b"data").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        let err = mock.read(&mut buffer).unwrap_err();
        assert!(matches!(err.kind(), embedded_io::ErrorKind::NotConnected));

        mock.set_read_error(false);
        assert!(mock.read(&mut buffer).is_ok());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(MockSerialError::Disconnected.to_string(), "device disconnected");
        let err: &dyn core::error::Error = &MockSerialError::BufferOverflow;
        assert_eq!(err.to_string(), "mock buffer overflow");
        assert!(matches!(
            MockSerialError::WouldBlock.kind(),
            embedded_io::ErrorKind::Other
        ));
    }

    #[test]
    fn test_clear_written_data() {
        let mut mock = MockSerial::new();
        mock.write(b"test data").unwrap();
        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }
}
