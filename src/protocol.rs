//! Request encoding and reply decoding.
//!
//! Powermust units speak the Megatec ASCII protocol: a request is the command text
//! followed by a carriage return, and every reply is a single line terminated by a
//! carriage return. Status replies start with `(`, rating and information replies
//! with `#`. Some OEM variants (Voltronic) append a CRC-16/XMODEM to both directions.
//!
//! The framing is handled by a [`Dialect`]. The payload layouts are the same for
//! every dialect and are decoded by the provided methods on the trait.

use core::str::FromStr;

use crate::{
    command::{CommandText, PollingCommand, UpsCommand},
    error::ParseError,
    status::{limits, RatingsRecord, StatusFlags, StatusRecord, UpsInfo},
};

/// Largest frame we send or accept, in bytes.
pub const MAX_FRAME_LENGTH: usize = 128;

/// Line terminator used in both directions.
pub const TERMINATOR: u8 = b'\r';

pub type Frame = heapless::Vec<u8, MAX_FRAME_LENGTH>;

/// Anything we can send to the UPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Poll(PollingCommand),
    Control(UpsCommand),
}

impl Request {
    pub fn text(&self) -> CommandText {
        match self {
            Request::Poll(command) => {
                let name: &'static str = command.into();
                let mut text = CommandText::new();
                // Polling commands are at most two characters.
                let _ = text.push_str(name);
                text
            }
            Request::Control(command) => command.text(),
        }
    }
}

/// Result of a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The UPS replied with anything other than `NAK`.
    Accepted,
    /// The UPS replied `NAK`.
    Rejected,
    /// Nothing came back before the reply timeout.
    NoResponse,
    /// A reply arrived but its framing was invalid, so the UPS answer is unknown.
    Unreadable(ParseError),
}

/// Framing strategy for a particular family of UPS firmware.
pub trait Dialect {
    /// Build the request frame for the given command text.
    fn encode(&self, command: &[u8]) -> Frame;

    /// Validate the framing of a received line and return its payload, header byte included.
    fn payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ParseError>;

    /// Request frame for the `Q1` status inquiry.
    fn encode_status_request(&self) -> Frame {
        self.encode(PollingCommand::Q1.as_bytes())
    }

    fn encode_request(&self, request: &Request) -> Frame {
        self.encode(request.text().as_bytes())
    }

    /// Decode the reply to `Q1`.
    fn decode_status(&self, frame: &[u8]) -> Result<StatusRecord, ParseError> {
        let text = payload_text(self.payload(frame)?, b'(')?;
        let mut fields = text.split_ascii_whitespace();
        let mut next = || fields.next().ok_or(ParseError::Malformed);

        let grid_voltage = parse_in(next()?, limits::VOLTAGE)?;
        let grid_fault_voltage = parse_in(next()?, limits::VOLTAGE)?;
        let output_voltage = parse_in(next()?, limits::VOLTAGE)?;
        let load_percent = parse_in(next()?, limits::LOAD_PERCENT)?;
        let grid_frequency = parse_in(next()?, limits::FREQUENCY)?;
        let battery_voltage = parse_in(next()?, limits::BATTERY_VOLTAGE)?;
        let temperature = match next()? {
            "--.-" | "?.?" => None,
            t => Some(parse_in(t, limits::TEMPERATURE)?),
        };
        let flags = StatusFlags::from_bit_str(next()?).ok_or(ParseError::Malformed)?;
        if next().is_ok() {
            return Err(ParseError::Malformed);
        }

        Ok(StatusRecord {
            grid_voltage,
            grid_fault_voltage,
            output_voltage,
            load_percent,
            grid_frequency,
            battery_voltage,
            temperature,
            flags,
        })
    }

    /// Decode the reply to `F`.
    fn decode_ratings(&self, frame: &[u8]) -> Result<RatingsRecord, ParseError> {
        let text = payload_text(self.payload(frame)?, b'#')?;
        let mut fields = text.split_ascii_whitespace();
        let mut next = || fields.next().ok_or(ParseError::Malformed);

        let ratings = RatingsRecord {
            voltage: parse_in(next()?, limits::VOLTAGE)?,
            current: parse_in(next()?, limits::CURRENT)?,
            battery_voltage: parse_in(next()?, limits::BATTERY_VOLTAGE)?,
            frequency: parse_in(next()?, limits::FREQUENCY)?,
        };
        if next().is_ok() {
            return Err(ParseError::Malformed);
        }
        Ok(ratings)
    }

    /// Decode the reply to `I`.
    ///
    /// The standard layout is three fixed-width columns (15, 10 and 10 characters).
    /// Firmware that pads differently is split on whitespace instead.
    fn decode_info(&self, frame: &[u8]) -> Result<UpsInfo, ParseError> {
        let raw = payload_text(self.payload(frame)?, b'#')?;
        let text = raw.trim_end();
        if text.is_empty() {
            return Err(ParseError::Malformed);
        }

        let (company, model, version) = match (raw.get(0..15), raw.get(16..26), raw.get(27..)) {
            (Some(company), Some(model), Some(version)) if raw.len() >= 37 => {
                (company.trim(), model.trim(), version.trim())
            }
            _ => {
                let mut words = text.split_ascii_whitespace();
                (
                    words.next().unwrap_or(""),
                    words.next().unwrap_or(""),
                    words.next().unwrap_or(""),
                )
            }
        };

        Ok(UpsInfo {
            text: bounded(text)?,
            company: truncated(company),
            model: truncated(model),
            version: truncated(version),
        })
    }

    /// Classify the reply to a control command.
    fn decode_ack(&self, frame: &[u8]) -> Result<CommandOutcome, ParseError> {
        let payload = self.payload(frame)?;
        let payload = payload.strip_prefix(b"(").unwrap_or(payload);
        if payload.starts_with(b"NAK") {
            Ok(CommandOutcome::Rejected)
        } else {
            Ok(CommandOutcome::Accepted)
        }
    }
}

/// Plain Megatec framing: `<command>\r`, replies `<payload>\r`, no checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Megatec;

impl Dialect for Megatec {
    fn encode(&self, command: &[u8]) -> Frame {
        let mut frame = Frame::new();
        // Cannot overflow: commands are at most MAX_COMMAND_LENGTH bytes.
        let _ = frame.extend_from_slice(command);
        let _ = frame.push(TERMINATOR);
        frame
    }

    fn payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ParseError> {
        match frame.split_last() {
            Some((&TERMINATOR, payload)) if !payload.is_empty() => Ok(payload),
            _ => Err(ParseError::Malformed),
        }
    }
}

/// Voltronic framing: `<command><crc_hi><crc_lo>\r` in both directions.
///
/// The CRC is CRC-16/XMODEM over everything before it. CRC bytes that would collide
/// with `(`, `\r` or `\n` are incremented by one, as the UPS firmware does.
#[derive(Debug, Clone, Copy, Default)]
pub struct Voltronic;

impl Voltronic {
    pub fn checksum(data: &[u8]) -> [u8; 2] {
        let crc = crc16::State::<crc16::XMODEM>::calculate(data);
        crc.to_be_bytes().map(|b| match b {
            b'(' | b'\r' | b'\n' => b + 1,
            b => b,
        })
    }
}

impl Dialect for Voltronic {
    fn encode(&self, command: &[u8]) -> Frame {
        let mut frame = Frame::new();
        // Cannot overflow: commands are at most MAX_COMMAND_LENGTH bytes.
        let _ = frame.extend_from_slice(command);
        let _ = frame.extend_from_slice(&Self::checksum(command));
        let _ = frame.push(TERMINATOR);
        frame
    }

    fn payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ParseError> {
        let body = match frame.split_last() {
            Some((&TERMINATOR, body)) if body.len() > 2 => body,
            _ => return Err(ParseError::Malformed),
        };
        let (payload, crc) = body.split_at(body.len() - 2);
        if crc != Self::checksum(payload).as_slice() {
            return Err(ParseError::Malformed);
        }
        Ok(payload)
    }
}

/// Check the header byte, catch `(NAK` and convert to text without the header.
fn payload_text(payload: &[u8], header: u8) -> Result<&str, ParseError> {
    if payload.starts_with(b"(NAK") {
        return Err(ParseError::Rejected);
    }
    match payload.split_first() {
        Some((&first, rest)) if first == header => {
            core::str::from_utf8(rest).map_err(|_| ParseError::Malformed)
        }
        Some(_) => Err(ParseError::UnsupportedDialect),
        None => Err(ParseError::Malformed),
    }
}

fn parse_in<T>(field: &str, range: core::ops::RangeInclusive<T>) -> Result<T, ParseError>
where
    T: FromStr + PartialOrd,
{
    let value = field.parse::<T>().map_err(|_| ParseError::Malformed)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ParseError::Malformed)
    }
}

fn bounded<const N: usize>(text: &str) -> Result<heapless::String<N>, ParseError> {
    let mut out = heapless::String::new();
    out.push_str(text).map_err(|_| ParseError::Malformed)?;
    Ok(out)
}

/// Keep as many leading characters as fit.
fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q1_REPLY: &[u8] = b"(218.0 218.0 219.0 012 50.0 13.60 25.0 00001001\r";
    const F_REPLY: &[u8] = b"#220.0 003 12.00 50.0\r";
    const I_REPLY: &[u8] = b"#POWERMUST       1000 LCD   VER 1.00  \r";

    /// Re-frame a Megatec reply with a Voltronic checksum.
    fn voltronic_frame(megatec: &[u8]) -> Frame {
        let payload = &megatec[..megatec.len() - 1];
        let mut frame = Frame::new();
        frame.extend_from_slice(payload).unwrap();
        frame.extend_from_slice(&Voltronic::checksum(payload)).unwrap();
        frame.push(TERMINATOR).unwrap();
        frame
    }

    #[test]
    fn megatec_status_request() {
        assert_eq!(Megatec.encode_status_request().as_slice(), b"Q1\r");
        assert_eq!(
            Megatec.encode_request(&Request::Poll(PollingCommand::F)).as_slice(),
            b"F\r"
        );
        assert_eq!(
            Megatec
                .encode_request(&Request::Control(UpsCommand::TimedTest(10)))
                .as_slice(),
            b"T10\r"
        );
    }

    #[test]
    fn decode_status_fixture() {
        let status = Megatec.decode_status(Q1_REPLY).unwrap();
        assert_eq!(status.grid_voltage, 218.0);
        assert_eq!(status.grid_fault_voltage, 218.0);
        assert_eq!(status.output_voltage, 219.0);
        assert_eq!(status.load_percent, 12);
        assert_eq!(status.grid_frequency, 50.0);
        assert_eq!(status.battery_voltage, 13.60);
        assert_eq!(status.temperature, Some(25.0));
        assert!(status.flags.standby_type());
        assert!(status.flags.beeper_on());
        assert!(!status.flags.utility_fail());
        assert!(!status.flags.test_in_progress());
    }

    #[test]
    fn decode_status_is_repeatable() {
        let first = Megatec.decode_status(Q1_REPLY).unwrap();
        let second = Megatec.decode_status(Q1_REPLY).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decode_status_unknown_temperature() {
        let reply = b"(230.0 230.0 230.0 000 50.0 2.27 --.- 00000000\r";
        let status = Megatec.decode_status(reply).unwrap();
        assert_eq!(status.temperature, None);

        let reply = b"(230.0 230.0 230.0 000 50.0 2.27 ?.? 00000000\r";
        assert_eq!(Megatec.decode_status(reply).unwrap().temperature, None);
    }

    #[test]
    fn decode_status_malformed() {
        // Missing terminator.
        assert_eq!(
            Megatec.decode_status(&Q1_REPLY[..Q1_REPLY.len() - 1]),
            Err(ParseError::Malformed)
        );
        // Missing status bits.
        assert_eq!(
            Megatec.decode_status(b"(218.0 218.0 219.0 012 50.0 13.60 25.0\r"),
            Err(ParseError::Malformed)
        );
        // Extra field.
        assert_eq!(
            Megatec.decode_status(b"(218.0 218.0 219.0 012 50.0 13.60 25.0 00001001 1\r"),
            Err(ParseError::Malformed)
        );
        // Not a number.
        assert_eq!(
            Megatec.decode_status(b"(218.0 218.0 abc 012 50.0 13.60 25.0 00001001\r"),
            Err(ParseError::Malformed)
        );
        // Out of range frequency.
        assert_eq!(
            Megatec.decode_status(b"(218.0 218.0 219.0 012 150.0 13.60 25.0 00001001\r"),
            Err(ParseError::Malformed)
        );
        assert_eq!(Megatec.decode_status(b"\r"), Err(ParseError::Malformed));
    }

    #[test]
    fn decode_status_header_and_nak() {
        assert_eq!(
            Megatec.decode_status(b"#218.0 218.0 219.0 012 50.0 13.60 25.0 00001001\r"),
            Err(ParseError::UnsupportedDialect)
        );
        assert_eq!(Megatec.decode_status(b"(NAK\r"), Err(ParseError::Rejected));
    }

    #[test]
    fn decode_ratings_fixture() {
        let ratings = Megatec.decode_ratings(F_REPLY).unwrap();
        assert_eq!(ratings.voltage, 220.0);
        assert_eq!(ratings.current, 3);
        assert_eq!(ratings.battery_voltage, 12.0);
        assert_eq!(ratings.frequency, 50.0);

        assert_eq!(Megatec.decode_ratings(b"#220.0 003\r"), Err(ParseError::Malformed));
    }

    #[test]
    fn decode_info_fixed_width() {
        let info = Megatec.decode_info(I_REPLY).unwrap();
        assert_eq!(info.company.as_str(), "POWERMUST");
        assert_eq!(info.model.as_str(), "1000 LCD");
        assert_eq!(info.version.as_str(), "VER 1.00");
        assert_eq!(info.text.as_str(), "POWERMUST       1000 LCD   VER 1.00");
    }

    #[test]
    fn decode_info_free_form() {
        let info = Megatec.decode_info(b"#MUSTEK PM1000 V2\r").unwrap();
        assert_eq!(info.company.as_str(), "MUSTEK");
        assert_eq!(info.model.as_str(), "PM1000");
        assert_eq!(info.version.as_str(), "V2");
        assert_eq!(Megatec.decode_info(b"#   \r"), Err(ParseError::Malformed));
    }

    #[test]
    fn decode_info_long_words_are_truncated() {
        let info = Megatec.decode_info(b"#AVeryLongCompanyNameInc 1000\r").unwrap();
        assert_eq!(info.text.as_str(), "AVeryLongCompanyNameInc 1000");
        assert_eq!(info.company.as_str(), "AVeryLongCompany");
        assert_eq!(info.model.as_str(), "1000");
        assert_eq!(info.version.as_str(), "");
    }

    #[test]
    fn decode_ack_replies() {
        assert_eq!(Megatec.decode_ack(b"ACK\r"), Ok(CommandOutcome::Accepted));
        assert_eq!(Megatec.decode_ack(b"(ACK\r"), Ok(CommandOutcome::Accepted));
        assert_eq!(Megatec.decode_ack(b"NAK\r"), Ok(CommandOutcome::Rejected));
        assert_eq!(Megatec.decode_ack(b"(NAK\r"), Ok(CommandOutcome::Rejected));
    }

    #[test]
    fn voltronic_round_trip_fixture() {
        let request = Voltronic.encode_status_request();
        assert_eq!(&request[..2], b"Q1");
        assert_eq!(request.len(), 5);
        assert_eq!(request[4], TERMINATOR);
        assert_eq!(&request[2..4], &Voltronic::checksum(b"Q1")[..]);

        let frame = voltronic_frame(Q1_REPLY);
        let status = Voltronic.decode_status(&frame).unwrap();
        assert_eq!(status, Megatec.decode_status(Q1_REPLY).unwrap());
    }

    #[test]
    fn voltronic_corrupted_checksum() {
        let mut frame = voltronic_frame(Q1_REPLY);
        let crc_index = frame.len() - 2;
        frame[crc_index] ^= 0x01;
        assert_eq!(Voltronic.decode_status(&frame), Err(ParseError::Malformed));
    }

    #[test]
    fn voltronic_checksum_avoids_reserved_bytes() {
        // Every input must produce a checksum free of framing bytes.
        for byte in 0..=u8::MAX {
            let crc = Voltronic::checksum(&[byte, b'Q']);
            for b in crc {
                assert!(b != b'(' && b != b'\r' && b != b'\n');
            }
        }
    }
}
