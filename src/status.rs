//! Decoded UPS replies.

use modular_bitfield::prelude::*;

/// Longest info line we keep, in bytes.
pub const MAX_INFO_LENGTH: usize = 48;

/// The eight status bits at the end of a `Q1` reply.
///
/// On the wire they are sent most significant first: `b7` (utility fail) is the
/// first character, `b0` (beeper on) is the last.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    /// b0
    pub beeper_on: bool,
    /// b1
    pub shutdown_active: bool,
    /// b2
    pub test_in_progress: bool,
    /// b3: UPS type is line-interactive / standby rather than on-line.
    pub standby_type: bool,
    /// b4
    pub ups_failed: bool,
    /// b5: Bypass or boost active.
    pub bypass_active: bool,
    /// b6
    pub battery_low: bool,
    /// b7
    pub utility_fail: bool,
}

impl StatusFlags {
    /// Parse the `b7b6b5b4b3b2b1b0` status field. Each character must be `0` or `1`.
    pub fn from_bit_str(bits: &str) -> Option<Self> {
        if bits.len() != 8 {
            return None;
        }
        let mut byte = 0u8;
        for c in bits.bytes() {
            byte <<= 1;
            match c {
                b'1' => byte |= 1,
                b'0' => {}
                _ => return None,
            }
        }
        Some(Self::from_bytes([byte]))
    }
}

/// Reply to the `Q1` status inquiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusRecord {
    /// Input (grid) voltage in volts.
    pub grid_voltage: f32,
    /// Input fault voltage in volts.
    pub grid_fault_voltage: f32,
    /// Output voltage in volts.
    pub output_voltage: f32,
    /// Output load as a percentage of the rated load. May exceed 100 when overloaded.
    pub load_percent: u16,
    /// Input frequency in hertz.
    pub grid_frequency: f32,
    /// Battery voltage in volts. Some units report per-cell voltage here.
    pub battery_voltage: f32,
    /// Internal temperature in degrees Celsius. `None` if the UPS reports `--.-`.
    pub temperature: Option<f32>,
    pub flags: StatusFlags,
}

/// Reply to the `F` rating inquiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingsRecord {
    /// Rated output voltage in volts.
    pub voltage: f32,
    /// Rated output current in amps.
    pub current: u16,
    /// Rated battery voltage in volts.
    pub battery_voltage: f32,
    /// Rated frequency in hertz.
    pub frequency: f32,
}

/// Reply to the `I` information inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsInfo {
    /// The whole line as reported, without the leading `#` and trailing whitespace.
    pub text: heapless::String<MAX_INFO_LENGTH>,
    pub company: heapless::String<16>,
    pub model: heapless::String<16>,
    pub version: heapless::String<16>,
}

/// Valid ranges for decoded values. Anything outside is treated as a malformed frame.
pub(crate) mod limits {
    use core::ops::RangeInclusive;

    pub const VOLTAGE: RangeInclusive<f32> = 0.0..=999.9;
    pub const LOAD_PERCENT: RangeInclusive<u16> = 0..=999;
    pub const FREQUENCY: RangeInclusive<f32> = 0.0..=99.9;
    pub const BATTERY_VOLTAGE: RangeInclusive<f32> = 0.0..=999.9;
    pub const TEMPERATURE: RangeInclusive<f32> = -99.9..=999.9;
    pub const CURRENT: RangeInclusive<u16> = 0..=999;
}
