//! This module defines the commands understood by Powermust UPS units.

use core::fmt::Write;

use strum_macros::{EnumCount as EnumCountMacro, EnumIter, IntoStaticStr};

use crate::error::CommandError;

/// Longest command text we ever send, excluding any framing.
pub const MAX_COMMAND_LENGTH: usize = 12;

pub type CommandText = heapless::String<MAX_COMMAND_LENGTH>;

/// Read-only queries issued by the poller, one per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro, IntoStaticStr)]
pub enum PollingCommand {
    /// __Q1__ - Status inquiry. Reply: `(MMM.M NNN.N PPP.P QQQ RR.R S.SS TT.T b7..b0`.
    Q1,
    /// __F__ - Rating information. Reply: `#MMM.M QQQ SS.SS RR.R`.
    F,
    /// __I__ - UPS information. Reply: `#Company_Name Model Version`.
    I,
}

impl PollingCommand {
    /// Command text as sent on the wire, without terminator or checksum.
    pub fn as_bytes(&self) -> &'static [u8] {
        let text: &'static str = self.into();
        text.as_bytes()
    }
}

/// Delay before a shutdown command takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDelay {
    /// Tenths of a minute, `2` - `9`. Sent as `S.5`.
    Tenths(u8),
    /// Whole minutes, `1` - `10`. Sent as `S03`.
    Minutes(u8),
}

impl ShutdownDelay {
    fn validate(&self) -> Result<(), CommandError> {
        match *self {
            ShutdownDelay::Tenths(2..=9) | ShutdownDelay::Minutes(1..=10) => Ok(()),
            _ => Err(CommandError::InvalidArgument),
        }
    }

    fn write_to(&self, out: &mut CommandText) -> core::fmt::Result {
        match *self {
            ShutdownDelay::Tenths(tenths) => write!(out, ".{}", tenths),
            ShutdownDelay::Minutes(minutes) => write!(out, "{:02}", minutes),
        }
    }
}

/// Control commands. The UPS answers these with an acknowledgement or `NAK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsCommand {
    /// __T__ - 10 second battery test.
    QuickTest,
    /// __TL__ - Test until battery low.
    DeepTest,
    /// __T<n>__ - Test for `n` minutes, `1` - `99`.
    TimedTest(u8),
    /// __CT__ - Cancel any running test.
    CancelTest,
    /// __Q__ - Toggle the beeper.
    ToggleBeeper,
    /// __S<n>__ - Shut the output down after a delay.
    Shutdown(ShutdownDelay),
    /// __S<n>R<m>__ - Shut down after a delay, restore after `m` minutes (`0` - `9999`).
    ShutdownRestore(ShutdownDelay, u16),
    /// __C__ - Cancel a pending shutdown.
    CancelShutdown,
}

impl UpsCommand {
    /// Check arguments are within the ranges the UPS accepts.
    pub fn validate(&self) -> Result<(), CommandError> {
        match *self {
            UpsCommand::TimedTest(1..=99) => Ok(()),
            UpsCommand::TimedTest(_) => Err(CommandError::InvalidArgument),
            UpsCommand::Shutdown(delay) => delay.validate(),
            UpsCommand::ShutdownRestore(delay, restore) => {
                delay.validate()?;
                if restore > 9999 {
                    return Err(CommandError::InvalidArgument);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Render the command text, e.g. `S02R0060`.
    pub fn text(&self) -> CommandText {
        let mut out = CommandText::new();
        // Every variant fits within MAX_COMMAND_LENGTH once validated.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut CommandText) -> core::fmt::Result {
        match *self {
            UpsCommand::QuickTest => out.write_str("T"),
            UpsCommand::DeepTest => out.write_str("TL"),
            UpsCommand::TimedTest(minutes) => write!(out, "T{:02}", minutes),
            UpsCommand::CancelTest => out.write_str("CT"),
            UpsCommand::ToggleBeeper => out.write_str("Q"),
            UpsCommand::Shutdown(delay) => {
                out.write_str("S")?;
                delay.write_to(out)
            }
            UpsCommand::ShutdownRestore(delay, restore) => {
                out.write_str("S")?;
                delay.write_to(out)?;
                write!(out, "R{:04}", restore)
            }
            UpsCommand::CancelShutdown => out.write_str("C"),
        }
    }
}

impl TryFrom<&str> for UpsCommand {
    type Error = CommandError;

    /// Parse a command as typed by a user, e.g. `T10` or `S.5R0002`.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let command = match value {
            "T" => UpsCommand::QuickTest,
            "TL" => UpsCommand::DeepTest,
            "CT" => UpsCommand::CancelTest,
            "Q" => UpsCommand::ToggleBeeper,
            "C" => UpsCommand::CancelShutdown,
            t if t.starts_with('T') => {
                UpsCommand::TimedTest(parse_number(&t[1..])?)
            }
            s if s.starts_with('S') => {
                let (delay, restore) = match s[1..].split_once('R') {
                    Some((delay, restore)) => (delay, Some(restore)),
                    None => (&s[1..], None),
                };
                let delay = parse_delay(delay)?;
                match restore {
                    Some(restore) => {
                        UpsCommand::ShutdownRestore(delay, parse_number(restore)?)
                    }
                    None => UpsCommand::Shutdown(delay),
                }
            }
            _ => return Err(CommandError::InvalidArgument),
        };
        command.validate()?;
        Ok(command)
    }
}

fn parse_delay(text: &str) -> Result<ShutdownDelay, CommandError> {
    match text.strip_prefix('.') {
        Some(tenths) => parse_number(tenths).map(ShutdownDelay::Tenths),
        None => parse_number(text).map(ShutdownDelay::Minutes),
    }
}

/// Plain decimal digits only: no sign, no whitespace.
fn parse_number<T: core::str::FromStr>(text: &str) -> Result<T, CommandError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::InvalidArgument);
    }
    text.parse().map_err(|_| CommandError::InvalidArgument)
}
