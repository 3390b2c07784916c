//! Publishing decoded values to output channels.

use strum_macros::{EnumCount as EnumCountMacro, EnumIter, IntoStaticStr};

use crate::{
    config::MAX_CHANNELS,
    error::ConfigError,
    registry::ChannelHandle,
    status::{RatingsRecord, StatusRecord, UpsInfo},
};

/// Every value this driver can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro, IntoStaticStr)]
pub enum Field {
    #[strum(serialize = "Grid Voltage")]
    GridVoltage,
    #[strum(serialize = "Grid Fault Voltage")]
    GridFaultVoltage,
    #[strum(serialize = "AC Output Voltage")]
    OutputVoltage,
    #[strum(serialize = "AC Output Load Percent")]
    OutputLoadPercent,
    #[strum(serialize = "Grid Frequency")]
    GridFrequency,
    #[strum(serialize = "Battery Voltage")]
    BatteryVoltage,
    #[strum(serialize = "Temperature")]
    Temperature,
    #[strum(serialize = "Utility Fail")]
    UtilityFail,
    #[strum(serialize = "Battery Low")]
    BatteryLow,
    #[strum(serialize = "Bypass Active")]
    BypassActive,
    #[strum(serialize = "UPS Failed")]
    UpsFailed,
    #[strum(serialize = "UPS Type Standby")]
    StandbyType,
    #[strum(serialize = "Test In Progress")]
    TestInProgress,
    #[strum(serialize = "Shutdown Active")]
    ShutdownActive,
    #[strum(serialize = "Beeper On")]
    BeeperOn,
    /// Raw text of the last status reply.
    #[strum(serialize = "Last Q1")]
    LastQ1,
    #[strum(serialize = "AC Output Rating Voltage")]
    RatingVoltage,
    #[strum(serialize = "AC Output Rating Current")]
    RatingCurrent,
    #[strum(serialize = "Battery Rating Voltage")]
    RatingBatteryVoltage,
    #[strum(serialize = "AC Output Rating Frequency")]
    RatingFrequency,
    /// Raw text of the last rating reply.
    #[strum(serialize = "Last F")]
    LastF,
    #[strum(serialize = "UPS Information")]
    UpsInfo,
}

impl Field {
    /// Fields filled from the `F` rating inquiry.
    pub fn is_rating(&self) -> bool {
        matches!(
            self,
            Field::RatingVoltage
                | Field::RatingCurrent
                | Field::RatingBatteryVoltage
                | Field::RatingFrequency
                | Field::LastF
        )
    }

    pub fn default_icon(&self) -> Option<&'static str> {
        match self {
            Field::UpsInfo => Some("mdi:information-outline"),
            _ => None,
        }
    }
}

/// A value on its way to a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Numeric sensor reading. `NaN` means unknown.
    Number(f32),
    Flag(bool),
    Text(&'a str),
}

/// Where published values go. Implemented by the host.
///
/// Writes are always accepted; delivery beyond this call is the host's concern.
pub trait OutputSink {
    fn publish(&mut self, channel: ChannelHandle, value: Value<'_>);
}

impl<T: OutputSink + ?Sized> OutputSink for &mut T {
    fn publish(&mut self, channel: ChannelHandle, value: Value<'_>) {
        (**self).publish(channel, value)
    }
}

/// Maps record fields onto the channels bound to them.
pub struct Publisher<O> {
    sink: O,
    bindings: heapless::Vec<(Field, ChannelHandle), MAX_CHANNELS>,
}

impl<O: OutputSink> Publisher<O> {
    pub fn new(sink: O) -> Self {
        Self {
            sink,
            bindings: heapless::Vec::new(),
        }
    }

    /// Route a field to a channel. Each field can be bound once.
    pub fn bind(&mut self, field: Field, channel: ChannelHandle) -> Result<(), ConfigError> {
        if self.is_bound(field) {
            return Err(ConfigError::DuplicateChannel);
        }
        self.bindings
            .push((field, channel))
            .map_err(|_| ConfigError::TooManyChannels)
    }

    pub fn is_bound(&self, field: Field) -> bool {
        self.channel(field).is_some()
    }

    pub fn channel(&self, field: Field) -> Option<ChannelHandle> {
        self.bindings
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, channel)| *channel)
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut O {
        &mut self.sink
    }

    /// Publish a `Q1` reply. `raw` is the reply line without its terminator.
    pub fn publish_status(&mut self, status: &StatusRecord, raw: &str) {
        self.emit(Field::GridVoltage, Value::Number(status.grid_voltage));
        self.emit(Field::GridFaultVoltage, Value::Number(status.grid_fault_voltage));
        self.emit(Field::OutputVoltage, Value::Number(status.output_voltage));
        self.emit(Field::OutputLoadPercent, Value::Number(f32::from(status.load_percent)));
        self.emit(Field::GridFrequency, Value::Number(status.grid_frequency));
        self.emit(Field::BatteryVoltage, Value::Number(status.battery_voltage));
        self.emit(
            Field::Temperature,
            Value::Number(status.temperature.unwrap_or(f32::NAN)),
        );

        let flags = status.flags;
        self.emit(Field::UtilityFail, Value::Flag(flags.utility_fail()));
        self.emit(Field::BatteryLow, Value::Flag(flags.battery_low()));
        self.emit(Field::BypassActive, Value::Flag(flags.bypass_active()));
        self.emit(Field::UpsFailed, Value::Flag(flags.ups_failed()));
        self.emit(Field::StandbyType, Value::Flag(flags.standby_type()));
        self.emit(Field::TestInProgress, Value::Flag(flags.test_in_progress()));
        self.emit(Field::ShutdownActive, Value::Flag(flags.shutdown_active()));
        self.emit(Field::BeeperOn, Value::Flag(flags.beeper_on()));

        self.emit(Field::LastQ1, Value::Text(raw));
    }

    /// Publish an `F` reply. `raw` is the reply line without its terminator.
    pub fn publish_ratings(&mut self, ratings: &RatingsRecord, raw: &str) {
        self.emit(Field::RatingVoltage, Value::Number(ratings.voltage));
        self.emit(Field::RatingCurrent, Value::Number(f32::from(ratings.current)));
        self.emit(Field::RatingBatteryVoltage, Value::Number(ratings.battery_voltage));
        self.emit(Field::RatingFrequency, Value::Number(ratings.frequency));
        self.emit(Field::LastF, Value::Text(raw));
    }

    pub fn publish_info(&mut self, info: &UpsInfo) {
        self.emit(Field::UpsInfo, Value::Text(&info.text));
    }

    fn emit(&mut self, field: Field, value: Value<'_>) {
        if let Some(channel) = self.channel(field) {
            self.sink.publish(channel, value);
        }
    }
}
