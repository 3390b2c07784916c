//! Component configuration.
//!
//! A [`PowermustConfig`] is built once with [`PowermustConfigBuilder`], validated, and
//! never changed afterwards.

use log::info;
use strum::EnumCount;

use crate::{error::ConfigError, publisher::Field, Duration};

/// Poll cadence used when none is configured.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::secs(10);

/// How long to wait for a reply before giving up on a request.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::secs(5);

/// Megatec units talk at 2400 baud, 8 data bits, no parity, 1 stop bit.
pub const DEFAULT_BAUD_RATE: u32 = 2400;

pub const MAX_ID_LENGTH: usize = 32;

/// Upper bound on bound output channels: one per field.
pub const MAX_CHANNELS: usize = Field::COUNT;

pub type Id = heapless::String<MAX_ID_LENGTH>;

fn make_id(text: &str) -> Result<Id, ConfigError> {
    let mut id = Id::new();
    id.push_str(text).map_err(|_| ConfigError::IdTooLong)?;
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Serial line settings and the host UART they refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// ID of the UART bus declared elsewhere in the host configuration.
    pub uart_id: Id,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl TransportConfig {
    /// Settings for the given UART with the default 2400 8N1 line.
    pub fn new(uart_id: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            uart_id: make_id(uart_id)?,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        })
    }
}

/// Description of one output channel to create in the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub field: Field,
    /// Display name.
    pub name: Id,
    pub icon: Option<&'static str>,
}

impl ChannelSpec {
    pub fn new(field: Field, name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            field,
            name: make_id(name)?,
            icon: field.default_icon(),
        })
    }

    /// Override the default icon.
    pub fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }
}

/// Validated component configuration. Use [`PowermustConfigBuilder`] to create one.
#[derive(Debug, Clone, PartialEq)]
pub struct PowermustConfig {
    id: Id,
    transport: TransportConfig,
    update_interval: Duration,
    reply_timeout: Duration,
    channels: heapless::Vec<ChannelSpec, MAX_CHANNELS>,
}

impl PowermustConfig {
    pub fn builder(id: &str) -> PowermustConfigBuilder {
        PowermustConfigBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    /// Whether any rating channel is configured, which enables the `F` inquiry.
    pub fn wants_ratings(&self) -> bool {
        self.channels.iter().any(|c| c.field.is_rating())
    }

    /// Log the configuration, one line per setting.
    pub fn log(&self) {
        info!("Powermust '{}':", self.id);
        info!(
            "  UART: {} ({} baud, {}{}{})",
            self.transport.uart_id,
            self.transport.baud_rate,
            self.transport.data_bits,
            match self.transport.parity {
                Parity::None => 'N',
                Parity::Even => 'E',
                Parity::Odd => 'O',
            },
            self.transport.stop_bits
        );
        info!("  Update interval: {} ms", self.update_interval.to_millis());
        info!("  Reply timeout: {} ms", self.reply_timeout.to_millis());
        for channel in &self.channels {
            let field: &'static str = channel.field.into();
            info!("  {} '{}'", field, channel.name);
        }
    }
}

/// Builds and validates a [`PowermustConfig`].
///
/// Setters that take text record the first error, which [`Self::build`] returns.
#[derive(Debug, Clone)]
pub struct PowermustConfigBuilder {
    id: Result<Id, ConfigError>,
    transport: Option<TransportConfig>,
    update_interval: Duration,
    reply_timeout: Duration,
    channels: heapless::Vec<ChannelSpec, MAX_CHANNELS>,
    error: Option<ConfigError>,
}

impl PowermustConfigBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: make_id(id),
            transport: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            channels: heapless::Vec::new(),
            error: None,
        }
    }

    /// Use the given UART with default line settings.
    pub fn with_uart(mut self, uart_id: &str) -> Self {
        match TransportConfig::new(uart_id) {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => self.record(e),
        }
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the update interval from text such as `10s` or `500ms`. See [`parse_interval`].
    pub fn with_update_interval_str(mut self, interval: &str) -> Self {
        match parse_interval(interval) {
            Ok(interval) => self.update_interval = interval,
            Err(e) => self.record(e),
        }
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_channel(mut self, channel: ChannelSpec) -> Self {
        if self.channels.iter().any(|c| c.field == channel.field) {
            self.record(ConfigError::DuplicateChannel);
        } else if self.channels.push(channel).is_err() {
            self.record(ConfigError::TooManyChannels);
        }
        self
    }

    /// Publish the UPS information line as a text channel.
    pub fn with_ups_info(self, name: &str) -> Self {
        self.with_field(Field::UpsInfo, name)
    }

    /// Bind a field to a channel with the given display name.
    pub fn with_field(mut self, field: Field, name: &str) -> Self {
        match ChannelSpec::new(field, name) {
            Ok(channel) => self.with_channel(channel),
            Err(e) => {
                self.record(e);
                self
            }
        }
    }

    /// Validate and build.
    pub fn build(self) -> Result<PowermustConfig, ConfigError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let id = self.id?;
        if id.is_empty() {
            return Err(ConfigError::MissingId);
        }
        let transport = self.transport.ok_or(ConfigError::MissingTransport)?;
        if transport.uart_id.is_empty() {
            return Err(ConfigError::MissingTransport);
        }
        if self.update_interval.ticks() == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        // The timeout must be shorter than the interval so cycles can never overlap.
        if self.reply_timeout.ticks() == 0 || self.reply_timeout >= self.update_interval {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(PowermustConfig {
            id,
            transport,
            update_interval: self.update_interval,
            reply_timeout: self.reply_timeout,
            channels: self.channels,
        })
    }

    fn record(&mut self, error: ConfigError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Parse an interval such as `500ms`, `10s`, `1min` or `2h`.
///
/// The number must be a whole number and a unit is required.
pub fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or(ConfigError::InvalidDuration)?;
    let (number, unit) = text.split_at(split);
    let value: u32 = number.parse().map_err(|_| ConfigError::InvalidDuration)?;

    let multiplier: u32 = match unit.trim_start() {
        "ms" => 1,
        "s" | "sec" => 1_000,
        "min" => 60_000,
        "h" => 3_600_000,
        _ => return Err(ConfigError::InvalidDuration),
    };
    let millis = value
        .checked_mul(multiplier)
        .ok_or(ConfigError::InvalidDuration)?;
    Ok(Duration::millis(millis))
}
