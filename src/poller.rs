//! The polling component: a cooperative state machine driving one UPS.

use embedded_io::{Error as _, Read, ReadReady, Write};
use log::{debug, error, info, warn};
use strum::EnumCount;

use crate::{
    command::{PollingCommand, UpsCommand},
    config::PowermustConfig,
    error::{CommandError, ConfigError, ParseError, TransportError},
    protocol::{CommandOutcome, Dialect, Megatec, Request, MAX_FRAME_LENGTH},
    publisher::{OutputSink, Publisher},
    registry::{ComponentHandle, Registry},
    status::{RatingsRecord, StatusRecord, UpsInfo},
    transport::SerialTransport,
    Instant,
};

/// Control commands waiting to be sent.
pub const COMMAND_QUEUE_LENGTH: usize = 10;

/// Where the component is within a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Requesting,
    AwaitingReply,
    Decoding,
    Publishing,
    /// The serial port failed. Nothing happens until [`Powermust::reset`].
    Faulted,
}

/// What a timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A request was written.
    Started(Request),
    /// A cycle was already in flight; the tick was ignored.
    Dropped,
    /// The component is faulted, or writing the request faulted it.
    Faulted,
}

/// How a cycle ended. Returned from [`Powermust::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// A reply was decoded and published.
    Polled(PollingCommand),
    CommandCompleted(UpsCommand, CommandOutcome),
    /// No reply to a polling command. Retried on the next tick.
    Timeout(PollingCommand),
    /// A reply arrived but could not be decoded. Nothing was published.
    ParseFailed(PollingCommand, ParseError),
    /// The serial port failed; polling stopped.
    Faulted,
}

/// Driver for one Powermust UPS.
///
/// Create it with [`Self::new`], then call [`Self::run`] from the main loop. `run`
/// never blocks: it sends the `Q1` status inquiry every update interval and otherwise
/// collects reply bytes. Owners with their own timer can call [`Self::update`] on
/// each tick instead of relying on the built-in schedule.
///
/// Between ticks `run` also sends queued control commands and, once a status reply
/// has arrived, the static `F` and `I` inquiries. Those are answered once and only
/// asked again after [`Self::reset`].
///
/// `D` selects the wire dialect; `L` is the receive buffer size in bytes.
pub struct Powermust<S, O, D = Megatec, const L: usize = MAX_FRAME_LENGTH> {
    config: PowermustConfig,
    component: ComponentHandle,
    transport: SerialTransport<S, L>,
    dialect: D,
    publisher: Publisher<O>,
    state: PollerState,
    /// Request currently awaiting a reply.
    in_flight: Option<Request>,
    commands: heapless::Deque<UpsCommand, COMMAND_QUEUE_LENGTH>,
    polling_commands: heapless::Vec<PollingCommand, { PollingCommand::COUNT }>,
    /// Static inquiries not yet answered.
    inquiries: heapless::Vec<PollingCommand, { PollingCommand::COUNT }>,
    /// Set by a successful status poll, cleared when an inquiry fails.
    inquiries_open: bool,
    last_poll: Option<Instant>,
    status: Option<StatusRecord>,
    ratings: Option<RatingsRecord>,
    info: Option<UpsInfo>,
}

impl<S, O, D, const L: usize> Powermust<S, O, D, L>
where
    S: Read + Write + ReadReady,
    O: OutputSink,
    D: Dialect,
{
    /// Register with the host, bind every configured channel and take ownership of the port.
    pub fn new(
        config: PowermustConfig,
        mut registry: impl Registry,
        serial: S,
        sink: O,
        dialect: D,
    ) -> Result<Self, ConfigError> {
        let component = registry.register(config.id());
        registry.register_transport_binding(component, config.transport())?;

        let mut publisher = Publisher::new(sink);
        for channel in config.channels() {
            let handle = registry.register_output_channel(component, channel)?;
            publisher.bind(channel.field, handle)?;
        }

        let mut polling_commands = heapless::Vec::new();
        // Capacity is one slot per PollingCommand variant.
        let _ = polling_commands.push(PollingCommand::Q1);
        if config.wants_ratings() {
            let _ = polling_commands.push(PollingCommand::F);
        }
        let _ = polling_commands.push(PollingCommand::I);
        let inquiries = static_inquiries(&polling_commands);

        Ok(Self {
            transport: SerialTransport::new(serial, config.reply_timeout()),
            config,
            component,
            dialect,
            publisher,
            state: PollerState::Idle,
            in_flight: None,
            commands: heapless::Deque::new(),
            polling_commands,
            inquiries,
            inquiries_open: false,
            last_poll: None,
            status: None,
            ratings: None,
            info: None,
        })
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// `false` once faulted.
    pub fn is_available(&self) -> bool {
        self.state != PollerState::Faulted
    }

    pub fn component(&self) -> ComponentHandle {
        self.component
    }

    pub fn config(&self) -> &PowermustConfig {
        &self.config
    }

    /// Most recent successfully decoded status.
    pub fn last_status(&self) -> Option<&StatusRecord> {
        self.status.as_ref()
    }

    pub fn last_ratings(&self) -> Option<&RatingsRecord> {
        self.ratings.as_ref()
    }

    pub fn last_info(&self) -> Option<&UpsInfo> {
        self.info.as_ref()
    }

    pub fn sink(&self) -> &O {
        self.publisher.sink()
    }

    /// Polling commands in use: `Q1` every tick, then the static inquiries.
    pub fn polling_commands(&self) -> &[PollingCommand] {
        &self.polling_commands
    }

    /// Queue a control command. It is sent by [`Self::run`] ahead of the next poll.
    pub fn queue_command(&mut self, command: UpsCommand) -> Result<(), CommandError> {
        if self.state == PollerState::Faulted {
            return Err(CommandError::Faulted);
        }
        command.validate()?;
        match self.commands.push_back(command) {
            Ok(()) => {
                debug!("Command queued: {}", command.text());
                Ok(())
            }
            Err(_) => {
                warn!("Command queue full, dropping: {}", command.text());
                Err(CommandError::QueueFull)
            }
        }
    }

    /// Timer tick: send the `Q1` status inquiry now if idle, otherwise drop the tick.
    pub fn update(&mut self, now: Instant) -> TickOutcome {
        match self.state {
            PollerState::Faulted => TickOutcome::Faulted,
            PollerState::Idle => {
                self.last_poll = Some(now);
                self.begin(Request::Poll(PollingCommand::Q1), now)
            }
            _ => {
                debug!("Tick dropped, cycle still in flight");
                TickOutcome::Dropped
            }
        }
    }

    /// Advance the component. Call this often; it never blocks.
    ///
    /// Returns an event whenever a cycle finishes.
    pub fn run(&mut self, now: Instant) -> Option<CycleEvent> {
        match self.state {
            PollerState::Faulted => None,
            PollerState::Idle => {
                let outcome = if let Some(command) = self.commands.pop_front() {
                    self.begin(Request::Control(command), now)
                } else if self.is_due(now) {
                    self.update(now)
                } else if self.inquiries_open && !self.inquiries.is_empty() {
                    let inquiry = self.inquiries[0];
                    self.begin(Request::Poll(inquiry), now)
                } else {
                    return None;
                };
                match outcome {
                    TickOutcome::Faulted => Some(CycleEvent::Faulted),
                    _ => None,
                }
            }
            _ => match self.transport.receive(now) {
                Ok(None) => None,
                Ok(Some(frame)) => Some(self.handle_reply(&frame)),
                Err(TransportError::Timeout) => Some(self.handle_timeout()),
                Err(e) => Some(self.fault(e)),
            },
        }
    }

    /// Reinitialize after a fault: forget the request in flight and queued commands.
    pub fn reset(&mut self) {
        info!("Resetting '{}'", self.config.id());
        self.transport.cancel();
        self.commands.clear();
        self.in_flight = None;
        self.last_poll = None;
        self.inquiries = static_inquiries(&self.polling_commands);
        self.inquiries_open = false;
        self.state = PollerState::Idle;
    }

    /// Log the configuration and the polling commands in use.
    pub fn log_config(&self) {
        self.config.log();
        info!("  Used polling commands:");
        for command in &self.polling_commands {
            let name: &'static str = command.into();
            info!("    {}", name);
        }
        if self.state == PollerState::Faulted {
            warn!("  Component is faulted");
        }
    }

    /// Give back the serial port, e.g. to reopen it after a fault.
    pub fn release(self) -> S {
        self.transport.release()
    }

    #[cfg(test)]
    pub(crate) fn serial(&mut self) -> &mut S {
        self.transport.interface()
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed.to_millis() >= u64::from(self.config.update_interval().to_millis())),
        }
    }

    fn begin(&mut self, request: Request, now: Instant) -> TickOutcome {
        match self.start(request, now) {
            Ok(()) => TickOutcome::Started(request),
            Err(e) => {
                self.fault(e);
                TickOutcome::Faulted
            }
        }
    }

    /// Track which static inquiries are still owed after a poll ends.
    fn poll_finished(&mut self, command: PollingCommand, answered: bool) {
        match command {
            PollingCommand::Q1 => self.inquiries_open = answered,
            _ if answered => self.inquiries.retain(|c| *c != command),
            // Retried after the next good status reply.
            _ => self.inquiries_open = false,
        }
    }

    fn start(&mut self, request: Request, now: Instant) -> Result<(), TransportError<S::Error>> {
        self.state = PollerState::Requesting;
        let frame = self.dialect.encode_request(&request);
        debug!("Sending {}", request.text());
        self.transport.send(&frame, now)?;
        self.in_flight = Some(request);
        self.state = PollerState::AwaitingReply;
        Ok(())
    }

    fn handle_reply(&mut self, frame: &[u8]) -> CycleEvent {
        self.state = PollerState::Decoding;
        let event = match self.in_flight.take() {
            Some(Request::Poll(command)) => self.decode_and_publish(command, frame),
            Some(Request::Control(command)) => {
                let outcome = match self.dialect.decode_ack(frame) {
                    Ok(outcome) => outcome,
                    Err(e) => CommandOutcome::Unreadable(e),
                };
                match outcome {
                    CommandOutcome::Accepted => info!("Command successful: {}", command.text()),
                    CommandOutcome::Unreadable(e) => {
                        warn!("Could not decode reply to {}: {}", command.text(), e)
                    }
                    _ => error!("Command failed: NAK for {}", command.text()),
                }
                CycleEvent::CommandCompleted(command, outcome)
            }
            // Replies are only collected while a request is in flight.
            None => CycleEvent::Faulted,
        };
        self.state = PollerState::Idle;
        event
    }

    fn decode_and_publish(&mut self, command: PollingCommand, frame: &[u8]) -> CycleEvent {
        let dialect = &self.dialect;
        let raw = dialect
            .payload(frame)
            .ok()
            .and_then(|payload| core::str::from_utf8(payload).ok())
            .unwrap_or("");

        let result = match command {
            PollingCommand::Q1 => dialect.decode_status(frame).map(|status| {
                self.state = PollerState::Publishing;
                debug!(
                    "Q1: grid {}V, out {}V, load {}%, battery {}V",
                    status.grid_voltage, status.output_voltage, status.load_percent, status.battery_voltage
                );
                self.publisher.publish_status(&status, raw);
                self.status = Some(status);
            }),
            PollingCommand::F => dialect.decode_ratings(frame).map(|ratings| {
                self.state = PollerState::Publishing;
                debug!(
                    "F: {}V {}A, battery {}V, {}Hz",
                    ratings.voltage, ratings.current, ratings.battery_voltage, ratings.frequency
                );
                self.publisher.publish_ratings(&ratings, raw);
                self.ratings = Some(ratings);
            }),
            PollingCommand::I => dialect.decode_info(frame).map(|info| {
                self.state = PollerState::Publishing;
                debug!("UPS info: {}", info.text);
                self.publisher.publish_info(&info);
                self.info = Some(info);
            }),
        };

        self.poll_finished(command, result.is_ok());
        match result {
            Ok(()) => CycleEvent::Polled(command),
            Err(e) => {
                let name: &'static str = command.into();
                warn!("Could not decode reply to {}: {} ({:?})", name, e, raw);
                CycleEvent::ParseFailed(command, e)
            }
        }
    }

    fn handle_timeout(&mut self) -> CycleEvent {
        self.state = PollerState::Idle;
        match self.in_flight.take() {
            Some(Request::Control(command)) => {
                error!("Command failed: no response for {}", command.text());
                CycleEvent::CommandCompleted(command, CommandOutcome::NoResponse)
            }
            Some(Request::Poll(command)) => {
                self.poll_finished(command, false);
                let name: &'static str = command.into();
                warn!("Polling timeout: {}", name);
                CycleEvent::Timeout(command)
            }
            None => CycleEvent::Faulted,
        }
    }

    fn fault(&mut self, err: TransportError<S::Error>) -> CycleEvent {
        match err {
            TransportError::Io(e) => error!("Serial error, polling stopped: {:?}", e.kind()),
            TransportError::Timeout => error!("Polling stopped"),
        }
        self.transport.cancel();
        self.in_flight = None;
        self.state = PollerState::Faulted;
        CycleEvent::Faulted
    }
}

fn static_inquiries(
    polling_commands: &[PollingCommand],
) -> heapless::Vec<PollingCommand, { PollingCommand::COUNT }> {
    let mut inquiries = heapless::Vec::new();
    for &command in polling_commands.iter().filter(|c| **c != PollingCommand::Q1) {
        // Never more than the polling commands themselves.
        let _ = inquiries.push(command);
    }
    inquiries
}
