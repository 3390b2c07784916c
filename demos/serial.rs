use std::env;

use inquire::Select;
use log::{error, info};
use powermust_ups::{
    ChannelHandle, ChannelSpec, ComponentHandle, ConfigError, CycleEvent, Field, Instant, Megatec,
    OutputSink, Powermust, PowermustConfig, Registry, TransportConfig, UpsCommand, Value,
};
use serialport::SerialPort;
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 2400;
// Reads only happen once bytes are waiting, so this rarely applies.
const SERIAL_TIMEOUT_MS: u64 = 50;
const LOOP_DELAY_MS: u64 = 20;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::ReadReady for PortWrapper {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.0
            .bytes_to_read()
            .map(|count| count > 0)
            .map_err(|e| IoError(e.into()))
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

/// Stands in for the host: hands out handles and remembers channel names.
#[derive(Default)]
struct ConsoleHost {
    channels: Vec<String>,
}

impl Registry for ConsoleHost {
    fn register(&mut self, id: &str) -> ComponentHandle {
        info!("Registered component '{}'", id);
        ComponentHandle(0)
    }

    fn register_transport_binding(
        &mut self,
        _component: ComponentHandle,
        transport: &TransportConfig,
    ) -> Result<(), ConfigError> {
        if transport.baud_rate != BAUD_RATE {
            return Err(ConfigError::Rejected);
        }
        Ok(())
    }

    fn register_output_channel(
        &mut self,
        _component: ComponentHandle,
        channel: &ChannelSpec,
    ) -> Result<ChannelHandle, ConfigError> {
        self.channels.push(channel.name.to_string());
        Ok(ChannelHandle(self.channels.len() as u16 - 1))
    }
}

/// Prints every published value next to its channel name.
struct ConsoleSink {
    names: Vec<String>,
}

impl OutputSink for ConsoleSink {
    fn publish(&mut self, channel: ChannelHandle, value: Value<'_>) {
        let name = self
            .names
            .get(usize::from(channel.0))
            .map_or("?", String::as_str);
        match value {
            Value::Number(n) if n.is_nan() => println!("{:>28}: unknown", name),
            Value::Number(n) => println!("{:>28}: {}", name, n),
            Value::Flag(b) => println!("{:>28}: {}", name, if b { "ON" } else { "OFF" }),
            Value::Text(t) => println!("{:>28}: {}", name, t),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    // Optional control command to send once, e.g. `T` for a 10 second battery test
    let command = env::args().nth(2).map(|text| {
        UpsCommand::try_from(text.as_str()).expect("Unknown UPS command")
    });

    println!("Using port: {}", port_name);

    // Open serial port
    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let port = PortWrapper(port);

    // Bind every field to a channel named after it
    let mut builder = PowermustConfig::builder("powermust").with_uart("uart_0");
    for field in Field::iter() {
        builder = builder.with_field(field, field.into());
    }
    let config = builder.build().expect("Invalid configuration");

    // The host hands out channel handles in registration order
    let names = config.channels().iter().map(|c| c.name.to_string()).collect();
    let mut host = ConsoleHost::default();
    let mut ups: Powermust<PortWrapper, ConsoleSink> =
        Powermust::new(config, &mut host, port, ConsoleSink { names }, Megatec)
            .expect("Registration failed");
    ups.log_config();

    if let Some(command) = command {
        ups.queue_command(command).expect("Could not queue command");
    }

    let start = std::time::Instant::now();
    loop {
        let now = Instant::from_ticks(start.elapsed().as_millis() as u64);
        match ups.run(now) {
            Some(CycleEvent::Polled(command)) => {
                let name: &'static str = command.into();
                println!("--- {} ---", name);
            }
            Some(CycleEvent::CommandCompleted(command, outcome)) => {
                println!("Command {}: {:?}", command.text(), outcome);
            }
            Some(CycleEvent::Faulted) => {
                error!("Serial port failed, giving up");
                std::process::exit(1);
            }
            Some(event) => info!("{:?}", event),
            None => {}
        }
        std::thread::sleep(std::time::Duration::from_millis(LOOP_DELAY_MS));
    }
}
