use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use devlink_peer::{ChunkedTransfer, Received, TransferConfig};
use devlink_transport::{SerialAddress, SerialTransport, TcpTransport, Transport};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod read;
pub mod scan;
pub mod simulate;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read metadata and data from a device.
    Read(ReadArgs),
    /// Write metadata and data to a device.
    Write(WriteArgs),
    /// Find devices listening on a port in a /24 subnet.
    Scan(ScanArgs),
    /// Run a simulated device over TCP.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Read(args) => read::run(args, format),
        Command::Write(args) => write::run(args, format),
        Command::Scan(args) => scan::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Device TCP address (host:port).
    #[arg(
        long,
        env = "DEVLINK_ADDRESS",
        conflicts_with = "serial",
        required_unless_present = "serial"
    )]
    pub address: Option<String>,
    /// Serial port to use instead of TCP (e.g. /dev/ttyUSB0).
    #[arg(long, value_name = "PORT")]
    pub serial: Option<String>,
    /// Serial line speed.
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Per-transaction timeout (e.g. 2s, 500ms).
    #[arg(long, env = "DEVLINK_TIMEOUT", default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Write received data to this file.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
    /// Write received metadata to this file.
    #[arg(long, value_name = "FILE")]
    pub meta_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Data to send; only whole 128-byte chunks are transmitted.
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,
    /// Read metadata (at most 128 bytes) from file.
    #[arg(long, value_name = "FILE", conflicts_with = "meta_hex")]
    pub meta: Option<PathBuf>,
    /// Metadata as hex digits.
    #[arg(long, value_name = "HEX", conflicts_with = "meta")]
    pub meta_hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Any address in the /24 subnet to probe.
    #[arg(long, value_name = "IP")]
    pub subnet: Ipv4Addr,
    /// Port devices listen on.
    #[arg(long)]
    pub port: u16,
    /// Connect timeout per host (e.g. 30ms).
    #[arg(long, default_value = "30ms")]
    pub timeout: String,
    /// Number of probing threads.
    #[arg(long, default_value_t = 32)]
    pub workers: usize,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:9000")]
    pub bind: String,
    /// Number of data chunks the device serves.
    #[arg(long, default_value_t = 4)]
    pub chunks: u16,
    /// Byte value the data chunks are filled with (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0xA5", value_parser = parse_byte)]
    pub fill: u8,
    /// Metadata text the device serves.
    #[arg(long, default_value = "devlink-simulator")]
    pub metadata: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// An opened device connection plus its transfer settings.
pub struct Link {
    kind: LinkKind,
    pub label: String,
    config: TransferConfig,
}

enum LinkKind {
    Tcp(TcpTransport),
    Serial(SerialTransport),
}

impl LinkArgs {
    pub fn open(&self) -> CliResult<Link> {
        let timeout = parse_duration(&self.timeout)?;

        let (kind, label) = match (&self.address, &self.serial) {
            (_, Some(port)) => {
                let address = SerialAddress::new(port.clone(), self.baud);
                let mut transport = SerialTransport::new();
                transport
                    .connect(&address, timeout)
                    .map_err(|err| transport_error("connect failed", err))?;
                (LinkKind::Serial(transport), address.to_string())
            }
            (Some(address), None) => {
                let target = parse_address(address)?;
                let mut transport = TcpTransport::new();
                transport
                    .connect(&target, timeout)
                    .map_err(|err| transport_error("connect failed", err))?;
                (LinkKind::Tcp(transport), address.clone())
            }
            (None, None) => {
                return Err(CliError::new(USAGE, "one of --address or --serial is required"))
            }
        };

        tracing::debug!(link = %label, ?timeout, "device link open");
        Ok(Link {
            kind,
            label,
            config: TransferConfig { timeout },
        })
    }
}

impl Link {
    pub fn recv(&mut self) -> devlink_peer::Result<Received> {
        let config = self.config.clone();
        match &mut self.kind {
            LinkKind::Tcp(transport) => {
                ChunkedTransfer::with_config(transport, config).recv(report_progress)
            }
            LinkKind::Serial(transport) => {
                ChunkedTransfer::with_config(transport, config).recv(report_progress)
            }
        }
    }

    pub fn send(&mut self, metadata: &[u8], payload: &[u8]) -> devlink_peer::Result<()> {
        let config = self.config.clone();
        match &mut self.kind {
            LinkKind::Tcp(transport) => ChunkedTransfer::with_config(transport, config).send(
                metadata,
                payload,
                report_progress,
            ),
            LinkKind::Serial(transport) => ChunkedTransfer::with_config(transport, config).send(
                metadata,
                payload,
                report_progress,
            ),
        }
    }
}

fn report_progress(percent: f32) {
    tracing::debug!(percent, "transfer progress");
}

/// Split `host:port`; the host may be a name or a bracketed IPv6 literal.
pub fn parse_address(input: &str) -> CliResult<(String, u16)> {
    let (host, port) = input
        .rsplit_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("address must be host:port: {input}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(CliError::new(USAGE, format!("address has no host: {input}")));
    }
    let port = port
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid port in address: {input}")))?;
    Ok((host.to_string(), port))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn parse_byte(input: &str) -> Result<u8, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("not a byte value: {input}"))
}
