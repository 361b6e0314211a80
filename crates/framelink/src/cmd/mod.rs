use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use framelink_frame::{BufferPool, FrameConfig, DEFAULT_MAX_FRAME_SIZE};
use framelink_stream::{SaturationPolicy, StreamConfig};
use framelink_transport::Endpoint;

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod bench;
pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every request back to its caller.
    Serve(ServeArgs),
    /// Issue a single call and print the response.
    Call(CallArgs),
    /// Measure round-trip throughput against a server.
    Bench(BenchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Bench(args) => bench::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Framing and write-path settings shared by every connection-owning command.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Largest accepted frame payload in bytes.
    #[arg(long, env = "FRAMELINK_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
    /// Deadline for reading one frame (e.g. 8s, 500ms, or "off").
    #[arg(long, env = "FRAMELINK_READ_TIMEOUT", default_value = "8s")]
    pub read_timeout: String,
    /// Deadline for writing one frame (e.g. 8s, 500ms, or "off").
    #[arg(long, env = "FRAMELINK_WRITE_TIMEOUT", default_value = "8s")]
    pub write_timeout: String,
    /// Hand writes to a dedicated writer thread through a queue of N slots.
    #[arg(long, env = "FRAMELINK_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,
    /// Fail calls instead of blocking when the write queue is full.
    #[arg(long, env = "FRAMELINK_REJECT_WHEN_FULL", requires = "queue_capacity")]
    pub reject_when_full: bool,
}

impl StreamArgs {
    pub fn config(&self, pool: Arc<dyn BufferPool>) -> CliResult<StreamConfig> {
        if self.max_frame_size == 0 {
            return Err(CliError::new(USAGE, "--max-frame-size must be greater than zero"));
        }
        let frame = FrameConfig {
            max_frame_size: self.max_frame_size,
            read_timeout: parse_timeout(&self.read_timeout)?,
            write_timeout: parse_timeout(&self.write_timeout)?,
        };
        let mut config = StreamConfig::default().with_frame(frame).with_pool(pool);
        if let Some(capacity) = self.queue_capacity {
            let saturation = if self.reject_when_full {
                SaturationPolicy::Reject
            } else {
                SaturationPolicy::Block
            };
            config = config.with_write_queue(capacity, saturation);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to listen on (tcp://host:port, unix:///path, host:port, or a path).
    pub endpoint: String,
    /// Exit once N connections have completed.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["file", "hex"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Hex-encoded payload (e.g. 01ff).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Send a one-way request and do not wait for a response.
    #[arg(long)]
    pub one_way: bool,
    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Total number of two-way calls.
    #[arg(long, default_value_t = 10_000)]
    pub calls: usize,
    /// Number of calling threads sharing the connection.
    #[arg(long, default_value_t = 8)]
    pub threads: usize,
    /// Payload size in bytes.
    #[arg(long, default_value_t = 64)]
    pub size: usize,
    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

/// A duration, or `None` for "off"/"none".
pub(crate) fn parse_timeout(input: &str) -> CliResult<Option<Duration>> {
    match input.trim().to_ascii_lowercase().as_str() {
        "off" | "none" => Ok(None),
        _ => parse_duration(input).map(Some),
    }
}

pub(crate) fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let digits = digits
        .strip_prefix(b"0x")
        .or_else(|| digits.strip_prefix(b"0X"))
        .unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }

    digits
        .chunks_exact(2)
        .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(CliError::new(
                USAGE,
                format!("invalid hex digits: {}", String::from_utf8_lossy(pair)),
            )),
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|v| v as u8)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
