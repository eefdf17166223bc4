use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use devsim_transport::{AddressFamily, DEFAULT_GATEWAY_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a gateway, announce a device and print inbound messages.
    Connect(ConnectArgs),
    /// Encode one message and write the frame to stdout.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Built-in device profiles.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DeviceProfile {
    Lighting,
    Heater,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Gateway address: socket path for unix, host name or IP for tcp.
    pub address: String,
    /// Address family (unix or tcp).
    #[arg(long, short = 'f', default_value = "tcp")]
    pub family: AddressFamily,
    /// TCP port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_GATEWAY_PORT)]
    pub port: u16,
    /// Built-in device profile to announce.
    #[arg(long, default_value = "lighting", conflicts_with = "device")]
    pub profile: DeviceProfile,
    /// Read the device descriptor from a JSON file.
    #[arg(long, value_name = "FILE")]
    pub device: Option<PathBuf>,
    /// Connect timeout (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub connect_timeout: String,
    /// How long a correlated request waits for its response.
    #[arg(long, default_value = "30s")]
    pub rpc_timeout: String,
    /// Exit after printing N inbound messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Resource the message is addressed to.
    #[arg(long, short = 'r', default_value = "device")]
    pub resource: String,
    /// Encode a response instead of a request.
    #[arg(long)]
    pub response: bool,
    /// Header as KEY=VALUE (repeatable).
    #[arg(long = "header", short = 'H', value_name = "KEY=VALUE")]
    pub headers: Vec<String>,
    /// JSON body (validated and tagged with a content-type header).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
