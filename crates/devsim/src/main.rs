mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "devsim", version, about = "Smart-device simulator for home gateways")]
struct Cli {
    /// Output format for printed messages.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "DEVSIM_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "DEVSIM_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use devsim_transport::AddressFamily;

    use super::*;

    #[test]
    fn parses_connect_unix() {
        let cli = Cli::try_parse_from(["devsim", "connect", "/tmp/gw.sock", "--family", "unix"])
            .expect("connect args should parse");

        match cli.command {
            Command::Connect(args) => {
                assert_eq!(args.family, AddressFamily::Unix);
                assert_eq!(args.address, "/tmp/gw.sock");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn connect_defaults_to_tcp_gateway_port() {
        let cli = Cli::try_parse_from(["devsim", "connect", "192.168.1.1"])
            .expect("connect args should parse");
        match cli.command {
            Command::Connect(args) => {
                assert_eq!(args.family, AddressFamily::Tcp);
                assert_eq!(args.port, 8080);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_family() {
        assert!(Cli::try_parse_from(["devsim", "connect", "x", "--family", "serial"]).is_err());
    }

    #[test]
    fn rejects_conflicting_body_args() {
        let err = Cli::try_parse_from([
            "devsim",
            "encode",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_profile_with_device_file() {
        let err = Cli::try_parse_from([
            "devsim",
            "connect",
            "gw",
            "--profile",
            "heater",
            "--device",
            "dev.json",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
