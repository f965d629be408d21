mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "devlink", version, about = "Embedded device link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
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
    use super::*;

    #[test]
    fn parses_read_subcommand() {
        let cli = Cli::try_parse_from([
            "devlink",
            "read",
            "--address",
            "10.0.0.7:9000",
            "--timeout",
            "500ms",
        ])
        .expect("read args should parse");

        assert!(matches!(cli.command, Command::Read(_)));
    }

    #[test]
    fn rejects_address_with_serial() {
        let err = Cli::try_parse_from([
            "devlink",
            "read",
            "--address",
            "10.0.0.7:9000",
            "--serial",
            "/dev/ttyUSB0",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_conflicting_metadata_args() {
        let err = Cli::try_parse_from([
            "devlink",
            "write",
            "--address",
            "10.0.0.7:9000",
            "--file",
            "image.bin",
            "--meta",
            "meta.bin",
            "--meta-hex",
            "0102",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_scan_subcommand() {
        let cli = Cli::try_parse_from([
            "devlink",
            "scan",
            "--subnet",
            "192.168.1.10",
            "--port",
            "9000",
        ])
        .expect("scan args should parse");
        assert!(matches!(cli.command, Command::Scan(_)));
    }

    #[test]
    fn parses_simulate_with_hex_fill() {
        let cli = Cli::try_parse_from(["devlink", "simulate", "--chunks", "3", "--fill", "0xA5"])
            .expect("simulate args should parse");
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.chunks, 3);
                assert_eq!(args.fill, 0xA5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
