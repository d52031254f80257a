use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in Echo and Arith services.
    Serve(ServeArgs),
    /// Invoke one method on a server and print the reply.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(default_value = "127.0.0.1:4700", env = "MUXRPC_ADDR")]
    pub addr: String,
    /// Time a new connection has to send its options (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
    /// Maximum request payload size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Server address.
    pub addr: String,
    /// Method to invoke, as Service.Method.
    pub service_method: String,
    /// JSON arguments.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// String argument, sent as a JSON string.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read JSON arguments from a file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Limit for connecting and for the call itself (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
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

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
