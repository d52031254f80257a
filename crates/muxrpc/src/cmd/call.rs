use std::fs;
use std::time::Instant;

use muxrpc_core::{dial_timeout, CodecType, Options};
use serde_json::Value;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{
    io_error, rpc_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{millis, print_reply, CallOutput, OutputFormat};

// Arguments and replies are arbitrary JSON values, which only a
// self-describing codec can carry.
const CLI_CODEC: CodecType = CodecType::Json;

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = resolve_params(&args)?;

    let client = dial_timeout(
        args.addr.as_str(),
        Some(Options::with_codec(CLI_CODEC)),
        timeout,
    )
    .map_err(|err| rpc_error("connect failed", err))?;

    let started = Instant::now();
    let pending = client.go::<Value, Value>(&args.service_method, &params);
    let call = crossbeam::select! {
        recv(pending.done()) -> call => call.map_err(|_| {
            CliError::new(FAILURE, "call failed: connection is shut down")
        })?,
        recv(crossbeam::channel::after(timeout)) -> _ => {
            return Err(CliError::new(
                TIMEOUT,
                format!("call failed: no reply to {} within {timeout:?}", args.service_method),
            ));
        }
    };
    let elapsed = started.elapsed();

    let seq = call.seq;
    let reply = call
        .into_result()
        .map_err(|err| rpc_error("call failed", err))?;
    tracing::debug!(seq, service_method = %args.service_method, "call completed");

    print_reply(
        &CallOutput {
            service_method: &args.service_method,
            seq,
            codec: CLI_CODEC.tag(),
            elapsed_ms: millis(elapsed),
            reply: &reply,
        },
        format,
    );

    let _ = client.close();
    Ok(SUCCESS)
}

fn resolve_params(args: &CallArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    if let Some(path) = &args.file {
        let raw = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return serde_json::from_slice(&raw).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Ok(Value::Null)
}
