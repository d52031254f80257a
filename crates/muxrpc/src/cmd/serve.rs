use std::thread;

use crossbeam::channel::{bounded, Sender};
use muxrpc_codec::DEFAULT_MAX_PAYLOAD;
use muxrpc_core::{RpcError, Server, ServerConfig, Service, ServiceRegistry};
use muxrpc_transport::TcpTransport;
use serde::Deserialize;
use serde_json::Value;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{rpc_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, ListeningOutput, OutputFormat};

#[derive(Debug, Deserialize)]
struct Operands {
    num1: i64,
    num2: i64,
}

/// `Echo.Echo` returns its argument; `Arith.Sum` and `Arith.Div` take
/// `{"num1": .., "num2": ..}`.
pub(crate) fn builtin_services() -> Result<ServiceRegistry, RpcError> {
    ServiceRegistry::new()
        .with_service(Service::new("Echo").method("Echo", |value: Value| Ok(value)))?
        .with_service(
            Service::new("Arith")
                .method("Sum", |ops: Operands| {
                    ops.num1
                        .checked_add(ops.num2)
                        .ok_or_else(|| "integer overflow".to_string())
                })
                .method("Div", |ops: Operands| {
                    if ops.num2 == 0 {
                        return Err("divide by zero".to_string());
                    }
                    Ok(ops.num1 / ops.num2)
                }),
        )
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let handshake_timeout = parse_duration(&args.handshake_timeout)?;
    let registry = builtin_services().map_err(|err| rpc_error("service setup failed", err))?;
    let services: Vec<String> = registry
        .service_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let listener = TcpTransport::bind(args.addr.as_str())
        .map_err(|err| transport_error("bind failed", &err))?;
    let server = Server::with_config(
        registry,
        ServerConfig {
            handshake_timeout,
            max_payload_size: args.max_payload.unwrap_or(DEFAULT_MAX_PAYLOAD),
            ..ServerConfig::default()
        },
    );

    print_listening(
        &ListeningOutput {
            event: "listening",
            addr: listener.local_addr(),
            transport: listener.transport_name(),
            services,
        },
        format,
    );

    let (stop_tx, stop_rx) = bounded(1);
    install_ctrlc_handler(stop_tx)?;

    let (done_tx, done_rx) = bounded(1);
    thread::Builder::new()
        .name("muxrpc-accept".to_string())
        .spawn(move || {
            let _ = done_tx.send(server.accept(&listener));
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start accept loop: {err}")))?;

    crossbeam::select! {
        recv(stop_rx) -> _ => {
            tracing::info!("interrupted, shutting down");
            Ok(SUCCESS)
        }
        recv(done_rx) -> result => match result {
            Ok(Err(err)) => Err(rpc_error("accept failed", err)),
            _ => Ok(SUCCESS),
        },
    }
}

fn install_ctrlc_handler(stop: Sender<()>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = stop.try_send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
