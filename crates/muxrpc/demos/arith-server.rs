//! Arithmetic server. Serves `Arith.Sum` and `Arith.Mul` until interrupted.
//!
//! Run with:
//!   cargo run --example arith-server
//!
//! In another terminal:
//!   cargo run --example arith-client

use muxrpc::transport::TcpTransport;
use muxrpc::{Server, Service, ServiceRegistry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4700".to_string());

    let registry = ServiceRegistry::new().with_service(
        Service::new("Arith")
            .method("Sum", |(a, b): (i64, i64)| Ok(a + b))
            .method("Mul", |(a, b): (i64, i64)| {
                a.checked_mul(b).ok_or_else(|| "integer overflow".to_string())
            }),
    )?;

    let listener = TcpTransport::bind(addr.as_str())?;
    eprintln!("Listening on {}", listener.local_addr());

    Server::new(registry).accept(&listener)?;
    Ok(())
}
