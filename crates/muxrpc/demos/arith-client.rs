//! Fires a batch of concurrent calls at the arithmetic server over a single
//! connection and prints the replies as they complete.
//!
//! Run `arith-server` first, then:
//!   cargo run --example arith-client

use muxrpc::rpc::channel::bounded;
use muxrpc::{dial, Call, CodecType, Options};

const BATCH: usize = 8;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4700".to_string());

    let client = dial(addr.as_str(), Some(Options::with_codec(CodecType::Bincode)))?;
    eprintln!("Connected with codec {}", client.codec_type());

    // One shared completion channel for the whole batch.
    let (done, completed) = bounded::<Call<i64>>(BATCH);
    for i in 0..BATCH as i64 {
        let method = if i % 2 == 0 { "Arith.Sum" } else { "Arith.Mul" };
        client.go_with_done(method, &(i, i + 1), done.clone());
    }

    for call in completed.iter().take(BATCH) {
        match call.result {
            Ok(value) => println!("seq={} {} = {value}", call.seq, call.service_method),
            Err(err) => println!("seq={} {} failed: {err}", call.seq, call.service_method),
        }
    }

    client.close()?;
    Ok(())
}
