use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of one `call` invocation.
#[derive(Serialize, Debug)]
pub struct CallOutput<'a> {
    pub service_method: &'a str,
    pub seq: u64,
    pub codec: &'a str,
    pub elapsed_ms: f64,
    pub reply: &'a Value,
}

/// Announced once by `serve` after binding, so scripts can learn the port.
#[derive(Serialize, Debug)]
pub struct ListeningOutput<'a> {
    pub event: &'static str,
    pub addr: SocketAddr,
    pub transport: &'a str,
    pub services: Vec<String>,
}

pub fn print_reply(out: &CallOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json(out)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "SEQ", "CODEC", "ELAPSED", "REPLY"])
                .add_row(vec![
                    out.service_method.to_string(),
                    out.seq.to_string(),
                    out.codec.to_string(),
                    format!("{:.2}ms", out.elapsed_ms),
                    out.reply.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} seq={} ({:.2}ms)\n{}",
                out.service_method,
                out.seq,
                out.elapsed_ms,
                serde_json::to_string_pretty(out.reply).unwrap_or_else(|_| out.reply.to_string())
            );
        }
        OutputFormat::Raw => println!("{}", out.reply),
    }
}

pub fn print_listening(out: &ListeningOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json(out)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "TRANSPORT", "SERVICES"])
                .add_row(vec![
                    out.addr.to_string(),
                    out.transport.to_string(),
                    out.services.join(", "),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("listening on {} ({})", out.addr, out.transport);
            for service in &out.services {
                println!("  {service}");
            }
        }
        OutputFormat::Raw => println!("{}", out.addr),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Milliseconds with two decimals.
pub fn millis(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn call_output_serializes_reply_inline() {
        let reply = serde_json::json!({"sum": 5});
        let out = CallOutput {
            service_method: "Arith.Sum",
            seq: 1,
            codec: "application/json",
            elapsed_ms: 0.5,
            reply: &reply,
        };
        let json: Value = serde_json::from_str(&to_json(&out)).expect("valid json");
        assert_eq!(json["reply"]["sum"], 5);
        assert_eq!(json["seq"], 1);
    }

    #[test]
    fn millis_rounds_to_hundredths() {
        assert_eq!(millis(Duration::from_micros(1234)), 1.23);
    }
}
