use muxrpc_codec::CodecType;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    codecs: Vec<&'static str>,
    default_codec: &'static str,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            name: "muxrpc",
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("MUXRPC_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("MUXRPC_BUILD_PROFILE").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            codecs: CodecType::ALL.iter().map(|codec| codec.tag()).collect(),
            default_codec: CodecType::default().tag(),
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = VersionOutput::current();

    if let OutputFormat::Json = format {
        if args.extended {
            println!(
                "{}",
                serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
            );
        } else {
            println!("{{\"name\":\"muxrpc\",\"version\":\"{}\"}}", info.version);
        }
        return Ok(SUCCESS);
    }

    if !args.extended {
        println!("muxrpc {}", info.version);
        return Ok(SUCCESS);
    }

    println!("name: {}", info.name);
    println!("version: {}", info.version);
    println!("target: {}", info.target);
    println!("profile: {}", info.profile);
    println!("target_os: {}", info.target_os);
    println!("target_arch: {}", info.target_arch);
    println!("codecs: {}", info.codecs.join(", "));
    println!("default_codec: {}", info.default_codec);

    Ok(SUCCESS)
}
