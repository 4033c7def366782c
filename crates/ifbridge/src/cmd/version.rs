use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    os: &'static str,
    arch: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
    features: Vec<&'static str>,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = VersionOutput {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("IFBRIDGE_BUILD_TARGET").unwrap_or("unknown"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        features: active_features(),
    };

    if format == OutputFormat::Json && args.extended {
        print_json(&info);
        return Ok(SUCCESS);
    }

    println!("{} {}", info.name, info.version);
    if args.extended {
        println!("target: {}", info.target);
        println!("os: {}", info.os);
        println!("arch: {}", info.arch);
        println!("rustc: {}", info.rustc);
        println!("git_hash: {}", info.git_hash);
        println!("features: {}", info.features.join(", "));
    }
    Ok(SUCCESS)
}

fn active_features() -> Vec<&'static str> {
    let mut features = vec!["cli"];
    if cfg!(feature = "async") {
        features.push("async");
    }
    features
}
