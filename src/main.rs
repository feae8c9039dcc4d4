use std::fs;

use anyhow::Result;
use chatseize::adb::AdbExecutor;
use chatseize::cli::{Cli, Commands, ProbeCommand};
use chatseize::config::Config;
use chatseize::crypto;
use chatseize::error::AcquireError;
use chatseize::probe::{DeviceProbe, DeviceProfile};
use chatseize::session::{AcquisitionSession, SessionReport};
use clap::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("[>>>]  chatseize acquisition engine  [<<<]");
    println!("[>>>]   v{}                       [<<<]", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    match cli.command {
        Commands::Acquire(opts) => {
            let cfg = opts.to_config();
            match AcquisitionSession::new(cfg).run() {
                Ok(report) => {
                    print_session_summary(&report);
                    Ok(())
                }
                Err(err) => {
                    println!("[!]  {}", err.user_message());
                    Err(err.into())
                }
            }
        }
        Commands::Probe(opts) => run_probe(&opts),
        Commands::Decrypt(opts) => {
            for (what, path) in [("key material", &opts.key), ("container", &opts.container)] {
                if !path.exists() {
                    return Err(AcquireError::DependencyMissing {
                        what,
                        path: path.clone(),
                    }
                    .into());
                }
            }
            let out = opts.output_path();
            let summary = crypto::decrypt_file(&opts.key, &opts.container, &out)?;
            println!("[+]  Decrypted {} bytes -> {}", summary.plaintext_bytes, out.display());
            println!("[+]  SHA-256: {}", summary.plaintext_sha256);
            Ok(())
        }
    }
}

fn run_probe(opts: &ProbeCommand) -> Result<()> {
    let mut cfg = Config::default();
    if let Some(package) = &opts.package {
        cfg.package = package.clone();
    }
    if let Some(program) = &opts.adb_program {
        cfg.adb_program = program.clone();
    }

    let adb = AdbExecutor::from_config(&cfg);
    if !adb.device_ready() {
        return Err(AcquireError::DeviceNotDetected.into());
    }

    let profile = DeviceProbe::new(&adb, &cfg.package).snapshot();
    print_profile(&profile);

    if let Some(path) = &opts.json_out {
        fs::write(path, serde_json::to_string_pretty(&profile)?)?;
        println!("[>]  Profile written to {}", path.display());
    }
    Ok(())
}

fn print_profile(profile: &DeviceProfile) {
    println!("[*]  Manufacturer : {}", profile.manufacturer);
    println!("[*]  Model        : {} ({})", profile.model, profile.code_name);
    println!("[*]  Serial       : {}", profile.serial);
    println!("[*]  Android      : {} (SDK {})", profile.os_version, profile.sdk_level);
    println!("[*]  Patch level  : {}", profile.security_patch);
    println!("[*]  Kernel       : {}", profile.kernel);
    println!("[*]  Rooted       : {}", profile.rooted);
    println!("[*]  SIM state    : {} ({})", profile.sim_state, profile.operator);
    match profile.battery_level {
        Some(level) => println!("[*]  Battery      : {level}%"),
        None => println!("[*]  Battery      : unknown"),
    }
    println!("[*]  /data        : {}", profile.data_partition);
    println!("[*]  Target app   : {}", profile.target_app_version);
}

fn print_session_summary(report: &SessionReport) {
    println!();
    match report.method {
        Some(method) => {
            println!("[+]  Acquisition complete via {}", method.as_str());
            println!(
                "[+]  Messages: {} | Media files: {} | Keyword hits: {}",
                report.messages, report.media_files, report.keyword_hits
            );
            if let Some(hash) = &report.manifest_sha256 {
                println!("[+]  Manifest SHA-256: {hash}");
            }
            if let Some(db) = &report.decrypted_db {
                println!("[+]  Decrypted database: {}", db.display());
            }
        }
        None => println!("[!]  Acquisition failed: no vector succeeded"),
    }
    println!("[>]  Case folder: {}", report.base_dir.display());
}
