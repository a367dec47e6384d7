//! TV GO exporter
//! Writes the live channel lineup of a TV GO / Magio GO account as an M3U
//! playlist and an XMLTV guide.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::{self, BufRead, Write};
use std::process;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

mod api;
mod auth;
mod catalog;
mod cli;
mod config;
mod device;
mod epg;
mod error;
mod m3u;
mod models;
mod pipeline;
mod recovery;
mod stream;
#[cfg(test)]
mod test_utils;

use api::{ApiClient, UreqTransport};
use cli::Args;
use config::AppConfig;
use models::Device;
use pipeline::{ArtifactStatus, RunOutcome, RunReport};
use recovery::DevicePicker;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let code = match run(&args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };

    if args.wait {
        wait_for_enter();
    }
    process::exit(code);
}

/// `Ok(false)` when the run finished but produced nothing usable.
fn run(args: &Args) -> Result<bool> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let market = config.market()?;
    let device_file = config
        .device_id_file
        .clone()
        .unwrap_or_else(device::default_device_file);
    let device_id = device::load_or_create(&device_file)?;
    let options = config.run_options(device_id)?;

    let transport = UreqTransport::new(config.timeout());
    let client = ApiClient::new(transport, market).with_user_agent(&config.user_agent);
    let mut picker = ConsolePicker;

    let outcome = pipeline::run(&client, &options, &mut picker, Local::now())
        .context("export failed")?;

    match outcome {
        RunOutcome::LoginRejected(rejection) => {
            eprintln!("Login failed: {}", rejection);
            Ok(false)
        }
        RunOutcome::Finished(report) => {
            print_report(&report);
            Ok(matches!(report.playlist, ArtifactStatus::Written(_)))
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_report(report: &RunReport) {
    for (name, status) in [("Playlist", &report.playlist), ("Guide", &report.guide)] {
        match status {
            ArtifactStatus::Written(count) => println!("{}: {} entries", name, count),
            ArtifactStatus::Skipped => println!("{}: skipped", name),
            ArtifactStatus::Failed(reason) => println!("{}: failed ({})", name, reason),
        }
    }
    if report.unavailable_channels > 0 {
        info!(count = report.unavailable_channels, "channels outside the subscription");
    }
    if !report.failed_channels.is_empty() {
        println!("Skipped channels: {}", report.failed_channels.join(", "));
    }
}

fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

/// Asks on the terminal which registered device to remove.
struct ConsolePicker;

impl DevicePicker for ConsolePicker {
    fn pick(&mut self, devices: &[Device]) -> Option<String> {
        if devices.is_empty() {
            return None;
        }

        println!("Maximum number of devices reached. Registered devices:");
        for (index, device) in devices.iter().enumerate() {
            let marker = if device.is_current { " (this device)" } else { "" };
            println!("{:>3}  {:30} {}{}", index, device.name, device.id, marker);
        }
        print!("Number of the device to remove (empty to cancel): ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let index: usize = line.trim().parse().ok()?;
        devices.get(index).map(|d| d.id.clone())
    }
}
