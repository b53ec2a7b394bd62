use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use serde::Serialize;

use devcart::channel::{connect_tcp, open_device};
use devcart::cli::{Cli, Command};
use devcart::{logging, Channel, Listener, SessionConfig, TransferDriver, TransferStats};

/// Machine-readable outcome printed with `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    operation: &'static str,
    file: &'a Path,
    address: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kib_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Report<'a> {
    fn new(command: &'a Command, outcome: &anyhow::Result<TransferStats>) -> Option<Self> {
        let (operation, file, address) = match command {
            Command::Download { file, address, .. } => ("download", file, *address),
            Command::Upload { file, address, .. } => ("upload", file, *address),
            Command::Execute { file, address, .. } => ("execute", file, *address),
            Command::Serve { .. } => return None,
        };
        let stats = outcome.as_ref().ok();
        Some(Self {
            operation,
            file,
            address,
            ok: stats.is_some(),
            bytes: stats.map(|s| s.bytes),
            seconds: stats.map(|s| s.elapsed.as_secs_f64()),
            kib_per_sec: stats.and_then(TransferStats::rate_kib_per_sec),
            error: outcome.as_ref().err().map(|err| format!("{err:#}")),
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("cannot install logger: {err}");
    }

    if let Err(err) = ctrlc::set_handler(|| {
        eprintln!("\ninterrupted");
        std::process::exit(1);
    }) {
        log::warn!("cannot install Ctrl-C handler: {err}");
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the requested transfer failed but was reported.
fn run(cli: &Cli) -> Result<bool> {
    let config = cli.session_config().context("loading session settings")?;

    if let Some(addr) = &config.tcp {
        let channel = connect_tcp(addr.as_str(), config.timeout())
            .with_context(|| format!("connecting to {addr}"))?;
        session(cli, &config, channel)
    } else if let Some(device) = &config.device {
        let channel =
            open_device(device).with_context(|| format!("opening {}", device.display()))?;
        session(cli, &config, channel)
    } else {
        bail!("no cartridge link given; use --device, --tcp or a config file");
    }
}

fn session<C: Channel>(cli: &Cli, config: &SessionConfig, channel: C) -> Result<bool> {
    let mut driver = TransferDriver::with_config(channel, config.transfer.clone());

    let outcome: Option<Result<TransferStats>> = match &cli.command {
        Command::Download {
            file,
            address,
            size,
            ..
        } => {
            info!("downloading {size} bytes at {address:#010x} to {}", file.display());
            Some(driver.download(file, *address, *size).map_err(Into::into))
        }
        Command::Upload { file, address, .. } => {
            info!("uploading {} to {address:#010x}", file.display());
            Some(driver.upload(file, *address).map_err(Into::into))
        }
        Command::Execute { file, address, .. } => {
            info!("executing {} at {address:#010x}", file.display());
            Some(driver.execute(file, *address).map_err(Into::into))
        }
        Command::Serve { .. } => None,
    };

    if let Some(outcome) = &outcome {
        if cli.json {
            if let Some(report) = Report::new(&cli.command, outcome) {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        if let Err(err) = outcome {
            error!("{err:#}");
            return Ok(false);
        }
    }

    if cli.command.serve_directory().is_none() {
        return Ok(true);
    }
    let Some(root) = &config.root else {
        bail!("no directory to serve");
    };
    let mut listener = Listener::new(driver, root.clone(), Box::new(io::stdout()));
    let summary = listener.run().context("listener session")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(true)
}
