//! Command-line interface of the `devcart` binary.

use std::num::ParseIntError;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "devcart",
    author,
    version,
    about = "USB development cartridge transfer utility",
    after_help = "Addresses and sizes are decimal or hexadecimal with a 0x prefix."
)]
pub struct Cli {
    /// Character device of the cartridge link
    #[arg(long, env = "DEVCART_DEVICE", value_name = "PATH", global = true)]
    pub device: Option<PathBuf>,

    /// Reach the cartridge through a TCP bridge instead of a device
    #[arg(
        long,
        env = "DEVCART_TCP",
        value_name = "HOST:PORT",
        global = true,
        conflicts_with = "device"
    )]
    pub tcp: Option<String>,

    /// Read timeout in milliseconds (TCP bridge only)
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Give up after this many consecutive empty reads or writes
    #[arg(long, value_name = "COUNT", global = true)]
    pub retries: Option<u32>,

    /// JSON file with session settings
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Print a JSON transfer report on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// More diagnostics (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download cartridge memory into a file
    Download {
        file: PathBuf,
        #[arg(value_parser = parse_number)]
        address: u32,
        #[arg(value_parser = parse_number)]
        size: u32,
        #[command(flatten)]
        then: ServeAfter,
    },
    /// Upload a file into cartridge memory
    Upload {
        file: PathBuf,
        #[arg(value_parser = parse_number)]
        address: u32,
        #[command(flatten)]
        then: ServeAfter,
    },
    /// Upload a program and jump to it
    Execute {
        file: PathBuf,
        #[arg(value_parser = parse_number)]
        address: u32,
        #[command(flatten)]
        then: ServeAfter,
    },
    /// Serve files and echo console output until the cartridge quits
    Serve { directory: PathBuf },
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct ServeAfter {
    /// Start the file server on DIRECTORY once the transfer is done
    #[arg(short = 's', long = "serve", value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,
}

impl Command {
    /// Directory to serve after this command, if any.
    pub fn serve_directory(&self) -> Option<&PathBuf> {
        match self {
            Self::Download { then, .. } | Self::Upload { then, .. } | Self::Execute { then, .. } => {
                then.directory.as_ref()
            }
            Self::Serve { directory } => Some(directory),
        }
    }
}

impl Cli {
    /// Settings from `--config` (or defaults) with command-line overrides
    /// applied on top.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        if let Some(device) = &self.device {
            config.device = Some(device.clone());
            config.tcp = None;
        }
        if let Some(tcp) = &self.tcp {
            config.tcp = Some(tcp.clone());
            config.device = None;
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout_ms = timeout;
        }
        if self.retries.is_some() {
            config.transfer.idle_retry_limit = self.retries;
        }
        if let Some(directory) = self.command.serve_directory() {
            config.root = Some(directory.clone());
        }
        Ok(config)
    }
}

/// Parses a decimal number, or a hexadecimal one prefixed with `0x`/`0X`.
pub fn parse_number(arg: &str) -> Result<u32, ParseIntError> {
    let arg = arg.trim();
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    }
}
