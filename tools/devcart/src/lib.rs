//! Host-side tooling for USB development cartridges.
//!
//! [`TransferDriver`] pushes programs and data into cartridge memory, reads
//! memory back and starts programs. [`Listener`] turns the host into a file
//! server and debug console for code running on the cartridge, decoding its
//! command stream with [`CommandStreamParser`]. Both talk to the hardware
//! through a [`Channel`], so any reliable ordered byte stream will do.

pub mod channel;
pub mod cli;
pub mod config;
mod driver;
mod listener;
pub mod logging;
mod parser;

pub use channel::{Channel, ChannelError, StreamChannel};
pub use config::{SessionConfig, TransferConfig};
pub use driver::{TransferDriver, TransferError, TransferStats};
pub use listener::{Listener, ListenerSummary};
pub use parser::{CommandStreamParser, StreamEvent};

#[cfg(test)]
mod tests;
