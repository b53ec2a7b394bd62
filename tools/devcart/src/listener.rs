//! File server and debug console.
//!
//! Once started, the host stops issuing commands and serves the cartridge:
//! files it asks for are uploaded from a root directory and its print output
//! is echoed to the console, until it sends QUIT.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::{error, info, warn};
use serde::Serialize;

use crate::channel::Channel;
use crate::driver::{TransferDriver, TransferError};
use crate::parser::{CommandStreamParser, StreamEvent};

/// What happened during a listening session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerSummary {
    /// File requests answered with a successful upload.
    pub served: u32,
    /// File requests whose upload failed.
    pub failed: u32,
    /// Unsupported commands and file requests that were refused unseen.
    pub rejected: u32,
}

pub struct Listener<C> {
    driver: TransferDriver<C>,
    parser: CommandStreamParser,
    root: PathBuf,
    console: Box<dyn Write>,
    summary: ListenerSummary,
}

impl<C: Channel> Listener<C> {
    pub fn new(driver: TransferDriver<C>, root: impl Into<PathBuf>, console: Box<dyn Write>) -> Self {
        let parser = CommandStreamParser::new(driver.config().max_filename);
        Self {
            driver,
            parser,
            root: root.into(),
            console,
            summary: ListenerSummary::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn into_driver(self) -> TransferDriver<C> {
        self.driver
    }

    /// Serves the cartridge until it sends QUIT.
    ///
    /// A failed upload is reported and the session goes on; a channel error
    /// or a transfer that leaves the stream out of sync ends it.
    pub fn run(&mut self) -> Result<ListenerSummary, TransferError> {
        info!("started server in {}", self.root.display());
        let mut buf = vec![0u8; self.driver.config().listen_buffer];

        while !self.parser.is_finished() {
            let n = self.driver.channel_mut().read(&mut buf)?;
            if n == 0 {
                continue;
            }
            for event in self.parser.push_bytes(&buf[..n]) {
                self.dispatch(event)?;
            }
        }

        info!(
            "session closed: {} served, {} failed, {} rejected",
            self.summary.served, self.summary.failed, self.summary.rejected
        );
        Ok(self.summary)
    }

    fn dispatch(&mut self, event: StreamEvent) -> Result<(), TransferError> {
        match event {
            StreamEvent::FileRequest(name) => {
                let Some(relative) = name_to_path(&name).filter(|p| is_plain_relative(p)) else {
                    warn!(
                        "refusing file request outside the served directory: {}",
                        String::from_utf8_lossy(&name)
                    );
                    self.summary.rejected += 1;
                    return Ok(());
                };
                let path = self.root.join(relative);
                info!("requested to upload {}", path.display());
                match self.driver.upload(&path, 0) {
                    Ok(_) => self.summary.served += 1,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        error!("error uploading file: {err}");
                        self.summary.failed += 1;
                    }
                }
            }
            StreamEvent::Text(text) => self.echo(&text),
            StreamEvent::PrintEnd => {}
            StreamEvent::Quit => info!("cartridge sent QUIT"),
            StreamEvent::Unsupported(tag) => {
                warn!("ignoring unsupported command tag {tag:#04x}");
                self.summary.rejected += 1;
            }
            StreamEvent::FilenameOverflow { limit } => {
                warn!("dropping file request: name longer than {limit} bytes");
                self.summary.rejected += 1;
            }
        }
        Ok(())
    }

    fn echo(&mut self, text: &[u8]) {
        let written = self.console.write_all(text);
        if let Err(err) = written.and_then(|()| self.console.flush()) {
            warn!("console output failed: {err}");
        }
    }
}

/// Requested names must stay below the served root.
fn is_plain_relative(name: &Path) -> bool {
    !name.as_os_str().is_empty()
        && name
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Filenames are raw bytes on the wire and stay raw on disk.
#[cfg(unix)]
fn name_to_path(name: &[u8]) -> Option<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    Some(PathBuf::from(OsStr::from_bytes(name)))
}

/// Without byte paths only UTF-8 names can be looked up.
#[cfg(not(unix))]
fn name_to_path(name: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(name).ok().map(PathBuf::from)
}
