//! Host side of the transfer protocol.
//!
//! Each operation runs to completion before the next one starts: request
//! header, payload in one direction, checksum trailer, and for uploads a
//! status byte coming back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cartproto::{trailer_byte, trailer_matches, Checksum, RequestHeader, STATUS_OK};
use log::{debug, info};
use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::config::TransferConfig;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("checksum error (computed {computed:#04x}, received {received:#04x})")]
    ChecksumMismatch { computed: u8, received: u8 },
    #[error("cartridge rejected the upload (status {status:#04x})")]
    RemoteRejected { status: u8 },
    #[error("cannot {action} '{}': {source}", .path.display())]
    FileAccess {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot allocate {size} bytes for the transfer")]
    Allocation { size: u32 },
    #[error("{size} bytes do not fit the 32-bit size field")]
    TooLarge { size: u64 },
    #[error("gave up waiting for {waiting_for} after {attempts} empty transfers")]
    Timeout {
        waiting_for: &'static str,
        attempts: u32,
    },
}

impl TransferError {
    /// Errors after which the byte stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Channel(_) | Self::Timeout { .. })
    }
}

/// Timing of one completed transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub bytes: u32,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Throughput in KiB/s, `None` when the transfer took no measurable time.
    pub fn rate_kib_per_sec(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| f64::from(self.bytes) / 1024.0 / secs)
    }

    fn report(&self) {
        info!("transfer time {:.6} s", self.elapsed.as_secs_f64());
        match self.rate_kib_per_sec() {
            Some(rate) => info!("transfer speed {rate:.2} KiB/s"),
            None => info!("transfer speed n/a"),
        }
    }
}

/// Drives DOWNLOAD, UPLOAD and EXECUTE operations over a [`Channel`].
#[derive(Debug)]
pub struct TransferDriver<C> {
    channel: C,
    config: TransferConfig,
}

impl<C: Channel> TransferDriver<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, TransferConfig::default())
    }

    pub fn with_config(channel: C, config: TransferConfig) -> Self {
        Self { channel, config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Reads `size` bytes of cartridge memory at `address` into `path`.
    ///
    /// The file is created only once the payload checksum has been verified.
    pub fn download(
        &mut self,
        path: &Path,
        address: u32,
        size: u32,
    ) -> Result<TransferStats, TransferError> {
        let (data, stats) = self.download_bytes(address, size)?;
        fs::write(path, &data).map_err(|source| TransferError::FileAccess {
            action: "create",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(stats)
    }

    pub fn download_bytes(
        &mut self,
        address: u32,
        size: u32,
    ) -> Result<(Vec<u8>, TransferStats), TransferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size as usize)
            .map_err(|_| TransferError::Allocation { size })?;
        data.resize(size as usize, 0);

        let started = Instant::now();
        let header = RequestHeader::download(address, size);
        debug!("-> {} address={address:#010x} size={size}", header.command);
        self.send_all(&header.encode(), "download request")?;

        self.recv_exact(&mut data, "download payload")?;
        let received = self.recv_byte("download checksum")?;
        let stats = TransferStats {
            bytes: size,
            elapsed: started.elapsed(),
        };
        stats.report();

        let computed = Checksum::of(&data);
        if !trailer_matches(computed, received) {
            return Err(TransferError::ChecksumMismatch {
                computed: trailer_byte(computed),
                received,
            });
        }
        Ok((data, stats))
    }

    /// Stores the contents of `path` in cartridge memory at `address`.
    ///
    /// The file is read completely before any byte goes over the channel.
    pub fn upload(&mut self, path: &Path, address: u32) -> Result<TransferStats, TransferError> {
        let data = fs::read(path).map_err(|source| TransferError::FileAccess {
            action: "open",
            path: path.to_path_buf(),
            source,
        })?;
        self.upload_bytes(&data, address)
    }

    pub fn upload_bytes(&mut self, data: &[u8], address: u32) -> Result<TransferStats, TransferError> {
        let size = u32::try_from(data.len()).map_err(|_| TransferError::TooLarge {
            size: data.len() as u64,
        })?;
        let checksum = Checksum::of(data);

        let started = Instant::now();
        let header = RequestHeader::upload(address, size);
        debug!("-> {} address={address:#010x} size={size}", header.command);
        self.send_all(&header.encode(), "upload request")?;
        self.send_all(data, "upload payload")?;
        self.send_all(&[trailer_byte(checksum)], "upload checksum")?;

        let status = self.recv_byte("upload status")?;
        if status != STATUS_OK {
            return Err(TransferError::RemoteRejected { status });
        }

        let stats = TransferStats {
            bytes: size,
            elapsed: started.elapsed(),
        };
        stats.report();
        Ok(stats)
    }

    /// Uploads `path` to `address` and then tells the cartridge to jump there.
    /// Nothing is executed when the upload fails.
    pub fn execute(&mut self, path: &Path, address: u32) -> Result<TransferStats, TransferError> {
        let stats = self.upload(path, address)?;
        let header = RequestHeader::execute(address);
        debug!("-> {} address={address:#010x}", header.command);
        self.send_all(&header.encode(), "execute request")?;
        Ok(stats)
    }

    fn send_all(&mut self, bytes: &[u8], what: &'static str) -> Result<(), TransferError> {
        let mut sent = 0;
        let mut idle = 0;
        while sent < bytes.len() {
            let end = bytes.len().min(sent + self.config.write_chunk);
            let n = self.channel.write(&bytes[sent..end])?;
            if n == 0 {
                self.wait_idle(&mut idle, what)?;
            } else {
                idle = 0;
                sent += n;
            }
        }
        Ok(())
    }

    fn recv_exact(&mut self, buf: &mut [u8], what: &'static str) -> Result<(), TransferError> {
        let mut received = 0;
        let mut idle = 0;
        while received < buf.len() {
            let end = buf.len().min(received + self.config.read_chunk);
            let n = self.channel.read(&mut buf[received..end])?;
            if n == 0 {
                self.wait_idle(&mut idle, what)?;
            } else {
                idle = 0;
                received += n;
            }
        }
        Ok(())
    }

    fn recv_byte(&mut self, what: &'static str) -> Result<u8, TransferError> {
        let mut byte = [0u8; 1];
        self.recv_exact(&mut byte, what)?;
        Ok(byte[0])
    }

    /// Accounts for one empty transfer, failing once the configured limit is
    /// reached.
    fn wait_idle(&self, idle: &mut u32, waiting_for: &'static str) -> Result<(), TransferError> {
        *idle += 1;
        match self.config.idle_retry_limit {
            Some(limit) if *idle >= limit => Err(TransferError::Timeout {
                waiting_for,
                attempts: *idle,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ScriptedChannel;

    fn driver(channel: ScriptedChannel) -> TransferDriver<ScriptedChannel> {
        TransferDriver::with_config(
            channel,
            TransferConfig::builder().idle_retry_limit(Some(64)).build(),
        )
    }

    #[test]
    fn download_request_frame_layout() {
        let payload = [0xAAu8; 0x100];
        let mut reply = payload.to_vec();
        reply.push(trailer_byte(Checksum::of(&payload)));

        let mut driver = driver(ScriptedChannel::new(vec![reply]));
        let (data, stats) = driver.download_bytes(0x0010_1000, 0x100).unwrap();

        assert_eq!(data, payload);
        assert_eq!(stats.bytes, 0x100);
        assert_eq!(
            driver.channel_mut().written(),
            &[1, 0x00, 0x10, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn download_survives_short_and_empty_reads() {
        let payload: Vec<u8> = (0..50u8).collect();
        let trailer = trailer_byte(Checksum::of(&payload));
        let script = vec![
            vec![],
            payload[..3].to_vec(),
            vec![],
            vec![],
            payload[3..49].to_vec(),
            payload[49..].to_vec(),
            vec![],
            vec![trailer],
        ];

        let mut driver = driver(ScriptedChannel::new(script));
        let (data, _) = driver.download_bytes(0, 50).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn download_reads_never_exceed_remaining() {
        let payload = vec![0x11u8; 10];
        let mut reply = payload.clone();
        // The trailer arrives together with the payload in a single chunk.
        reply.push(trailer_byte(Checksum::of(&payload)));
        reply.extend_from_slice(b"next");

        let mut driver = driver(ScriptedChannel::new(vec![reply]));
        let (data, _) = driver.download_bytes(0, 10).unwrap();
        assert_eq!(data, payload);
        assert_eq!(driver.channel_mut().unread(), b"next");
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let payload = vec![0x5Au8; 64];
        let trailer = trailer_byte(Checksum::of(&payload));
        let mut corrupted = payload.clone();
        corrupted[17] ^= 0x04;
        corrupted.push(trailer);

        let mut driver = driver(ScriptedChannel::new(vec![corrupted]));
        let err = driver.download_bytes(0x0600_0000, 64).unwrap_err();
        assert!(matches!(
            err,
            TransferError::ChecksumMismatch { received, .. } if received == trailer
        ));
    }

    #[test]
    fn download_does_not_create_file_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dump.bin");
        let mut reply = vec![1u8, 2, 3];
        reply.push(trailer_byte(Checksum::of(&[1, 2, 3])) ^ 0xFF);

        let mut driver = driver(ScriptedChannel::new(vec![reply]));
        assert!(driver.download(&dest, 0, 3).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn verified_download_into_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("dump.bin");
        let mut reply = vec![1u8, 2, 3];
        reply.push(trailer_byte(Checksum::of(&[1, 2, 3])));

        let mut driver = driver(ScriptedChannel::new(vec![reply]));
        let err = driver.download(&dest, 0, 3).unwrap_err();

        assert!(matches!(
            err,
            TransferError::FileAccess { action: "create", ref path, .. } if *path == dest
        ));
        assert!(!err.is_fatal());
        assert!(!dest.exists());
        assert!(driver.channel_mut().unread().is_empty());
    }

    #[test]
    fn upload_splits_payload_by_write_chunk() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut channel = ScriptedChannel::new(vec![vec![STATUS_OK]]);
        channel.set_write_limit(Some(7));

        let mut driver = TransferDriver::with_config(
            channel,
            TransferConfig::builder().write_chunk(32).build(),
        );
        driver.upload_bytes(&data, 0x0600_4000).unwrap();

        let written = driver.channel_mut().written().to_vec();
        assert_eq!(&written[..9], &[2, 0x06, 0x00, 0x40, 0x00, 0, 0, 1, 0]);
        assert_eq!(&written[9..9 + 256], &data[..]);
        assert_eq!(written[265], trailer_byte(Checksum::of(&data)));
        assert_eq!(written.len(), 266);
        assert!(driver.channel_mut().max_offered() <= 32);
    }

    #[test]
    fn nonzero_status_is_remote_rejection() {
        let mut driver = driver(ScriptedChannel::new(vec![vec![], vec![0x01]]));
        let err = driver.upload_bytes(b"payload", 0).unwrap_err();
        assert!(matches!(err, TransferError::RemoteRejected { status: 1 }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_source_fails_before_any_io() {
        let mut driver = driver(ScriptedChannel::new(vec![]));
        let err = driver
            .upload(Path::new("/nonexistent/devcart/game.bin"), 0)
            .unwrap_err();
        assert!(matches!(err, TransferError::FileAccess { action: "open", .. }));
        assert!(driver.channel_mut().written().is_empty());
    }

    #[test]
    fn execute_skips_jump_after_failed_upload() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("prog.bin");
        fs::write(&src, [9u8; 12]).unwrap();

        let mut driver = driver(ScriptedChannel::new(vec![vec![0xFF]]));
        assert!(driver.execute(&src, 0x0600_4000).is_err());
        let written = driver.channel_mut().written();
        assert_eq!(written.len(), 9 + 12 + 1);
        assert_eq!(written[0], 2);
    }

    #[test]
    fn execute_sends_jump_after_upload() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("prog.bin");
        fs::write(&src, [9u8; 12]).unwrap();

        let mut driver = driver(ScriptedChannel::new(vec![vec![STATUS_OK]]));
        driver.execute(&src, 0x0600_4000).unwrap();
        let written = driver.channel_mut().written();
        assert_eq!(&written[written.len() - 5..], &[3, 0x06, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn idle_limit_turns_silence_into_timeout() {
        let mut driver = TransferDriver::with_config(
            ScriptedChannel::new(vec![]),
            TransferConfig::builder().idle_retry_limit(Some(5)).build(),
        );
        let err = driver.download_bytes(0, 4).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Timeout {
                waiting_for: "download payload",
                attempts: 5
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn channel_failure_aborts() {
        let mut channel = ScriptedChannel::new(vec![]);
        channel.fail_when_drained();
        let mut driver = driver(channel);
        let err = driver.download_bytes(0, 4).unwrap_err();
        assert!(matches!(err, TransferError::Channel(_)));
    }

    #[test]
    fn rate_needs_elapsed_time() {
        let stats = TransferStats {
            bytes: 2048,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(stats.rate_kib_per_sec(), Some(1.0));
        let instant = TransferStats {
            bytes: 2048,
            elapsed: Duration::ZERO,
        };
        assert_eq!(instant.rate_kib_per_sec(), None);
    }
}
