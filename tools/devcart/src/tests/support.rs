//! Channels and sinks used by the crate's tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::rc::Rc;

use cartproto::{trailer_byte, trailer_matches, Checksum, Command, FrameError, RequestHeader};

use crate::channel::{Channel, ChannelError};

/// Replays a fixed list of read chunks and records everything written.
///
/// An empty chunk reads as a timeout. A chunk larger than the caller's buffer
/// is handed out over several reads.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    max_offered: usize,
    fail_when_drained: bool,
}

impl ScriptedChannel {
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Accept at most `limit` bytes per write.
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    /// Fail reads with a transport error once the script runs out, instead of
    /// timing out forever.
    pub fn fail_when_drained(&mut self) {
        self.fail_when_drained = true;
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Largest buffer ever offered to `write`.
    pub fn max_offered(&self) -> usize {
        self.max_offered
    }

    /// Script bytes nobody has read yet.
    pub fn unread(&self) -> Vec<u8> {
        self.script.iter().flatten().copied().collect()
    }
}

impl Channel for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let Some(chunk) = self.script.pop_front() else {
            if self.fail_when_drained {
                return Err(ChannelError::new(
                    "read",
                    io::Error::new(io::ErrorKind::BrokenPipe, "cartridge unplugged"),
                ));
            }
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.script.push_front(chunk[n..].to_vec());
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        self.max_offered = self.max_offered.max(buf.len());
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Behaves like the cartridge firmware: stores uploads in a sparse memory
/// map, answers downloads from it and records execute requests.
#[derive(Debug)]
pub struct CartEmulator {
    memory: BTreeMap<u32, u8>,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    max_read: usize,
    max_write: usize,
    stutter: bool,
    idle_next: bool,
    corrupt_bit: Option<usize>,
    reject_uploads: bool,
    executed: Vec<u32>,
}

impl Default for CartEmulator {
    fn default() -> Self {
        Self {
            memory: BTreeMap::new(),
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            max_read: usize::MAX,
            max_write: usize::MAX,
            stutter: false,
            idle_next: false,
            corrupt_bit: None,
            reject_uploads: false,
            executed: Vec::new(),
        }
    }
}

impl CartEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out at most `max_read` bytes per read and accept at most
    /// `max_write` bytes per write.
    pub fn with_chunking(mut self, max_read: usize, max_write: usize) -> Self {
        self.max_read = max_read.max(1);
        self.max_write = max_write.max(1);
        self
    }

    /// Alternate every transfer with an empty one.
    pub fn stuttering(mut self) -> Self {
        self.stutter = true;
        self
    }

    /// Flip one payload bit in the next download, leaving the trailer as
    /// computed over the original data.
    pub fn corrupt_next_download(&mut self, bit: usize) {
        self.corrupt_bit = Some(bit);
    }

    pub fn reject_uploads(&mut self) {
        self.reject_uploads = true;
    }

    pub fn executed(&self) -> &[u32] {
        &self.executed
    }

    pub fn memory_at(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let at = address.wrapping_add(i as u32);
                self.memory.get(&at).copied().unwrap_or(0)
            })
            .collect()
    }

    fn idle(&mut self) -> bool {
        if !self.stutter {
            return false;
        }
        self.idle_next = !self.idle_next;
        !self.idle_next
    }

    fn process_inbound(&mut self) {
        loop {
            let (header, used) = match RequestHeader::decode(&self.inbound) {
                Ok(parsed) => parsed,
                Err(FrameError::Truncated { .. }) => return,
                Err(err) => panic!("cartridge received garbage: {err}"),
            };
            let size = header.size.unwrap_or(0) as usize;

            match header.command {
                Command::DownloadRequest => {
                    self.inbound.drain(..used);
                    let mut payload = self.memory_at(header.address, size);
                    let trailer = trailer_byte(Checksum::of(&payload));
                    if let Some(bit) = self.corrupt_bit.take() {
                        payload[bit / 8] ^= 1 << (bit % 8);
                    }
                    self.outbound.extend(payload);
                    self.outbound.push_back(trailer);
                }
                Command::UploadRequest => {
                    if self.inbound.len() < used + size + 1 {
                        return;
                    }
                    let frame: Vec<u8> = self.inbound.drain(..used + size + 1).collect();
                    let payload = &frame[used..used + size];
                    let accepted = !self.reject_uploads
                        && trailer_matches(Checksum::of(payload), frame[used + size]);
                    if accepted {
                        for (i, &byte) in payload.iter().enumerate() {
                            self.memory.insert(header.address.wrapping_add(i as u32), byte);
                        }
                    }
                    self.outbound.push_back(if accepted { 0 } else { 1 });
                }
                Command::ExecuteRequest => {
                    self.inbound.drain(..used);
                    self.executed.push(header.address);
                }
                other => panic!("{other} is not a request"),
            }
        }
    }
}

impl Channel for CartEmulator {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        if self.idle() {
            return Ok(0);
        }
        let n = buf.len().min(self.max_read).min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        if self.idle() {
            return Ok(0);
        }
        let n = buf.len().min(self.max_write);
        self.inbound.extend_from_slice(&buf[..n]);
        self.process_inbound();
        Ok(n)
    }
}

/// Console sink whose contents stay readable after it has been boxed.
#[derive(Debug, Clone, Default)]
pub struct SharedConsole(Rc<RefCell<Vec<u8>>>);

impl SharedConsole {
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
