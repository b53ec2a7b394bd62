//! Request headers and the small text frames a cartridge sends to a listener.

use thiserror::Error;

use crate::Command;

/// Width of the address field.
pub const ADDRESS_LEN: usize = 4;
/// Width of the size field.
pub const SIZE_LEN: usize = 4;
/// Status byte acknowledging a successful upload.
pub const STATUS_OK: u8 = 0x00;

/// Errors produced while decoding request headers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command tag {0:#04x}")]
    UnknownCommand(u8),
    #[error("{0} does not start a transfer request")]
    NotARequest(Command),
    #[error("header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Fixed header of a DOWNLOAD, UPLOAD or EXECUTE request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub command: Command,
    pub address: u32,
    /// Present for DOWNLOAD and UPLOAD, absent for EXECUTE.
    pub size: Option<u32>,
}

impl RequestHeader {
    pub fn download(address: u32, size: u32) -> Self {
        Self {
            command: Command::DownloadRequest,
            address,
            size: Some(size),
        }
    }

    pub fn upload(address: u32, size: u32) -> Self {
        Self {
            command: Command::UploadRequest,
            address,
            size: Some(size),
        }
    }

    pub fn execute(address: u32) -> Self {
        Self {
            command: Command::ExecuteRequest,
            address,
            size: None,
        }
    }

    /// Serializes the header. Integers go out big-endian regardless of the
    /// host byte order.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.command.header_len());
        bytes.push(self.command.as_u8());
        bytes.extend_from_slice(&self.address.to_be_bytes());
        if let Some(size) = self.size {
            bytes.extend_from_slice(&size.to_be_bytes());
        }
        bytes
    }

    /// Parses one header from the start of `data`, returning it together with
    /// the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let tag = *data.first().ok_or(FrameError::Truncated {
            needed: 1,
            available: 0,
        })?;
        let command = Command::from_u8(tag).ok_or(FrameError::UnknownCommand(tag))?;

        let needed = match command {
            Command::DownloadRequest | Command::UploadRequest | Command::ExecuteRequest => {
                command.header_len()
            }
            other => return Err(FrameError::NotARequest(other)),
        };
        if data.len() < needed {
            return Err(FrameError::Truncated {
                needed,
                available: data.len(),
            });
        }

        let address = read_be_u32(&data[1..1 + ADDRESS_LEN]);
        let size = (needed == 1 + ADDRESS_LEN + SIZE_LEN)
            .then(|| read_be_u32(&data[1 + ADDRESS_LEN..needed]));

        Ok((
            Self {
                command,
                address,
                size,
            },
            needed,
        ))
    }
}

fn read_be_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Builds a PRINT frame: tag, text, terminating null.
///
/// Interior null bytes would end the message early on the listener side, so
/// the text is cut at the first one.
pub fn print_frame(text: &[u8]) -> Vec<u8> {
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    let mut bytes = Vec::with_capacity(end + 2);
    bytes.push(Command::Print.as_u8());
    bytes.extend_from_slice(&text[..end]);
    bytes.push(0);
    bytes
}

pub fn quit_frame() -> Vec<u8> {
    vec![Command::Quit.as_u8()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_header_layout() {
        let bytes = RequestHeader::download(0x0010_1000, 0x0000_0100).encode();
        assert_eq!(bytes, [1, 0x00, 0x10, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn execute_header_has_no_size() {
        let bytes = RequestHeader::execute(0x0600_4000).encode();
        assert_eq!(bytes, [3, 0x06, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn decode_reads_back_header() {
        let header = RequestHeader::upload(0x2200_0000, 77);
        let mut bytes = header.encode();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (decoded, used) = RequestHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(used, 9);
    }

    #[test]
    fn decode_rejects_short_and_foreign_input() {
        assert_eq!(
            RequestHeader::decode(&[1, 0, 0]),
            Err(FrameError::Truncated {
                needed: 9,
                available: 3
            })
        );
        assert_eq!(
            RequestHeader::decode(&[4, b'h', 0]),
            Err(FrameError::NotARequest(Command::Print))
        );
        assert_eq!(
            RequestHeader::decode(&[0x42]),
            Err(FrameError::UnknownCommand(0x42))
        );
    }

    #[test]
    fn print_frame_is_null_terminated() {
        assert_eq!(print_frame(b"hi"), [4, b'h', b'i', 0]);
        assert_eq!(print_frame(b"a\0b"), [4, b'a', 0]);
    }
}
