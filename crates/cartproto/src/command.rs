use std::fmt;

/// Operation tag carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Idle marker. Never sent as a real command.
    None = 0,
    /// Sent by the host: return `size` bytes of cartridge memory at `address`.
    /// Sent by the cartridge: ask the listener for a file.
    DownloadRequest = 1,
    /// Sent by the host: store the following `size` bytes at `address`.
    UploadRequest = 2,
    /// Jump to `address`.
    ExecuteRequest = 3,
    /// Null-terminated text for the host console.
    Print = 4,
    /// End of the listening session.
    Quit = 5,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::DownloadRequest),
            2 => Some(Self::UploadRequest),
            3 => Some(Self::ExecuteRequest),
            4 => Some(Self::Print),
            5 => Some(Self::Quit),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::DownloadRequest => "DOWNLOAD_REQUEST",
            Self::UploadRequest => "UPLOAD_REQUEST",
            Self::ExecuteRequest => "EXECUTE_REQUEST",
            Self::Print => "PRINT",
            Self::Quit => "QUIT",
        }
    }

    /// Length of the fixed request header that starts with this tag.
    pub fn header_len(&self) -> usize {
        match self {
            Self::DownloadRequest | Self::UploadRequest => 9,
            Self::ExecuteRequest => 5,
            Self::None | Self::Print | Self::Quit => 1,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
