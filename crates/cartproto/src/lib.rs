//! Wire format for the development cartridge transfer protocol.
//!
//! Every exchange starts with a one-byte [`Command`] tag. Transfer requests
//! carry a big-endian address (and size) header, payloads are followed by a
//! single checksum trailer byte, and uploads are acknowledged with one status
//! byte. This crate holds only the byte-level definitions so that both the
//! host driver and any listener implementation agree on them.
//!
//! Tag names follow the cartridge firmware and read backwards from the host:
//! when a cartridge sends `DOWNLOAD_REQUEST` to a listener, the listener
//! answers with what the host driver calls an upload. Keep the names as they
//! are; both ends agree on the bytes, not on the wording.

mod checksum;
mod command;
mod frame;

pub use checksum::{trailer_byte, trailer_matches, Checksum};
pub use command::Command;
pub use frame::{
    print_frame, quit_frame, FrameError, RequestHeader, ADDRESS_LEN, SIZE_LEN, STATUS_OK,
};
