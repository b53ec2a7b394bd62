//! Incremental decoder for the command stream a cartridge sends to a listener.
//!
//! Chunks from the channel never line up with commands: a filename or a print
//! message may be spread over any number of reads, and one read may hold the
//! tail of one command, several whole commands and the start of the next. The
//! parser keeps its cursor state between calls and reports each command the
//! moment its last byte has been seen.

use cartproto::Command;

/// Something the listener has to act on, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The cartridge asks for a file. The name is ASCII-lowercased and carries
    /// no terminator. Other bytes pass through untouched.
    FileRequest(Vec<u8>),
    /// Print bytes received so far; a message may arrive as several of these.
    Text(Vec<u8>),
    /// The print message in progress is complete.
    PrintEnd,
    /// The cartridge closed the session.
    Quit,
    /// A tag a listener cannot service. Decoding resumes at the next byte.
    Unsupported(u8),
    /// A filename ran past `limit` bytes and was dropped.
    FilenameOverflow { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Filename { name: Vec<u8>, overflowed: bool },
    Print,
    Finished,
}

#[derive(Debug)]
pub struct CommandStreamParser {
    state: State,
    max_filename: usize,
}

impl CommandStreamParser {
    pub fn new(max_filename: usize) -> Self {
        Self {
            state: State::Idle,
            max_filename,
        }
    }

    /// Drops any partially decoded command.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Tag of the command being decoded, `Command::None` between commands.
    pub fn current_command(&self) -> Command {
        match self.state {
            State::Idle => Command::None,
            State::Filename { .. } => Command::DownloadRequest,
            State::Print => Command::Print,
            State::Finished => Command::Quit,
        }
    }

    /// `true` once QUIT has been decoded. Later input is ignored.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Feeds one chunk and returns the events it completes. An empty chunk is
    /// a no-op.
    pub fn push_bytes(&mut self, input: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut cursor = 0;

        while cursor < input.len() {
            match &mut self.state {
                State::Finished => break,
                State::Idle => {
                    let tag = input[cursor];
                    cursor += 1;
                    self.start(tag, &mut events);
                }
                State::Filename { name, overflowed } => {
                    let rest = &input[cursor..];
                    let Some(end) = rest.iter().position(|&b| b == 0) else {
                        cursor = input.len();
                        *overflowed |= append_lowercase(name, rest, self.max_filename);
                        continue;
                    };
                    cursor += end + 1;
                    *overflowed |= append_lowercase(name, &rest[..end], self.max_filename);

                    let event = if *overflowed {
                        StreamEvent::FilenameOverflow {
                            limit: self.max_filename,
                        }
                    } else {
                        StreamEvent::FileRequest(std::mem::take(name))
                    };
                    events.push(event);
                    self.state = State::Idle;
                }
                State::Print => {
                    let rest = &input[cursor..];
                    let end = rest.iter().position(|&b| b == 0);
                    let text = &rest[..end.unwrap_or(rest.len())];
                    if !text.is_empty() {
                        events.push(StreamEvent::Text(text.to_vec()));
                    }
                    match end {
                        Some(end) => {
                            cursor += end + 1;
                            events.push(StreamEvent::PrintEnd);
                            self.state = State::Idle;
                        }
                        None => cursor = input.len(),
                    }
                }
            }
        }

        events
    }

    fn start(&mut self, tag: u8, events: &mut Vec<StreamEvent>) {
        self.state = match Command::from_u8(tag) {
            Some(Command::None) => State::Idle,
            Some(Command::DownloadRequest) => State::Filename {
                name: Vec::new(),
                overflowed: false,
            },
            Some(Command::Print) => State::Print,
            Some(Command::Quit) => {
                events.push(StreamEvent::Quit);
                State::Finished
            }
            Some(Command::UploadRequest | Command::ExecuteRequest) | None => {
                events.push(StreamEvent::Unsupported(tag));
                State::Idle
            }
        };
    }
}

/// Appends lowercased bytes while staying within `limit`. Returns `true` when
/// anything had to be dropped.
fn append_lowercase(name: &mut Vec<u8>, bytes: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(name.len());
    let take = bytes.len().min(room);
    name.extend(bytes[..take].iter().map(u8::to_ascii_lowercase));
    take < bytes.len()
}
