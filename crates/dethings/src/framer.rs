use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, warn};

/// Default command delimiter.
pub const DEFAULT_DELIMITER: u8 = b'!';

/// Default maximum length of a command payload, in bytes.
pub const DEFAULT_MAX_COMMAND_LEN: usize = 128;

/// When a command is considered complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingPolicy {
    /// A command ends at the first line terminator following the delimiter,
    /// or when the peer closes the connection.
    #[default]
    LineTerminated,
    /// A command ends when the client has no more bytes to send after the
    /// delimiter, or when the peer closes the connection.
    DelimiterDrain,
}

/// A command extracted from a client request.
///
/// A command always starts with the delimiter it was framed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Returns the command as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the command text following the delimiter.
    #[must_use]
    pub fn payload(&self) -> &str {
        self.0
            .char_indices()
            .nth(1)
            .map_or("", |(index, _)| &self.0[index..])
    }

    /// Consumes the command returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq<&str> for Command {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Extracts a [`Command`] from a raw client byte stream.
///
/// Everything preceding the last delimiter is considered request preamble
/// and dropped. The bytes following it become the command payload.
#[derive(Debug)]
pub struct CommandFramer {
    policy: FramingPolicy,
    delimiter: u8,
    max_len: usize,
    payload: Vec<u8>,
    delimited: bool,
    truncated: bool,
}

impl Default for CommandFramer {
    fn default() -> Self {
        Self::new(FramingPolicy::default())
    }
}

impl CommandFramer {
    /// Creates a [`CommandFramer`] with the default delimiter and maximum
    /// command length.
    #[must_use]
    pub const fn new(policy: FramingPolicy) -> Self {
        Self {
            policy,
            delimiter: DEFAULT_DELIMITER,
            max_len: DEFAULT_MAX_COMMAND_LEN,
            payload: Vec::new(),
            delimited: false,
            truncated: false,
        }
    }

    /// Sets the command delimiter.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the maximum command payload length.
    ///
    /// Payload bytes exceeding this length are dropped.
    #[must_use]
    pub const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Returns the [`FramingPolicy`].
    #[must_use]
    pub const fn policy(&self) -> FramingPolicy {
        self.policy
    }

    /// Whether the delimiter has been observed since the last reset.
    #[must_use]
    pub const fn is_delimited(&self) -> bool {
        self.delimited
    }

    /// Feeds a byte to the framer.
    ///
    /// Returns a [`Command`] when this byte completes one.
    pub fn push(&mut self, byte: u8) -> Option<Command> {
        if byte == self.delimiter {
            self.payload.clear();
            self.delimited = true;
            self.truncated = false;
            return None;
        }

        if !self.delimited {
            return None;
        }

        if byte == b'\n' && self.policy == FramingPolicy::LineTerminated {
            return Some(self.finalize());
        }

        if self.payload.len() < self.max_len {
            self.payload.push(byte);
        } else if !self.truncated {
            warn!("Command longer than {} bytes, dropping the excess", self.max_len);
            self.truncated = true;
        }

        None
    }

    /// Signals that the client has no more bytes to send for now.
    ///
    /// Under [`FramingPolicy::DelimiterDrain`], completes the command when
    /// the delimiter has been observed.
    pub fn drained(&mut self) -> Option<Command> {
        (self.policy == FramingPolicy::DelimiterDrain && self.delimited).then(|| self.finalize())
    }

    /// Signals that the peer closed the connection.
    ///
    /// Completes the command when the delimiter has been observed, otherwise
    /// discards everything received.
    pub fn closed(&mut self) -> Option<Command> {
        if self.delimited {
            Some(self.finalize())
        } else {
            self.reset();
            None
        }
    }

    /// Discards everything received so far.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.delimited = false;
        self.truncated = false;
    }

    fn finalize(&mut self) -> Command {
        let payload = String::from_utf8_lossy(&self.payload);

        let mut command = String::with_capacity(payload.len() + 1);
        command.push(char::from(self.delimiter));
        command.push_str(payload.trim());

        debug!("Received: {command}");
        self.reset();

        Command(command)
    }
}
