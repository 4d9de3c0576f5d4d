use alloc::string::String;
use alloc::vec::Vec;

use crate::framer::DEFAULT_DELIMITER;

// Longest verb token kept by the request head reader.
const MAX_VERB_LEN: usize = 8;

/// Default longest secret kept by the request head reader, in bytes.
pub const DEFAULT_MAX_SECRET_LEN: usize = 64;

/// A request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `PATCH`
    Patch,
    /// Any other token, including a missing one.
    Other,
}

impl Verb {
    /// Parses a verb token.
    ///
    /// Verbs are case-sensitive.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            _ => Self::Other,
        }
    }

    /// Returns the verb as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Other => "OTHER",
        }
    }
}

impl core::fmt::Display for Verb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// The parts of a client request the authorization step looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    verb: Verb,
    secret: Option<String>,
}

impl Request {
    /// Creates a [`Request`].
    #[must_use]
    pub fn new(verb: Verb, secret: &str) -> Self {
        Self {
            verb,
            secret: Some(secret.into()),
        }
    }

    /// Creates a [`Request`] whose secret could not be read back exactly,
    /// because it was too long or not valid `UTF-8`.
    ///
    /// Such a request never matches any secret.
    #[must_use]
    pub const fn unreadable_secret(verb: Verb) -> Self {
        Self { verb, secret: None }
    }

    /// Returns the request [`Verb`].
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Returns the secret declared in the request body, when it could be
    /// read back exactly.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Verb,
    RequestLine,
    Headers,
    Body,
    Done,
}

/// Reads the head of a request incrementally, one byte at a time.
///
/// The verb is the first token of the request line. The secret is the
/// body text following the blank line which ends the headers, up to the
/// command delimiter. It is kept byte for byte: only a single line ending
/// right before the delimiter is dropped.
///
/// ```text
/// POST / HTTP/1.1\r\n
/// Content-Length: 14\r\n
/// \r\n
/// WHALE!turn_on\n
/// ```
#[derive(Debug)]
pub struct RequestHead {
    delimiter: u8,
    section: Section,
    verb: Vec<u8>,
    secret: Vec<u8>,
    max_secret_len: usize,
    overflow: bool,
    line_len: usize,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl RequestHead {
    /// Creates a [`RequestHead`] reader stopping at the given delimiter.
    #[must_use]
    pub const fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            section: Section::Verb,
            verb: Vec::new(),
            secret: Vec::new(),
            max_secret_len: DEFAULT_MAX_SECRET_LEN,
            overflow: false,
            line_len: 0,
        }
    }

    /// Sets the delimiter the reader stops at.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the longest secret kept, in bytes.
    ///
    /// A longer secret makes the request unreadable.
    #[must_use]
    pub const fn max_secret_len(mut self, max_len: usize) -> Self {
        self.max_secret_len = max_len;
        self
    }

    /// Feeds a byte to the reader.
    pub fn push(&mut self, byte: u8) {
        if byte == self.delimiter {
            self.section = Section::Done;
            return;
        }

        match self.section {
            Section::Verb => match byte {
                b' ' => self.section = Section::RequestLine,
                b'\n' => self.end_line(),
                b'\r' => {}
                _ if self.verb.len() < MAX_VERB_LEN => self.verb.push(byte),
                _ => {}
            },
            Section::RequestLine | Section::Headers => match byte {
                b'\n' => self.end_line(),
                b'\r' => {}
                _ => self.line_len += 1,
            },
            Section::Body => {
                if self.secret.len() < self.max_secret_len {
                    self.secret.push(byte);
                } else {
                    self.overflow = true;
                }
            }
            Section::Done => {}
        }
    }

    /// Returns the [`Request`] read so far.
    #[must_use]
    pub fn request(&self) -> Request {
        let verb = core::str::from_utf8(&self.verb).map_or(Verb::Other, Verb::parse);
        if self.overflow {
            return Request::unreadable_secret(verb);
        }

        let mut secret = self.secret.as_slice();
        if let Some(line) = secret.strip_suffix(b"\n") {
            secret = line.strip_suffix(b"\r").unwrap_or(line);
        }

        core::str::from_utf8(secret).map_or_else(
            |_| Request::unreadable_secret(verb),
            |secret| Request::new(verb, secret),
        )
    }

    /// Prepares the reader for a new request.
    pub fn reset(&mut self) {
        self.section = Section::Verb;
        self.verb.clear();
        self.secret.clear();
        self.overflow = false;
        self.line_len = 0;
    }

    fn end_line(&mut self) {
        self.section = match self.section {
            Section::Headers if self.line_len == 0 => Section::Body,
            Section::Verb | Section::RequestLine | Section::Headers => Section::Headers,
            section => section,
        };
        self.line_len = 0;
    }
}
