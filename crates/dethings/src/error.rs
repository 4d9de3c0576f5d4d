use embedded_io_async::ErrorKind;

use crate::link::LinkFailure;

/// All errors a device operation may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No usable link profile has been configured.
    ///
    /// The device stays unconfigured until new credentials or a wired
    /// interface are provided.
    Unconfigured,
    /// A link attempt failed.
    Link(LinkFailure),
    /// The client connection failed while reading or writing.
    Io(ErrorKind),
}

impl Error {
    /// Converts any `embedded-io` error into an [`Error::Io`].
    #[must_use]
    #[inline]
    pub fn io<E: embedded_io_async::Error>(error: E) -> Self {
        Self::Io(error.kind())
    }

    /// Whether the connectivity state machine resumes connection attempts
    /// on its own after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unconfigured => false,
            Self::Link(failure) => failure.retryable(),
            Self::Io(_) => true,
        }
    }
}

impl From<LinkFailure> for Error {
    fn from(failure: LinkFailure) -> Self {
        Self::Link(failure)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("no link profile configured"),
            Self::Link(failure) => write!(f, "link failure: {failure}"),
            Self::Io(kind) => write!(f, "client i/o error: {kind:?}"),
        }
    }
}

impl core::error::Error for Error {}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
