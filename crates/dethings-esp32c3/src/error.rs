use embassy_executor::SpawnError;

use esp_radio::InitializationError;
use esp_radio::wifi::WifiError;

/// All errors raised while bringing up the board.
#[derive(Debug)]
pub enum Error {
    /// A task could not be spawned.
    Spawn(SpawnError),
    /// The radio could not be initialized.
    Radio(InitializationError),
    /// The `Wi-Fi` driver failed.
    Wifi(WifiError),
}

impl From<SpawnError> for Error {
    fn from(e: SpawnError) -> Self {
        Self::Spawn(e)
    }
}

impl From<InitializationError> for Error {
    fn from(e: InitializationError) -> Self {
        Self::Radio(e)
    }
}

impl From<WifiError> for Error {
    fn from(e: WifiError) -> Self {
        Self::Wifi(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "task spawn error: {e:?}"),
            Self::Radio(e) => write!(f, "radio initialization error: {e:?}"),
            Self::Wifi(e) => write!(f, "Wi-Fi error: {e:?}"),
        }
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
