use core::net::Ipv4Addr;

use alloc::string::String;

/// `Wi-Fi` credentials.
///
/// An empty SSID is equivalent to having no credentials at all, in which
/// case a device falls back to its wired interface, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: String,
    key: String,
}

impl Credentials {
    /// Creates [`Credentials`] from an SSID and its key.
    #[must_use]
    #[inline]
    pub fn new(ssid: &str, key: &str) -> Self {
        Self {
            ssid: ssid.into(),
            key: key.into(),
        }
    }

    /// Returns the network SSID.
    #[must_use]
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Returns the network key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether these credentials cannot be used to join a network.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

/// The physical transport carrying the device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// A `Wi-Fi` station interface.
    Station,
    /// A wired `Ethernet` interface.
    Wired,
}

impl Transport {
    /// The short label shown on the status display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Station => "WLAN",
            Self::Wired => "ETH",
        }
    }
}

impl core::fmt::Display for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.label().fmt(f)
    }
}

/// Which transports a device tries and in which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkProfile {
    /// Join a `Wi-Fi` network.
    Station(Credentials),
    /// Bring up the wired interface with the given MAC address.
    Wired {
        /// Interface MAC address.
        mac: [u8; 6],
    },
    /// Try the wired interface first and, when no wired hardware or cable
    /// is detected, join the `Wi-Fi` network instead.
    Combined {
        /// Wired interface MAC address.
        mac: [u8; 6],
        /// Credentials for the station fallback.
        credentials: Credentials,
    },
}

impl LinkProfile {
    /// Whether a connection attempt can be made with this profile.
    ///
    /// A station profile with empty credentials cannot.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        match self {
            Self::Station(credentials) => !credentials.is_empty(),
            Self::Wired { .. } | Self::Combined { .. } => true,
        }
    }

    /// The short label shown on the status display when the profile is
    /// selected.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Station(_) => "WLAN",
            Self::Wired { .. } => "ETH",
            Self::Combined { .. } => "ETH+WLAN",
        }
    }
}

/// Reasons a link attempt may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// No network matching the configured SSID was found.
    NoNetwork,
    /// The attempt failed for a transient or unknown reason.
    ConnectFailed,
    /// The access point rejected the configured key.
    RejectedKey,
    /// No wired interface or cable was detected.
    NoHardware,
}

impl LinkFailure {
    /// Whether a new attempt may succeed without operator intervention.
    ///
    /// A rejected key keeps failing until the credentials change.
    #[must_use]
    pub const fn retryable(self) -> bool {
        !matches!(self, Self::RejectedKey)
    }

    /// The status display lines and hold time reported for this failure.
    #[must_use]
    pub const fn status(self) -> (&'static str, &'static str, u32) {
        match self {
            Self::NoNetwork => ("[ERR] IS 2.4GHZ?", "NO SSID AVAIL", 5000),
            Self::ConnectFailed => ("[ERR]", "FAILED", 5000),
            Self::RejectedKey => ("[ERR]", "INVALID KEY", 5000),
            Self::NoHardware => ("[ERR]", "NO CABLE", 2000),
        }
    }
}

impl core::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoNetwork => "no network matches the configured SSID",
            Self::ConnectFailed => "connection attempt failed",
            Self::RejectedKey => "key rejected by the access point",
            Self::NoHardware => "no wired interface detected",
        }
        .fmt(f)
    }
}

/// A network interface able to bring a link up and report its status.
///
/// Implementations block, through `await`, until the link is established
/// or until the attempt fails with a [`LinkFailure`].
#[allow(async_fn_in_trait)]
pub trait LinkDriver {
    /// Joins the `Wi-Fi` network described by the given [`Credentials`].
    async fn begin_station_link(&mut self, credentials: &Credentials) -> Result<(), LinkFailure>;

    /// Brings up the wired interface with the given MAC address.
    ///
    /// Drivers without a wired interface keep the default implementation,
    /// which reports [`LinkFailure::NoHardware`].
    async fn begin_wired_link(&mut self, mac: [u8; 6]) -> Result<(), LinkFailure> {
        let _ = mac;
        Err(LinkFailure::NoHardware)
    }

    /// Whether the underlying link is still up.
    fn is_link_up(&self) -> bool;

    /// The IPv4 address assigned to the device, if any.
    fn local_address(&self) -> Option<Ipv4Addr>;
}

#[cfg(test)]
mod tests {
    use super::{Credentials, LinkFailure, LinkProfile};

    #[test]
    fn test_empty_credentials() {
        assert!(Credentials::new("", "key").is_empty());
        assert!(!Credentials::new("home", "").is_empty());
    }

    #[test]
    fn test_profile_usability() {
        assert!(!LinkProfile::Station(Credentials::new("", "")).is_usable());
        assert!(LinkProfile::Station(Credentials::new("home", "key")).is_usable());
        assert!(LinkProfile::Wired { mac: [0; 6] }.is_usable());
    }

    #[test]
    fn test_failure_classes() {
        assert!(LinkFailure::NoNetwork.retryable());
        assert!(LinkFailure::ConnectFailed.retryable());
        assert!(LinkFailure::NoHardware.retryable());
        assert!(!LinkFailure::RejectedKey.retryable());
    }
}
