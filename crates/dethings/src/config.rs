use alloc::string::String;

use crate::auth::{AuthGate, DEFAULT_SECRET};
use crate::connectivity::RetryPolicy;
use crate::framer::{DEFAULT_DELIMITER, DEFAULT_MAX_COMMAND_LEN, FramingPolicy};
use crate::link::{Credentials, LinkProfile};
use crate::listener::DEFAULT_MAX_IDLE_POLLS;
use crate::request::Verb;
use crate::response::DEFAULT_RESPONSE;

/// Default device name.
pub const DEFAULT_DEVICE_NAME: &str = "Cardboard";

/// Default delay between two consecutive link attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u32 = 200;

/// A device configuration.
///
/// It is built once, before the device starts:
///
/// ```
/// use dethings::config::DeviceConfig;
/// use dethings::framer::FramingPolicy;
///
/// let config = DeviceConfig::new()
///     .device_name("Lamp")
///     .wifi_credentials("home", "password")
///     .secret("ORCA")
///     .framing(FramingPolicy::DelimiterDrain);
///
/// assert_eq!(config.name(), "Lamp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub(crate) device_name: String,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) mac: Option<[u8; 6]>,
    pub(crate) gate: Option<AuthGate>,
    pub(crate) delimiter: u8,
    pub(crate) framing: FramingPolicy,
    pub(crate) max_command_len: usize,
    pub(crate) max_idle_polls: u32,
    pub(crate) response: String,
    pub(crate) retry_delay_ms: u32,
    pub(crate) retry_policy: RetryPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceConfig {
    /// Creates a [`DeviceConfig`] with no link and no authorization.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.into(),
            credentials: None,
            mac: None,
            gate: None,
            delimiter: DEFAULT_DELIMITER,
            framing: FramingPolicy::default(),
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
            max_idle_polls: DEFAULT_MAX_IDLE_POLLS,
            response: DEFAULT_RESPONSE.into(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_policy: RetryPolicy::new(),
        }
    }

    /// Sets the device name.
    #[must_use]
    pub fn device_name(mut self, name: &str) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the `Wi-Fi` credentials.
    ///
    /// An empty SSID means no credentials.
    #[must_use]
    pub fn wifi_credentials(mut self, ssid: &str, key: &str) -> Self {
        self.credentials = Some(Credentials::new(ssid, key));
        self
    }

    /// Enables the wired interface with the given MAC address.
    #[must_use]
    pub const fn wired(mut self, mac: [u8; 6]) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Authorizes requests with the given shared secret.
    #[must_use]
    pub fn secret(mut self, secret: &str) -> Self {
        let verb = self.permitted_verb_or_default();
        self.gate = Some(AuthGate::new(secret).permitted_verb(verb));
        self
    }

    /// Authorizes requests with the default shared secret.
    #[must_use]
    pub fn authorize(self) -> Self {
        let secret = self.gate.as_ref().map_or(DEFAULT_SECRET, AuthGate::secret);
        let secret = String::from(secret);
        self.secret(&secret)
    }

    /// Sets the only verb authorized requests may use.
    ///
    /// Enables authorization with the default secret when not enabled yet.
    #[must_use]
    pub fn permitted_verb(mut self, verb: Verb) -> Self {
        self.gate = Some(self.gate.unwrap_or_default().permitted_verb(verb));
        self
    }

    /// Sets the command delimiter.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the [`FramingPolicy`].
    #[must_use]
    pub const fn framing(mut self, framing: FramingPolicy) -> Self {
        self.framing = framing;
        self
    }

    /// Sets the maximum command payload length.
    #[must_use]
    pub const fn max_command_len(mut self, max_len: usize) -> Self {
        self.max_command_len = max_len;
        self
    }

    /// Sets the number of consecutive [`Device::update`] calls a client may
    /// stay silent before its connection is answered and closed.
    ///
    /// [`Device::update`]: crate::device::Device::update
    #[must_use]
    pub const fn max_idle_polls(mut self, max_polls: u32) -> Self {
        self.max_idle_polls = max_polls;
        self
    }

    /// Sets the default response body, sent to clients which are not
    /// answered through [`Device::respond`].
    ///
    /// [`Device::respond`]: crate::device::Device::respond
    #[must_use]
    pub fn response(mut self, body: &str) -> Self {
        self.response = body.into();
        self
    }

    /// Sets the delay waited after a retryable link failure, in
    /// milliseconds.
    #[must_use]
    pub const fn retry_delay(mut self, delay_ms: u32) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets the [`RetryPolicy`].
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Returns the device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.device_name
    }

    /// Returns the [`AuthGate`], when authorization is enabled.
    #[must_use]
    pub const fn auth_gate(&self) -> Option<&AuthGate> {
        self.gate.as_ref()
    }

    /// Derives the [`LinkProfile`] from the configured interfaces.
    ///
    /// - Credentials and a wired interface: [`LinkProfile::Combined`]
    /// - Credentials only: [`LinkProfile::Station`]
    /// - A wired interface only, or with empty credentials:
    ///   [`LinkProfile::Wired`]
    /// - Nothing: no profile
    #[must_use]
    pub fn link_profile(&self) -> Option<LinkProfile> {
        match (&self.credentials, self.mac) {
            (Some(credentials), Some(mac)) if !credentials.is_empty() => {
                Some(LinkProfile::Combined {
                    mac,
                    credentials: credentials.clone(),
                })
            }
            (_, Some(mac)) => Some(LinkProfile::Wired { mac }),
            (Some(credentials), None) => Some(LinkProfile::Station(credentials.clone())),
            (None, None) => None,
        }
    }

    fn permitted_verb_or_default(&self) -> Verb {
        self.gate.as_ref().map_or(Verb::Post, AuthGate::permitted)
    }
}
