use core::net::Ipv4Addr;

use alloc::format;
use alloc::string::{String, ToString};

use embedded_hal_async::delay::DelayNs;

use log::{error, info, warn};

use crate::config::{DEFAULT_DEVICE_NAME, DEFAULT_RETRY_DELAY_MS};
use crate::error::{Error, Result};
use crate::link::{Credentials, LinkDriver, LinkFailure, LinkProfile, Transport};
use crate::status::StatusSink;

// Outcome of a single driver attempt.
type Attempt = core::result::Result<Transport, LinkFailure>;

/// The network state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection attempt has been made, or no usable link profile
    /// exists.
    Unconfigured,
    /// A connection attempt is in progress.
    Connecting,
    /// The link is up and the device can serve clients.
    Connected,
    /// The link was up and has been lost.
    Disconnected,
    /// The last connection attempt failed.
    Failed(LinkFailure),
}

impl LinkState {
    /// Whether the link is up.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Decides which failures are retried.
///
/// By default every [`LinkFailure`] is retried except
/// [`LinkFailure::RejectedKey`], which keeps failing until the credentials
/// change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_rejected_key: bool,
    wired_after_rejected_key: bool,
}

impl RetryPolicy {
    /// Creates the default [`RetryPolicy`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retry_rejected_key: false,
            wired_after_rejected_key: false,
        }
    }

    /// Keeps retrying the station link even when the access point rejects
    /// the key.
    #[must_use]
    pub const fn retry_rejected_key(mut self) -> Self {
        self.retry_rejected_key = true;
        self
    }

    /// With a [`LinkProfile::Combined`] profile, a rejected key disables the
    /// station fallback and the state machine keeps retrying the wired
    /// interface alone.
    ///
    /// Without this option, a rejected key stops the state machine.
    #[must_use]
    pub const fn wired_after_rejected_key(mut self) -> Self {
        self.wired_after_rejected_key = true;
        self
    }

    /// Whether a new attempt is made after the given failure.
    #[must_use]
    pub const fn is_retryable(&self, failure: LinkFailure) -> bool {
        match failure {
            LinkFailure::RejectedKey => self.retry_rejected_key,
            _ => failure.retryable(),
        }
    }
}

/// The connectivity state machine.
///
/// It owns the [`LinkDriver`], the [`StatusSink`], and the [`LinkState`].
/// Every state change produced by a connection attempt is reported to the
/// sink after the state has been updated, one report per outcome.
pub struct Connectivity<L, S, D>
where
    L: LinkDriver,
    S: StatusSink,
    D: DelayNs,
{
    driver: L,
    sink: S,
    delay: D,
    device_name: String,
    profile: Option<LinkProfile>,
    policy: RetryPolicy,
    retry_delay_ms: u32,
    state: LinkState,
    transport: Option<Transport>,
    announced: Option<Ipv4Addr>,
    station_disabled: bool,
}

impl<L, S, D> Connectivity<L, S, D>
where
    L: LinkDriver,
    S: StatusSink,
    D: DelayNs,
{
    /// Creates an unconfigured [`Connectivity`] state machine.
    #[must_use]
    pub fn new(driver: L, sink: S, delay: D) -> Self {
        Self {
            driver,
            sink,
            delay,
            device_name: DEFAULT_DEVICE_NAME.into(),
            profile: None,
            policy: RetryPolicy::new(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            state: LinkState::Unconfigured,
            transport: None,
            announced: None,
            station_disabled: false,
        }
    }

    /// Sets the device name shown next to the device address.
    #[must_use]
    pub fn device_name(mut self, name: &str) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the [`RetryPolicy`].
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the delay (in milliseconds) waited after a retryable failure.
    #[must_use]
    pub const fn retry_delay(mut self, delay_ms: u32) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets the [`LinkProfile`] used by the next connection attempt.
    ///
    /// No I/O is performed. The call is ignored while a connection attempt
    /// is in progress.
    pub fn configure(&mut self, profile: LinkProfile) {
        if self.state == LinkState::Connecting {
            warn!("Link profile ignored, a connection attempt is in progress");
            return;
        }

        self.profile = Some(profile);
        self.station_disabled = false;

        // A connected link keeps running until it is lost.
        if !self.state.is_connected() {
            self.state = LinkState::Unconfigured;
        }
    }

    /// Returns the current [`LinkState`].
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns the transport of the active link, if any.
    #[must_use]
    pub const fn transport(&self) -> Option<Transport> {
        self.transport
    }

    /// Returns the last address reported on the status display.
    #[must_use]
    pub const fn local_address(&self) -> Option<Ipv4Addr> {
        self.announced
    }

    /// Returns the configured [`LinkProfile`], if any.
    #[must_use]
    pub const fn profile(&self) -> Option<&LinkProfile> {
        self.profile.as_ref()
    }

    /// Returns the device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.device_name
    }

    /// Returns a reference to the [`LinkDriver`].
    #[must_use]
    pub const fn driver(&self) -> &L {
        &self.driver
    }

    /// Returns a mutable reference to the [`LinkDriver`].
    pub fn driver_mut(&mut self) -> &mut L {
        &mut self.driver
    }

    /// Returns a reference to the [`StatusSink`].
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Makes a single connection attempt.
    ///
    /// On success the state becomes [`LinkState::Connected`] and the device
    /// address is reported. On failure the state becomes
    /// [`LinkState::Failed`], the failure is reported, and, when the failure
    /// is retryable, the retry delay is waited before returning.
    ///
    /// # Errors
    ///
    /// - [`Error::Unconfigured`] when no usable link profile exists
    /// - [`Error::Link`] when the attempt fails
    pub async fn connect_once(&mut self) -> Result<()> {
        let Some(profile) = self.profile.clone().filter(LinkProfile::is_usable) else {
            self.state = LinkState::Unconfigured;
            self.transport = None;
            self.announced = None;

            error!("No usable link profile, set Wi-Fi credentials or a wired interface");
            self.sink.render("[ERR]", "NO CREDENTIALS", 2000).await;

            return Err(Error::Unconfigured);
        };

        self.state = LinkState::Connecting;

        let outcome = match &profile {
            LinkProfile::Station(credentials) => self.attempt_station(credentials).await,
            LinkProfile::Wired { mac } => self.attempt_wired(*mac).await,
            LinkProfile::Combined { mac, credentials } => {
                self.attempt_combined(*mac, credentials).await
            }
        };

        match outcome {
            Ok(transport) => {
                self.on_connected(transport).await;
                Ok(())
            }
            Err(failure) => {
                self.on_failure(failure).await;
                Err(Error::Link(failure))
            }
        }
    }

    /// Runs one scheduler cycle.
    ///
    /// When connected, polls the link status. A lost link moves the state to
    /// [`LinkState::Disconnected`] and a new connection attempt starts
    /// immediately. When not connected, a new attempt is made unless the
    /// last failure is not retryable.
    ///
    /// # Errors
    ///
    /// The errors of [`Self::connect_once`], when an attempt is made.
    pub async fn tick(&mut self) -> Result<()> {
        match self.state {
            LinkState::Connected => {
                if self.driver.is_link_up() {
                    self.refresh_address().await;
                    return Ok(());
                }

                self.state = LinkState::Disconnected;
                self.transport = None;
                self.announced = None;

                warn!("Connection lost");
                self.sink.render("[ERR]", "DISCONNECTED", 2000).await;

                self.connect_once().await
            }
            LinkState::Unconfigured => {
                if self.profile.as_ref().is_some_and(LinkProfile::is_usable) {
                    self.connect_once().await
                } else {
                    Ok(())
                }
            }
            LinkState::Failed(failure) if !self.can_retry(failure) => Ok(()),
            LinkState::Connecting | LinkState::Disconnected | LinkState::Failed(_) => {
                self.connect_once().await
            }
        }
    }

    /// Renders the message describing the current state.
    pub async fn show_state_message(&mut self) {
        match (self.state, self.announced) {
            (LinkState::Connected, Some(address)) => self.render_address(address).await,
            (LinkState::Connected, None) => {
                let label = self.transport.map_or("LINK", Transport::label);
                self.sink.render(&format!("[{label}]"), "OK", 1000).await;
            }
            _ => {
                error!(
                    "Connection cannot be established. Please check service messages above."
                );
                self.sink.render("[ERR]", "NO CONNECTION", 10).await;
            }
        }
    }

    pub(crate) async fn render(&mut self, line1: &str, line2: &str, hold_ms: u32) {
        self.sink.render(line1, line2, hold_ms).await;
    }

    async fn attempt_station(&mut self, credentials: &Credentials) -> Attempt {
        info!("Connecting to {}", credentials.ssid());
        self.driver
            .begin_station_link(credentials)
            .await
            .map(|()| Transport::Station)
    }

    async fn attempt_wired(&mut self, mac: [u8; 6]) -> Attempt {
        info!("Connecting through the wired interface...");
        self.driver
            .begin_wired_link(mac)
            .await
            .map(|()| Transport::Wired)
    }

    async fn attempt_combined(&mut self, mac: [u8; 6], credentials: &Credentials) -> Attempt {
        if self.station_disabled {
            return self.attempt_wired(mac).await;
        }

        match self.attempt_wired(mac).await {
            Err(LinkFailure::NoHardware) if !credentials.is_empty() => {
                warn!("Cannot access network through ethernet. Is cable plugged in?");
                self.on_failure_report(LinkFailure::NoHardware).await;

                info!("Selected WLAN profile.");
                self.state = LinkState::Connecting;
                self.attempt_station(credentials).await
            }
            outcome => outcome,
        }
    }

    async fn on_connected(&mut self, transport: Transport) {
        self.state = LinkState::Connected;
        self.transport = Some(transport);
        self.announced = self.driver.local_address();

        info!("Link up through {transport}");
        self.show_state_message().await;
    }

    async fn on_failure(&mut self, failure: LinkFailure) {
        if failure == LinkFailure::RejectedKey
            && self.policy.wired_after_rejected_key
            && matches!(self.profile, Some(LinkProfile::Combined { .. }))
        {
            self.station_disabled = true;
        }

        self.on_failure_report(failure).await;

        if self.can_retry(failure) {
            self.delay.delay_ms(self.retry_delay_ms).await;
        }
    }

    async fn on_failure_report(&mut self, failure: LinkFailure) {
        self.state = LinkState::Failed(failure);
        self.transport = None;
        self.announced = None;

        error!("Link attempt failed: {failure}");
        let (line1, line2, hold_ms) = failure.status();
        self.sink.render(line1, line2, hold_ms).await;
    }

    async fn refresh_address(&mut self) {
        let address = self.driver.local_address();
        if address.is_none() || address == self.announced {
            return;
        }

        self.announced = address;
        if let Some(address) = address {
            info!("IP address changed: {address}");
            self.render_address(address).await;
        }
    }

    async fn render_address(&mut self, address: Ipv4Addr) {
        info!("Connected, IP address: {address}");
        let line1 = format!("[IP] {}", self.device_name);
        self.sink.render(&line1, &address.to_string(), 1).await;
    }

    fn can_retry(&self, failure: LinkFailure) -> bool {
        self.policy.is_retryable(failure) || self.station_disabled
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::net::Ipv4Addr;

    use std::vec;

    use embedded_hal_mock::eh1::delay::NoopDelay;

    use crate::error::Error;
    use crate::link::{Credentials, LinkFailure, LinkProfile, Transport};
    use crate::tests::{RecordingSink, ScriptedDriver, render};

    use super::{Connectivity, LinkState, RetryPolicy};

    const ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

    fn station() -> LinkProfile {
        LinkProfile::Station(Credentials::new("home", "password"))
    }

    fn connectivity(
        driver: ScriptedDriver,
    ) -> Connectivity<ScriptedDriver, RecordingSink, NoopDelay> {
        Connectivity::new(driver, RecordingSink::default(), NoopDelay::new()).device_name("Lamp")
    }

    #[tokio::test]
    async fn test_recoverable_failures_then_success() {
        let failures = 3;
        let driver = ScriptedDriver::new(ADDRESS)
            .station(vec![Err(LinkFailure::NoNetwork); failures]);

        let mut connectivity = connectivity(driver);
        connectivity.configure(station());

        assert_eq!(
            connectivity.connect_once().await,
            Err(Error::Link(LinkFailure::NoNetwork))
        );
        assert_eq!(
            connectivity.state(),
            LinkState::Failed(LinkFailure::NoNetwork)
        );

        while !connectivity.state().is_connected() {
            let _ = connectivity.tick().await;
        }

        assert_eq!(connectivity.driver().station_attempts, failures + 1);
        assert_eq!(connectivity.sink().renders.len(), failures + 1);
        assert_eq!(
            connectivity.sink().renders.last(),
            Some(&render("[IP] Lamp", "192.168.1.42", 1))
        );
        assert_eq!(connectivity.transport(), Some(Transport::Station));
        assert_eq!(connectivity.local_address(), Some(ADDRESS));
    }

    #[tokio::test]
    async fn test_link_loss_reconnects() {
        let mut connectivity = connectivity(ScriptedDriver::new(ADDRESS));
        connectivity.configure(station());

        connectivity.connect_once().await.unwrap();
        assert!(connectivity.state().is_connected());

        connectivity.driver_mut().link_up = false;
        connectivity.tick().await.unwrap();

        let renders = &connectivity.sink().renders;
        assert_eq!(renders[1], render("[ERR]", "DISCONNECTED", 2000));
        assert_eq!(renders[2].0, "[IP] Lamp");
        assert_eq!(connectivity.driver().station_attempts, 2);
        assert!(connectivity.state().is_connected());
    }

    #[tokio::test]
    async fn test_link_loss_followed_by_failure() {
        let driver = ScriptedDriver::new(ADDRESS)
            .station(vec![Ok(()), Err(LinkFailure::ConnectFailed)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(station());

        connectivity.connect_once().await.unwrap();
        connectivity.driver_mut().link_up = false;

        assert_eq!(
            connectivity.tick().await,
            Err(Error::Link(LinkFailure::ConnectFailed))
        );
        assert_eq!(
            connectivity.state(),
            LinkState::Failed(LinkFailure::ConnectFailed)
        );

        connectivity.tick().await.unwrap();
        assert!(connectivity.state().is_connected());
    }

    #[tokio::test]
    async fn test_rejected_key_is_terminal() {
        let driver = ScriptedDriver::new(ADDRESS).station(vec![Err(LinkFailure::RejectedKey)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(station());

        assert!(connectivity.connect_once().await.is_err());
        for _ in 0..5 {
            connectivity.tick().await.unwrap();
        }

        assert_eq!(connectivity.driver().station_attempts, 1);
        assert_eq!(
            connectivity.state(),
            LinkState::Failed(LinkFailure::RejectedKey)
        );
        assert_eq!(
            connectivity.sink().renders,
            vec![render("[ERR]", "INVALID KEY", 5000)]
        );
    }

    #[tokio::test]
    async fn test_rejected_key_retried_by_policy() {
        let driver = ScriptedDriver::new(ADDRESS).station(vec![Err(LinkFailure::RejectedKey)]);
        let mut connectivity =
            connectivity(driver).retry_policy(RetryPolicy::new().retry_rejected_key());
        connectivity.configure(station());

        assert!(connectivity.connect_once().await.is_err());
        connectivity.tick().await.unwrap();

        assert!(connectivity.state().is_connected());
    }

    #[tokio::test]
    async fn test_new_profile_clears_terminal_failure() {
        let driver = ScriptedDriver::new(ADDRESS).station(vec![Err(LinkFailure::RejectedKey)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(station());

        assert!(connectivity.connect_once().await.is_err());
        connectivity.configure(LinkProfile::Station(Credentials::new("home", "fixed")));
        assert_eq!(connectivity.state(), LinkState::Unconfigured);

        connectivity.tick().await.unwrap();
        assert!(connectivity.state().is_connected());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let mut connectivity = connectivity(ScriptedDriver::new(ADDRESS));

        assert_eq!(connectivity.connect_once().await, Err(Error::Unconfigured));
        connectivity.tick().await.unwrap();

        connectivity.configure(LinkProfile::Station(Credentials::new("", "")));
        assert_eq!(connectivity.connect_once().await, Err(Error::Unconfigured));
        connectivity.tick().await.unwrap();

        assert_eq!(connectivity.state(), LinkState::Unconfigured);
        assert_eq!(connectivity.driver().station_attempts, 0);
        assert_eq!(connectivity.sink().renders.len(), 2);
    }

    #[tokio::test]
    async fn test_wired_profile() {
        let driver = ScriptedDriver::new(ADDRESS).wired(vec![Err(LinkFailure::NoHardware)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(LinkProfile::Wired { mac: [0xDE; 6] });

        assert!(connectivity.connect_once().await.is_err());
        connectivity.tick().await.unwrap();

        assert_eq!(connectivity.transport(), Some(Transport::Wired));
        assert_eq!(connectivity.driver().wired_attempts, 2);
        assert_eq!(
            connectivity.sink().renders[0],
            render("[ERR]", "NO CABLE", 2000)
        );
    }

    #[tokio::test]
    async fn test_combined_fails_over_to_station() {
        let driver = ScriptedDriver::new(ADDRESS).wired(vec![Err(LinkFailure::NoHardware)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(LinkProfile::Combined {
            mac: [0xDE; 6],
            credentials: Credentials::new("home", "password"),
        });

        connectivity.connect_once().await.unwrap();

        assert_eq!(connectivity.transport(), Some(Transport::Station));
        assert_eq!(connectivity.driver().wired_attempts, 1);
        assert_eq!(connectivity.driver().station_attempts, 1);
    }

    #[tokio::test]
    async fn test_combined_rejected_key_stops_by_default() {
        let driver = ScriptedDriver::new(ADDRESS)
            .wired(vec![Err(LinkFailure::NoHardware)])
            .station(vec![Err(LinkFailure::RejectedKey)]);
        let mut connectivity = connectivity(driver);
        connectivity.configure(LinkProfile::Combined {
            mac: [0xDE; 6],
            credentials: Credentials::new("home", "wrong"),
        });

        assert!(connectivity.connect_once().await.is_err());
        connectivity.tick().await.unwrap();

        assert_eq!(connectivity.driver().wired_attempts, 1);
        assert_eq!(
            connectivity.state(),
            LinkState::Failed(LinkFailure::RejectedKey)
        );
    }

    #[tokio::test]
    async fn test_combined_rejected_key_falls_back_to_wired() {
        let driver = ScriptedDriver::new(ADDRESS)
            .wired(vec![Err(LinkFailure::NoHardware)])
            .station(vec![Err(LinkFailure::RejectedKey)]);
        let mut connectivity =
            connectivity(driver).retry_policy(RetryPolicy::new().wired_after_rejected_key());
        connectivity.configure(LinkProfile::Combined {
            mac: [0xDE; 6],
            credentials: Credentials::new("home", "wrong"),
        });

        assert!(connectivity.connect_once().await.is_err());
        connectivity.tick().await.unwrap();

        assert_eq!(connectivity.transport(), Some(Transport::Wired));
        assert_eq!(connectivity.driver().wired_attempts, 2);
        assert_eq!(connectivity.driver().station_attempts, 1);
    }

    #[tokio::test]
    async fn test_unchanged_address_is_not_rendered_again() {
        let mut connectivity = connectivity(ScriptedDriver::new(ADDRESS));
        connectivity.configure(station());
        connectivity.connect_once().await.unwrap();

        for _ in 0..3 {
            connectivity.tick().await.unwrap();
        }
        assert_eq!(connectivity.sink().renders.len(), 1);

        let renewed = Ipv4Addr::new(192, 168, 1, 77);
        connectivity.driver_mut().address = Some(renewed);
        connectivity.tick().await.unwrap();
        connectivity.tick().await.unwrap();

        assert_eq!(connectivity.sink().renders.len(), 2);
        assert_eq!(connectivity.sink().renders[1].1, "192.168.1.77");
        assert_eq!(connectivity.local_address(), Some(renewed));
    }

    #[tokio::test]
    async fn test_connected_without_address() {
        let mut driver = ScriptedDriver::new(ADDRESS);
        driver.address = None;
        let mut connectivity = connectivity(driver);
        connectivity.configure(LinkProfile::Wired { mac: [0; 6] });

        connectivity.connect_once().await.unwrap();

        assert_eq!(
            connectivity.sink().renders,
            vec![render("[ETH]", "OK", 1000)]
        );
    }
}
