use alloc::string::String;

use embedded_hal_async::delay::DelayNs;

use log::{info, warn};

use crate::config::DeviceConfig;
use crate::connectivity::{Connectivity, LinkState};
use crate::error::Result;
use crate::link::{Credentials, LinkDriver, LinkProfile};
use crate::listener::{ClientSocket, ListenerPoll, RequestListener};
use crate::status::StatusSink;

/// A `de:things` device.
///
/// It is the context every scheduler cycle works on: it owns the
/// [`Connectivity`] state machine and the [`RequestListener`], so several
/// devices can live side by side in the same program.
pub struct Device<L, S, D, C>
where
    L: LinkDriver,
    S: StatusSink,
    D: DelayNs,
    C: ClientSocket,
{
    connectivity: Connectivity<L, S, D>,
    listener: RequestListener<C>,
}

impl<L, S, D, C> Device<L, S, D, C>
where
    L: LinkDriver,
    S: StatusSink,
    D: DelayNs,
    C: ClientSocket,
{
    /// Creates a [`Device`] from its [`DeviceConfig`] and its hardware
    /// collaborators.
    #[must_use]
    pub fn new(config: DeviceConfig, driver: L, sink: S, delay: D, socket: C) -> Self {
        let mut connectivity = Connectivity::new(driver, sink, delay)
            .device_name(&config.device_name)
            .retry_policy(config.retry_policy)
            .retry_delay(config.retry_delay_ms);

        if let Some(profile) = config.link_profile() {
            connectivity.configure(profile);
        }

        let mut listener = RequestListener::new(socket, config.framing)
            .delimiter(config.delimiter)
            .max_command_len(config.max_command_len)
            .max_idle_polls(config.max_idle_polls);

        if let Some(gate) = config.gate {
            listener = listener.auth_gate(gate);
        }
        listener.set_response(&config.response);

        Self {
            connectivity,
            listener,
        }
    }

    /// Starts the device.
    ///
    /// Shows the boot banner, makes the first connection attempt, and
    /// shows the resulting state.
    ///
    /// # Errors
    ///
    /// The errors of [`Connectivity::connect_once`]. The device keeps
    /// retrying through [`Self::update`].
    pub async fn start(&mut self) -> Result<()> {
        let name = String::from(self.connectivity.name());
        info!("Starting device {name}");
        self.connectivity.render("[INIT]", &name, 2000).await;

        let selected = self.connectivity.profile().map_or("NONE", LinkProfile::label);
        info!("Selected {selected} profile");
        self.connectivity.render("[SELECTED]", selected, 2000).await;

        let connected = self.connectivity.connect_once().await;
        if connected.is_err() {
            self.connectivity.show_state_message().await;
        }
        connected
    }

    /// Runs one scheduler cycle.
    ///
    /// Keeps the link alive and then serves the current client, if any.
    /// A client whose command has not been answered through
    /// [`Self::respond`] receives the default response first.
    ///
    /// # Errors
    ///
    /// - The errors of [`Connectivity::tick`], unless a client is being
    ///   served
    /// - The errors of [`RequestListener::poll_for_client`]
    pub async fn update(&mut self) -> Result<ListenerPoll> {
        if let Err(e) = self.connectivity.tick().await {
            if !self.listener.is_reading() && !self.listener.awaits_response() {
                return Err(e);
            }
            warn!("Serving the current client despite a link error: {e}");
        }

        self.listener
            .poll_for_client(self.connectivity.state())
            .await
    }

    /// Returns the last command received from a client.
    ///
    /// Returns an empty string while a client is being served.
    #[must_use]
    pub fn command(&self) -> &str {
        self.listener.command()
    }

    /// Sets the default response body, sent to clients which are not
    /// answered through [`Self::respond`].
    pub fn set_response(&mut self, body: &str) {
        self.listener.set_response(body);
    }

    /// Answers the client of the last command with the given body.
    ///
    /// # Errors
    ///
    /// The errors of [`RequestListener::respond`].
    pub async fn respond(&mut self, body: &str) -> Result<()> {
        self.listener.respond(body).await
    }

    /// Sets the [`LinkProfile`] used by the next connection attempt.
    pub fn configure(&mut self, profile: LinkProfile) {
        self.connectivity.configure(profile);
    }

    /// Sets the `Wi-Fi` credentials used by the next connection attempt.
    ///
    /// A configured wired interface is kept and tried first.
    pub fn set_wifi_credentials(&mut self, ssid: &str, key: &str) {
        let credentials = Credentials::new(ssid, key);
        let profile = match self.connectivity.profile() {
            Some(LinkProfile::Wired { mac } | LinkProfile::Combined { mac, .. })
                if !credentials.is_empty() =>
            {
                LinkProfile::Combined {
                    mac: *mac,
                    credentials,
                }
            }
            Some(LinkProfile::Wired { mac } | LinkProfile::Combined { mac, .. }) => {
                LinkProfile::Wired { mac: *mac }
            }
            Some(LinkProfile::Station(_)) | None => LinkProfile::Station(credentials),
        };
        self.configure(profile);
    }

    /// Returns the current [`LinkState`].
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.connectivity.state()
    }

    /// Returns the device name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.connectivity.name()
    }

    /// Returns the [`Connectivity`] state machine.
    #[must_use]
    pub const fn connectivity(&self) -> &Connectivity<L, S, D> {
        &self.connectivity
    }

    /// Returns the [`RequestListener`].
    #[must_use]
    pub const fn listener(&self) -> &RequestListener<C> {
        &self.listener
    }
}
