use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicU8, Ordering};

use alloc::string::String;

use dethings::link::{Credentials, LinkDriver, LinkFailure};

use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;

use esp_radio::wifi::event::{self, EventExt};
use esp_radio::wifi::{ClientConfig, Config, Interfaces, ModeConfig, WifiController};

use embassy_executor::Spawner;
use embassy_net::Stack;
use embassy_time::{Duration, with_timeout};

use log::{error, info, warn};

use crate::error::Result;
use crate::mk_static;
use crate::net::{NetworkStack, get_ip};

// Maximum time to wait for the access point to accept the station.
const CONNECT_TIMEOUT_MS: u64 = 15 * 1000;

// Maximum time to wait for a `DHCP` lease once associated.
const DHCP_TIMEOUT_MS: u64 = 20 * 1000;

// Disconnect reasons reported by the radio.
const REASON_4WAY_HANDSHAKE_TIMEOUT: u8 = 15;
const REASON_NO_AP_FOUND: u8 = 201;
const REASON_AUTH_FAIL: u8 = 202;
const REASON_HANDSHAKE_TIMEOUT: u8 = 204;
const REASON_NO_AP_FOUND_COMPAT_SECURITY: u8 = 210;
const REASON_NO_AP_FOUND_AUTHMODE_THRESHOLD: u8 = 211;
const REASON_NO_AP_FOUND_RSSI_THRESHOLD: u8 = 212;

// Last disconnect reason reported by the radio, zero when none.
static DISCONNECT_REASON: AtomicU8 = AtomicU8::new(0);

// Maps a radio disconnect reason onto a link failure.
const fn link_failure(reason: u8) -> LinkFailure {
    match reason {
        REASON_NO_AP_FOUND
        | REASON_NO_AP_FOUND_COMPAT_SECURITY
        | REASON_NO_AP_FOUND_AUTHMODE_THRESHOLD
        | REASON_NO_AP_FOUND_RSSI_THRESHOLD => LinkFailure::NoNetwork,
        REASON_4WAY_HANDSHAKE_TIMEOUT | REASON_AUTH_FAIL | REASON_HANDSHAKE_TIMEOUT => {
            LinkFailure::RejectedKey
        }
        _ => LinkFailure::ConnectFailed,
    }
}

/// The `Wi-Fi` controller.
pub struct Wifi {
    controller: WifiController<'static>,
    interfaces: Interfaces<'static>,
}

impl Wifi {
    /// Initializes the radio and configures the `Wi-Fi` controller.
    ///
    /// The radio can only be initialized once.
    ///
    /// # Errors
    ///
    /// Failure to initialize the radio or the `Wi-Fi` driver.
    pub fn configure(peripheral: WIFI<'static>) -> Result<Self> {
        let radio = mk_static!(esp_radio::Controller<'static>, esp_radio::init()?);
        let (controller, interfaces) = esp_radio::wifi::new(radio, peripheral, Config::default())?;

        event::StaDisconnected::update_handler(|event| {
            DISCONNECT_REASON.store(event.reason(), Ordering::Relaxed);
        });

        Ok(Self {
            controller,
            interfaces,
        })
    }

    /// Builds the network stack on the station interface and returns the
    /// [`StationLink`] driving it.
    ///
    /// # Errors
    ///
    /// Failure to build the network stack.
    pub fn station<const SOCKET_STACK_SIZE: usize>(
        self,
        rng: Rng,
        spawner: Spawner,
    ) -> Result<StationLink> {
        let stack = NetworkStack::build::<SOCKET_STACK_SIZE>(rng, self.interfaces.sta, spawner)?;

        Ok(StationLink {
            controller: self.controller,
            stack,
        })
    }
}

/// A [`LinkDriver`] joining `Wi-Fi` networks as a station.
pub struct StationLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl StationLink {
    /// Returns the network stack running on the station interface.
    #[must_use]
    pub const fn stack(&self) -> Stack<'static> {
        self.stack
    }

    async fn associate(&mut self, credentials: &Credentials) -> core::result::Result<(), LinkFailure> {
        if matches!(self.controller.is_connected(), Ok(true)) {
            let _ = self.controller.disconnect_async().await;
        }

        let client_config = ClientConfig::default()
            .with_ssid(String::from(credentials.ssid()))
            .with_password(String::from(credentials.key()));

        self.controller
            .set_config(&ModeConfig::Client(client_config))
            .map_err(|e| {
                error!("Impossible to configure the station: {e:?}");
                LinkFailure::ConnectFailed
            })?;

        if !matches!(self.controller.is_started(), Ok(true)) {
            info!("Starting Wi-Fi...");
            self.controller.start_async().await.map_err(|e| {
                error!("Impossible to start Wi-Fi: {e:?}");
                LinkFailure::ConnectFailed
            })?;
            info!("Wi-Fi started!");
        }

        DISCONNECT_REASON.store(0, Ordering::Relaxed);

        match with_timeout(
            Duration::from_millis(CONNECT_TIMEOUT_MS),
            self.controller.connect_async(),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                let reason = DISCONNECT_REASON.swap(0, Ordering::Relaxed);
                warn!("Failed to connect to Wi-Fi: {e:?} (reason {reason})");
                Err(link_failure(reason))
            }
            Err(_) => {
                warn!("Wi-Fi connection timed out");
                let _ = self.controller.disconnect_async().await;
                Err(LinkFailure::ConnectFailed)
            }
        }
    }
}

impl LinkDriver for StationLink {
    async fn begin_station_link(
        &mut self,
        credentials: &Credentials,
    ) -> core::result::Result<(), LinkFailure> {
        self.associate(credentials).await?;
        info!("Wi-Fi connected!");

        match with_timeout(Duration::from_millis(DHCP_TIMEOUT_MS), get_ip(self.stack)).await {
            Ok(address) => {
                info!("Leased address {address}");
                Ok(())
            }
            Err(_) => {
                warn!("No DHCP lease received");
                let _ = self.controller.disconnect_async().await;
                Err(LinkFailure::ConnectFailed)
            }
        }
    }

    fn is_link_up(&self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.is_link_up()
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.stack
            .config_v4()
            .map(|config| config.address.address())
    }
}
