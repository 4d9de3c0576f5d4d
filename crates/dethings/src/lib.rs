//! `dethings` is the architecture-agnostic core of the firmware running on
//! `de:things` devices.
//!
//! It provides APIs to:
//!
//! - Bring up a network link, either a `Wi-Fi` station or a wired
//!   `Ethernet` interface, and keep it alive by detecting link loss and
//!   reconnecting automatically
//! - Listen for a single client at a time and extract an application
//!   command from the bytes it sends
//! - Authorize a request through its verb and a shared secret
//! - Report every connectivity change on a small status display
//!
//! The crate never talks to hardware directly. A board crate supplies a
//! [`link::LinkDriver`] for the network interface, a
//! [`listener::ClientSocket`] for the inbound connection, and a
//! [`status::StatusSink`] for the display. Every blocking point is an
//! `await` on one of these traits, so a cooperative executor drives the
//! whole device from a single task.
//!
//! A firmware is a loop over [`device::Device::update`]:
//!
//! ```ignore
//! let config = DeviceConfig::new()
//!     .device_name("Lamp")
//!     .wifi_credentials("home", "password");
//!
//! let mut device = Device::new(config, driver, sink, delay, socket);
//! device.start().await;
//!
//! loop {
//!     if let Ok(ListenerPoll::CommandReady(command)) = device.update().await {
//!         // React to `command`.
//!     }
//! }
//! ```
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Request authorization through a verb constraint and a shared secret.
pub mod auth;
/// Device configuration.
pub mod config;
/// The connectivity state machine.
pub mod connectivity;
/// The device context driving connectivity and the request listener.
pub mod device;
/// Error management.
pub mod error;
/// Command framing policies.
pub mod framer;
/// Link drivers and their failures.
pub mod link;
/// The single-client request listener.
pub mod listener;
/// Request verbs and the request head reader.
pub mod request;
/// The plain-text response envelope.
pub mod response;
/// Status reporting.
pub mod status;
