//! `dethings-esp32c3` is a library crate for building firmware for
//! `de:things` devices using an `ESP32-C3` microcontroller.
//!
//! It provides the hardware collaborators a [`dethings::device::Device`]
//! needs:
//!
//! - A `Wi-Fi` station link driver, which maps the radio disconnect reasons
//!   onto [`dethings::link::LinkFailure`]s
//! - The network stack builder
//! - A `TCP` client socket serving one client at a time
//!
//! The board has no wired interface, so a wired link attempt always reports
//! that no hardware has been detected.
//!
//! Status messages go through [`dethings::status::LogSink`] driven by
//! [`embassy_time::Delay`], which prints them on the serial console.

#![no_std]
#![deny(missing_docs)]

extern crate alloc;

/// Error management.
pub mod error;
/// The network stack builder.
pub mod net;
/// The single-client `TCP` socket.
pub mod socket;
/// The `Wi-Fi` controller and its link driver.
pub mod wifi;

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

pub(crate) use mk_static;
