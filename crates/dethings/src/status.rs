use embedded_hal_async::delay::DelayNs;

use log::info;

/// A small character display reporting the device status.
///
/// A status is always made of two lines. The sink holds each status on the
/// display for `hold_ms` milliseconds before returning, so two statuses
/// never interleave.
#[allow(async_fn_in_trait)]
pub trait StatusSink {
    /// Renders a status.
    async fn render(&mut self, line1: &str, line2: &str, hold_ms: u32);
}

/// A [`StatusSink`] writing statuses to the [`log`] facade.
///
/// It plays the role of a serial console on boards without a display.
pub struct LogSink<D: DelayNs> {
    delay: D,
}

impl<D: DelayNs> LogSink<D> {
    /// Creates a [`LogSink`] holding statuses through the given delay.
    #[must_use]
    pub const fn new(delay: D) -> Self {
        Self { delay }
    }
}

impl<D: DelayNs> StatusSink for LogSink<D> {
    async fn render(&mut self, line1: &str, line2: &str, hold_ms: u32) {
        if line2.is_empty() {
            info!("{line1}");
        } else {
            info!("{line1} {line2}");
        }
        self.delay.delay_ms(hold_ms).await;
    }
}
