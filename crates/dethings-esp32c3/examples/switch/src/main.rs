#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

extern crate alloc;

use dethings::config::DeviceConfig as SwitchConfig;
use dethings::device::Device;
use dethings::listener::ListenerPoll;
use dethings::status::LogSink;

use esp_hal::Config;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;

use log::{error, info, warn};

use embassy_executor::Spawner;
use embassy_time::{Delay, Timer};

use dethings_esp32c3::{socket::TcpClientSocket, wifi::Wifi};

const MAX_HEAP_SIZE: usize = 64 * 1024;
const MILLISECONDS_TO_WAIT: u64 = 1;

// Port the switch listens on.
const PORT: u16 = 80;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[toml_cfg::toml_config]
struct DeviceConfig {
    #[default("")]
    ssid: &'static str,
    #[default("")]
    password: &'static str,
}

// Turn the relay on.
#[inline]
fn relay_on(relay: &mut Output<'static>) {
    relay.set_high();
    info!("Relay is on!");
}

// Turn the relay off.
#[inline]
fn relay_off(relay: &mut Output<'static>) {
    relay.set_low();
    info!("Relay is off!");
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();

    let config = Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: MAX_HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    info!("ESP RTOS started!");

    let rng = Rng::new();

    // Retrieve device configuration.
    let device_config = DEVICE_CONFIG;

    // In this case, the stack hosts a single socket, the one serving
    // clients.
    let link = Wifi::configure(peripherals.WIFI)
        .expect("Failed to configure Wi-Fi")
        .station::<1>(rng, spawner)
        .expect("Failed to create network stack.");

    let socket = TcpClientSocket::new(link.stack(), PORT);

    // Output relay.
    let mut relay = Output::new(peripherals.GPIO8, Level::Low, OutputConfig::default());

    let config = SwitchConfig::new()
        .device_name("Switch")
        .wifi_credentials(device_config.ssid, device_config.password)
        .response("OFF");

    let mut device = Device::new(config, link, LogSink::new(Delay), Delay, socket);

    match device.start().await {
        Ok(()) => {}
        Err(e) if e.is_retryable() => warn!("Device started without a link: {e}"),
        Err(e) => error!("Device cannot connect until reconfigured: {e}"),
    }

    loop {
        match device.update().await {
            Ok(ListenerPoll::CommandReady(command)) => {
                match command.payload() {
                    "on" => relay_on(&mut relay),
                    "off" => relay_off(&mut relay),
                    "toggle" => relay.toggle(),
                    payload => warn!("Unknown command: {payload}"),
                }

                let state = if relay.is_set_high() { "ON" } else { "OFF" };
                device.set_response(state);
                if let Err(e) = device.respond(state).await {
                    warn!("{e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("{e}"),
        }

        Timer::after_millis(MILLISECONDS_TO_WAIT).await;
    }
}
