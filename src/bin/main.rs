#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, Either3, select, select3};
use embassy_net::{Ipv4Address, Stack, StackResources};
use embassy_time::{Duration as EmbassyDuration, Timer, WithTimeout};
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    dma::DmaDescriptor,
    gpio::{Level, Output, OutputConfig},
    i2c::master::I2c,
    lcd_cam::{
        LcdCam,
        cam::{Camera, Config as CamConfig},
    },
    ledc::{
        LSGlobalClkSource, Ledc, LowSpeed,
        channel::{self, ChannelIFace},
        timer::{self, TimerIFace},
    },
    spi::master::Spi,
    time::{Instant, Rate},
    timer::timg::TimerGroup,
};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use lapsecam_core::{
    acquire::{AcquisitionChain, ChainEvent, FailureRoute, InitStep},
    camera::{CameraDevice, CameraProfile, FrameSize},
    clock::WallClock,
    config::{ConfigStore, DeviceConfig},
    context::{DeviceContext, NetMode, NetStatus, NoopLed, StatusLed},
    cycle::{CycleAction, WakeCycle},
    pipeline::capture_and_store,
    service::AfterResponse,
    store::PhotoStore,
};
use lapsecam_hal_esp32s3::{
    camera::DvpCamera,
    network::LinkHandle,
    storage::{
        flash_config::FlashConfigStore,
        sd_card::{FatClock, SdPhotoStore, SdSpiDevice},
    },
};
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;

#[path = "main/clock_sync.rs"]
mod clock_sync;
#[path = "main/dhcp.rs"]
mod dhcp;
#[path = "main/portal.rs"]
mod portal;
#[path = "main/power.rs"]
mod power;
#[path = "main/serve.rs"]
mod serve;

const XCLK_FREQ_MHZ: u32 = 24;
const SD_SPI_FREQ_KHZ: u32 = 400;
const FRAME_BUFFER_BYTES: usize = 192 * 1024;
const COMPACT_FRAME_BYTES: usize = 64 * 1024;
const DMA_DESCRIPTOR_COUNT: usize = 64;
const DHCP_TIMEOUT_SECS: u64 = 15;
const LINK_POLL_INTERVAL_MS: u64 = 500;
const WIFI_RETRY_BACKOFF_MIN_SECS: u64 = 2;
const WIFI_RETRY_BACKOFF_MAX_SECS: u64 = 60;
// Capture names carry civil local time; the deployment site is UTC+8.
const TZ_OFFSET_SECS: u64 = 8 * 3_600;
// time.cloudflare.com; the station stack runs without DNS.
const SNTP_SERVER: Ipv4Address = Ipv4Address::new(162, 159, 200, 1);
const SNTP_TIMEOUT_MS: u64 = 5_000;
const AP_SSID: &str = "lapsecam-setup";
const AP_PASSWORD: &str = "lapse-cam";
const AP_ADDRESS: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);
const STA_NET_SEED: u64 = 0x7C41_90AE_55D2_0B1F;
const AP_NET_SEED: u64 = 0x31E6_0D9C_A8F2_7714;

static LINK: LinkHandle = LinkHandle::new();
static CLOCK: clock_sync::SystemClock = clock_sync::SystemClock::new();
static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

// Frame memory stays in internal RAM where the LCD_CAM DMA can write; the
// compact profile uses a 64 KiB prefix of the same buffer.
static mut FRAME_BUFFER: [u8; FRAME_BUFFER_BYTES] = [0u8; FRAME_BUFFER_BYTES];

#[unsafe(link_section = ".dram2_uninit")]
static mut DMA_DESCRIPTORS: [DmaDescriptor; DMA_DESCRIPTOR_COUNT] =
    [DmaDescriptor::EMPTY; DMA_DESCRIPTOR_COUNT];

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn wifi_retry_backoff_secs(consecutive_failures: u32) -> u64 {
    // 2, 4, 8, 16, 32, 60, 60, ...
    let shift = consecutive_failures.min(5);
    WIFI_RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(WIFI_RETRY_BACKOFF_MAX_SECS)
}

async fn wait_before_wifi_retry(consecutive_failures: &mut u32) {
    let delay_secs = wifi_retry_backoff_secs(*consecutive_failures);
    *consecutive_failures = consecutive_failures.saturating_add(1);
    info!(
        "wifi: retrying in {}s (consecutive_failures={})",
        delay_secs, *consecutive_failures
    );
    Timer::after_secs(delay_secs).await;
}

async fn connect_station(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    link: &LinkHandle,
) -> bool {
    link.mark_connecting();

    if !wifi_controller.is_started().unwrap_or(false) {
        if let Err(err) = wifi_controller.start_async().await {
            warn!("wifi: start failed: {:?}", err);
            link.mark_lost();
            return false;
        }
    }

    if let Err(err) = wifi_controller.connect_async().await {
        warn!("wifi: connect failed: {:?}", err);
        link.mark_lost();
        let _ = wifi_controller.disconnect_async().await;
        return false;
    }

    if stack
        .wait_config_up()
        .with_timeout(EmbassyDuration::from_secs(DHCP_TIMEOUT_SECS))
        .await
        .is_err()
    {
        warn!("wifi: no address within {}s", DHCP_TIMEOUT_SECS);
        link.mark_lost();
        let _ = wifi_controller.disconnect_async().await;
        return false;
    }
    let Some(v4) = stack.config_v4() else {
        link.mark_lost();
        return false;
    };
    let address = v4.address.address();
    info!("wifi: up at {}", address);
    link.mark_up(address.octets());
    true
}

// Keeps the association alive through the serving window; the first connect
// has already happened through the acquisition chain.
async fn station_monitor(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    link: &LinkHandle,
) -> ! {
    let mut consecutive_failures = 0u32;

    loop {
        loop {
            let link_up = stack.is_link_up();
            let has_ipv4 = stack.config_v4().is_some();
            let is_connected = matches!(wifi_controller.is_connected(), Ok(true));

            if !(link_up && has_ipv4 && is_connected) {
                info!(
                    "wifi: state lost (link_up={} has_ipv4={} connected={}); reconnecting",
                    link_up, has_ipv4, is_connected
                );
                break;
            }

            consecutive_failures = 0;
            Timer::after_millis(LINK_POLL_INTERVAL_MS).await;
        }

        link.mark_lost();
        let _ = wifi_controller.disconnect_async().await;
        wait_before_wifi_retry(&mut consecutive_failures).await;
        connect_station(wifi_controller, stack, link).await;
    }
}

// Network and clock steps of the acquisition chain. The caller runs this
// under select with the stack runner; neither step makes progress unless the
// runner is being polled.
async fn acquire_network_and_clock(
    chain: &mut AcquisitionChain,
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
) -> Option<FailureRoute> {
    while chain.current() == Some(InitStep::Network) {
        let up = connect_station(wifi_controller, stack, &LINK).await;
        if let ChainEvent::Failed { route, .. } = chain.report(up) {
            return Some(route);
        }
    }
    while chain.current() == Some(InitStep::Clock) {
        let synced = clock_sync::sync(stack, &CLOCK).await;
        if let ChainEvent::Failed { route, .. } = chain.report(synced) {
            return Some(route);
        }
    }
    None
}

async fn run_wake_cycle<C, S, F, K, L>(
    cycle: &mut WakeCycle,
    ctx: &mut DeviceContext<C, S, F, K, L>,
    stack: Stack<'_>,
    boot: Instant,
) where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
{
    let mut rx_buffer = [0u8; serve::TCP_RX_BYTES];
    let mut tx_buffer = [0u8; serve::TCP_TX_BYTES];
    let mut scratch = [0u8; serve::SCRATCH_BYTES];

    loop {
        match cycle.step(boot.elapsed().as_millis()) {
            CycleAction::Serve => {
                ctx.net = NetStatus {
                    mode: NetMode::Station,
                    ip: LINK.snapshot().ipv4.unwrap_or([0, 0, 0, 0]),
                };
                let after =
                    serve::poll_once(stack, ctx, &mut rx_buffer, &mut tx_buffer, &mut scratch)
                        .await;
                if after == AfterResponse::Restart {
                    info!("cycle: credentials changed; restarting");
                    power::restart().await;
                }
            }
            CycleAction::Capture => {
                ctx.led.set(true);
                match capture_and_store(&mut ctx.camera, &mut ctx.store, &ctx.clock) {
                    Ok(outcome) => info!(
                        "cycle: stored {} ({} bytes, attempt {})",
                        outcome.destination, outcome.bytes_written, outcome.attempts
                    ),
                    Err(err) => warn!("cycle: capture failed: {:?}", err),
                }
                ctx.led.set(false);
                cycle.note_capture(boot.elapsed().as_millis());
            }
            CycleAction::Sleep => break,
        }
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: lapsecam starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let boot = Instant::now();
    let wake_cause = power::boot_wake_cause();
    info!("boot: wake cause {:?}", wake_cause);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    // Probe the optional PSRAM; its presence decides the capture profile,
    // not where the frame lands.
    let (_, psram_bytes) = esp_hal::psram::psram_raw_parts(&peripherals.PSRAM);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let mut config_store = match FlashConfigStore::new() {
        Ok(store) => store,
        Err(err) => {
            warn!("flash: no usable config partition: {:?}", err);
            power::enter_deep_sleep();
        }
    };
    let saved = match config_store.load() {
        Ok(saved) => saved,
        Err(err) => {
            warn!("flash: config read failed: {:?}", err);
            None
        }
    };
    let saved = saved.filter(DeviceConfig::is_configured);

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            warn!("esp-radio init failed: {:?}", err);
            power::enter_deep_sleep();
        }
    };
    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                warn!("wifi peripheral init failed: {:?}", err);
                power::enter_deep_sleep();
            }
        };

    let Some(credentials) = saved else {
        info!("boot: no stored credentials; entering setup mode");
        portal::run(
            wifi_controller,
            interfaces.ap,
            portal::AbsentCamera,
            portal::AbsentStore,
            config_store,
            &CLOCK,
        )
        .await
    };

    // Camera wiring (XIAO ESP32S3 Sense):
    // XCLK=GPIO10, SIOD=GPIO40, SIOC=GPIO39, PCLK=GPIO13, VSYNC=GPIO38, HREF=GPIO47
    // D0-D7=GPIO15, GPIO17, GPIO18, GPIO16, GPIO14, GPIO12, GPIO11, GPIO48
    let mut delay = Delay::new();
    let i2c = I2c::new(peripherals.I2C0, esp_hal::i2c::master::Config::default())
        .unwrap()
        .with_sda(peripherals.GPIO40)
        .with_scl(peripherals.GPIO39);

    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let mut xclk_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    xclk_timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty1Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_mhz(XCLK_FREQ_MHZ),
        })
        .unwrap();
    let mut xclk_channel = ledc.channel(channel::Number::Channel0, peripherals.GPIO10);
    xclk_channel
        .configure(channel::config::Config {
            timer: &xclk_timer,
            duty_pct: 50,
            pin_config: channel::config::PinConfig::PushPull,
        })
        .unwrap();

    let lcd_cam = LcdCam::new(peripherals.LCD_CAM);
    let cam_engine = Camera::new(lcd_cam.cam, peripherals.DMA_CH0, CamConfig::default())
        .unwrap()
        .with_pixel_clock(peripherals.GPIO13)
        .with_vsync(peripherals.GPIO38)
        .with_h_enable(peripherals.GPIO47)
        .with_data0(peripherals.GPIO15)
        .with_data1(peripherals.GPIO17)
        .with_data2(peripherals.GPIO18)
        .with_data3(peripherals.GPIO16)
        .with_data4(peripherals.GPIO14)
        .with_data5(peripherals.GPIO12)
        .with_data6(peripherals.GPIO11)
        .with_data7(peripherals.GPIO48);

    // SD wiring: CS=GPIO21, SCK=GPIO7, MOSI=GPIO9, MISO=GPIO8
    // GPIO21 doubles as the user LED on this board, so the cycle runs with
    // NoopLed and the pin stays dedicated to chip select.
    let sd_cs = Output::new(peripherals.GPIO21, Level::High, OutputConfig::default());
    let sd_spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_khz(SD_SPI_FREQ_KHZ))
        // SD cards in SPI mode use CPOL=0, CPHA=0.
        .with_mode(esp_hal::spi::Mode::_0);
    let sd_spi = Spi::new(peripherals.SPI2, sd_spi_config)
        .unwrap()
        .with_sck(peripherals.GPIO7)
        .with_mosi(peripherals.GPIO9)
        .with_miso(peripherals.GPIO8);

    let profile = CameraProfile::for_memory(psram_bytes > 0);
    info!(
        "camera: frame_size={:?} slots={} psram_bytes={}",
        profile.frame_size, profile.frame_slots, psram_bytes
    );

    let (sta_stack, mut sta_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::<4>::new()),
        STA_NET_SEED,
    );

    let client_config = ClientConfig::default()
        .with_ssid(credentials.ssid.as_str().into())
        .with_password(credentials.password.as_str().into());
    if let Err(err) = wifi_controller.set_config(&ModeConfig::Client(client_config)) {
        warn!("wifi: mode config failed: {:?}", err);
        power::enter_deep_sleep();
    }

    let mut chain = AcquisitionChain::new();
    let mut failure: Option<FailureRoute> = None;

    let frame_limit = match profile.frame_size {
        FrameSize::Uxga => FRAME_BUFFER_BYTES,
        FrameSize::Svga => COMPACT_FRAME_BYTES,
    };
    let descriptors: &'static mut [DmaDescriptor] =
        unsafe { &mut (*core::ptr::addr_of_mut!(DMA_DESCRIPTORS))[..] };
    let frame_store: &'static mut [u8] =
        unsafe { &mut (*core::ptr::addr_of_mut!(FRAME_BUFFER))[..frame_limit] };
    let camera = match DvpCamera::new(
        i2c,
        cam_engine,
        descriptors,
        frame_store,
        &profile,
        &mut delay,
    ) {
        Ok(camera) => {
            let _ = chain.report(true);
            Some(camera)
        }
        Err(err) => {
            warn!("camera: init failed: {:?}", err);
            if let ChainEvent::Failed { route, .. } = chain.report(false) {
                failure = Some(route);
            }
            None
        }
    };

    let mut store = SdPhotoStore::new(
        SdSpiDevice::new(sd_spi, sd_cs),
        Delay::new(),
        FatClock(&CLOCK),
    );
    while failure.is_none() && chain.current() == Some(InitStep::Storage) {
        match store.reinit() {
            Ok(()) => {
                let _ = chain.report(true);
            }
            Err(err) => {
                warn!("sd: mount failed: {:?}", err);
                if let ChainEvent::Failed { route, .. } = chain.report(false) {
                    failure = Some(route);
                }
            }
        }
    }

    if failure.is_none() {
        failure = match select(
            acquire_network_and_clock(&mut chain, &mut wifi_controller, sta_stack),
            sta_runner.run(),
        )
        .await
        {
            Either::First(outcome) => outcome,
            Either::Second(never) => never,
        };
    }

    match failure {
        None => {}
        Some(FailureRoute::ConfigMode) => {
            info!("boot: network unusable; entering setup mode");
            let Some(camera) = camera else {
                power::enter_deep_sleep();
            };
            portal::run(
                wifi_controller,
                interfaces.ap,
                camera,
                store,
                config_store,
                &CLOCK,
            )
            .await
        }
        Some(FailureRoute::Sleep) => {
            let _ = wifi_controller.stop_async().await;
            if let Some(mut camera) = camera {
                if let Err(err) = camera.sensor_mut().standby() {
                    warn!("camera: standby failed: {:?}", err);
                }
            }
            power::enter_deep_sleep();
        }
    }

    let Some(camera) = camera else {
        power::enter_deep_sleep();
    };
    let mut ctx = DeviceContext::new(
        camera,
        store,
        config_store,
        &CLOCK,
        NoopLed,
        NetStatus {
            mode: NetMode::Station,
            ip: [0, 0, 0, 0],
        },
    );
    let mut cycle = WakeCycle::new(wake_cause, boot.elapsed().as_millis());

    match select3(
        run_wake_cycle(&mut cycle, &mut ctx, sta_stack, boot),
        station_monitor(&mut wifi_controller, sta_stack, &LINK),
        sta_runner.run(),
    )
    .await
    {
        Either3::First(()) => {}
        Either3::Second(never) => never,
        Either3::Third(never) => never,
    }

    info!("cycle: window closed");
    // Teardown runs opposite to bring-up: radio down, then the sensor.
    let _ = wifi_controller.disconnect_async().await;
    let _ = wifi_controller.stop_async().await;
    if let Err(err) = ctx.camera.sensor_mut().standby() {
        warn!("camera: standby failed: {:?}", err);
    }
    power::enter_deep_sleep()
}
