use embassy_futures::select::select3;
use embassy_net::{Ipv4Cidr, StackResources, StaticConfigV4};
use esp_radio::wifi::{ApConfig, AuthMethod, ModeConfig, WifiController, WifiDevice};
use heapless::Vec;
use lapsecam_core::{
    camera::CameraDevice,
    clock::WallClock,
    config::ConfigStore,
    context::{DeviceContext, NetMode, NetStatus, NoopLed},
    naming::PhotoPath,
    service::AfterResponse,
    store::{FrameReader, FrameSink, PhotoList, PhotoStore, StoreError},
};
use log::{info, warn};
use static_cell::StaticCell;

use super::{AP_ADDRESS, AP_NET_SEED, AP_PASSWORD, AP_SSID, dhcp, power, serve};

static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

// Setup mode: WPA2 access point, static address, DHCP for the one visiting
// phone, and the portal's credential pages. Leaves only through a restart
// after a save, or through deep sleep if the radio refuses to come up.
pub(super) async fn run<C, S, F, K>(
    mut controller: WifiController<'_>,
    interface: WifiDevice<'_>,
    camera: C,
    store: S,
    config: F,
    clock: K,
) -> !
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
{
    // The controller may arrive mid-connect from a failed station attempt.
    let _ = controller.stop_async().await;

    let ap_config = ApConfig::default()
        .with_ssid(AP_SSID.into())
        .with_password(AP_PASSWORD.into())
        .with_auth_method(AuthMethod::Wpa2Personal);
    if let Err(err) = controller.set_config(&ModeConfig::Ap(ap_config)) {
        warn!("portal: ap mode config failed: {:?}", err);
        power::enter_deep_sleep();
    }
    if let Err(err) = controller.start_async().await {
        warn!("portal: ap start failed: {:?}", err);
        power::enter_deep_sleep();
    }

    let net_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(AP_ADDRESS, 24),
        gateway: Some(AP_ADDRESS),
        dns_servers: Vec::new(),
    });
    let (stack, mut runner) = embassy_net::new(
        interface,
        net_config,
        AP_RESOURCES.init(StackResources::<4>::new()),
        AP_NET_SEED,
    );
    info!("portal: setup network `{}` up at {}", AP_SSID, AP_ADDRESS);

    let mut ctx = DeviceContext::new(
        camera,
        store,
        config,
        clock,
        NoopLed,
        NetStatus {
            mode: NetMode::AccessPoint,
            ip: AP_ADDRESS.octets(),
        },
    );

    let serve_loop = async {
        let mut rx_buffer = [0u8; serve::TCP_RX_BYTES];
        let mut tx_buffer = [0u8; serve::TCP_TX_BYTES];
        let mut scratch = [0u8; serve::SCRATCH_BYTES];
        loop {
            let after = serve::poll_once(
                stack,
                &mut ctx,
                &mut rx_buffer,
                &mut tx_buffer,
                &mut scratch,
            )
            .await;
            if after == AfterResponse::Restart {
                info!("portal: credentials saved; restarting into station mode");
                power::restart().await;
            }
        }
    };

    let _ = select3(serve_loop, dhcp::serve(stack), runner.run()).await;
    unreachable!()
}

// Stand-ins for hardware the no-credentials boot never initializes. The
// portal gates the photo surface off in access-point mode, so these only
// have to exist, not work.
pub(super) struct AbsentCamera;

#[derive(Debug)]
pub(super) struct Absent;

impl CameraDevice for AbsentCamera {
    type Error = Absent;

    fn capture(&mut self) -> Result<&[u8], Self::Error> {
        Err(Absent)
    }
}

pub(super) struct AbsentStore;

pub(super) struct AbsentIo;

impl FrameSink for AbsentIo {
    type Error = Absent;

    fn write(&mut self, _chunk: &[u8]) -> Result<usize, Self::Error> {
        Err(Absent)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Err(Absent)
    }

    fn close(self) -> Result<(), Self::Error> {
        Err(Absent)
    }
}

impl FrameReader for AbsentIo {
    type Error = Absent;

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Err(Absent)
    }

    fn close(self) -> Result<(), Self::Error> {
        Err(Absent)
    }
}

impl PhotoStore for AbsentStore {
    type Error = Absent;
    type Writer<'a> = AbsentIo;
    type Reader<'a> = AbsentIo;

    fn reinit(&mut self) -> Result<(), Self::Error> {
        Err(Absent)
    }

    fn make_bucket(&mut self, _bucket: &str) -> Result<(), Self::Error> {
        Err(Absent)
    }

    fn bucket_exists(&mut self, _bucket: &str) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn open_writer(&mut self, _path: &PhotoPath) -> Result<Self::Writer<'_>, Self::Error> {
        Err(Absent)
    }

    fn open_reader(
        &mut self,
        _path: &PhotoPath,
    ) -> Result<(Self::Reader<'_>, u32), StoreError<Self::Error>> {
        Err(StoreError::NotFound)
    }

    fn remove(&mut self, _path: &PhotoPath) -> Result<(), StoreError<Self::Error>> {
        Err(StoreError::NotFound)
    }

    fn list_photos(&mut self) -> Result<PhotoList, Self::Error> {
        Err(Absent)
    }
}
