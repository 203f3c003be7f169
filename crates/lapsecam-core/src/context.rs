//! Device context owning the cycle's exclusive resources.

use crate::camera::CameraDevice;
use crate::clock::WallClock;
use crate::config::ConfigStore;
use crate::store::PhotoStore;

/// Status LED seam; the firmware maps it onto a GPIO.
pub trait StatusLed {
    fn set(&mut self, on: bool);
}

/// LED-less boards.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLed;

impl StatusLed for NoopLed {
    fn set(&mut self, _on: bool) {}
}

/// How the device is currently reachable, for the status page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetMode {
    Station,
    AccessPoint,
}

/// Network snapshot published by the firmware's connection task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetStatus {
    pub mode: NetMode,
    pub ip: [u8; 4],
}

impl NetStatus {
    pub const fn unconfigured() -> Self {
        Self {
            mode: NetMode::AccessPoint,
            ip: [0, 0, 0, 0],
        }
    }
}

/// Exclusive owner of the camera, storage, config store, clock, and LED for
/// one wake cycle. Constructed once per boot; no process-wide singletons.
pub struct DeviceContext<C, S, F, K, L>
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
{
    pub camera: C,
    pub store: S,
    pub config: F,
    pub clock: K,
    pub led: L,
    pub net: NetStatus,
}

impl<C, S, F, K, L> DeviceContext<C, S, F, K, L>
where
    C: CameraDevice,
    S: PhotoStore,
    F: ConfigStore,
    K: WallClock,
    L: StatusLed,
{
    pub fn new(camera: C, store: S, config: F, clock: K, led: L, net: NetStatus) -> Self {
        Self {
            camera,
            store,
            config,
            clock,
            led,
            net,
        }
    }
}
