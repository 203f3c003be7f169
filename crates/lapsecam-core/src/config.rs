//! Persisted network credential abstraction.

use heapless::String;

/// 802.11 limits; also the capacities of the persisted record fields.
pub const SSID_BYTES: usize = 32;
pub const PASSWORD_BYTES: usize = 64;

/// WiFi credentials surviving power loss.
///
/// Created on first save, read at every boot, mutated only through the
/// save/reset operations of the config surface.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceConfig {
    pub ssid: String<SSID_BYTES>,
    pub password: String<PASSWORD_BYTES>,
}

impl DeviceConfig {
    pub fn new(ssid: &str, password: &str) -> Option<Self> {
        Some(Self {
            ssid: String::try_from(ssid).ok()?,
            password: String::try_from(password).ok()?,
        })
    }

    /// An unconfigured device has no SSID and must enter config mode.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

/// Abstract credential persistence backend.
pub trait ConfigStore {
    type Error: core::fmt::Debug;

    fn load(&mut self) -> Result<Option<DeviceConfig>, Self::Error>;
    fn save(&mut self, config: &DeviceConfig) -> Result<(), Self::Error>;
    fn clear(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ssid_means_unconfigured() {
        assert!(!DeviceConfig::default().is_configured());
        let config = DeviceConfig::new("shed-cam", "hunter22").unwrap();
        assert!(config.is_configured());
    }

    #[test]
    fn oversized_fields_are_refused() {
        let long = "x".repeat(SSID_BYTES + 1);
        assert!(DeviceConfig::new(&long, "pw").is_none());
    }
}
