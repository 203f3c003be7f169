//! Persistent storage drivers: raw-flash credentials and SD card photos.

pub mod flash_config;
pub mod sd_card;
