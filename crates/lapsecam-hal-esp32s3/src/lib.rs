//! ESP32-S3 hardware bindings for the lapsecam firmware.
//!
//! Everything here talks to real peripherals; the behavior behind these
//! drivers lives in `lapsecam-core` and is tested there against mocks.

#![no_std]

pub mod camera;
pub mod network;
pub mod storage;
