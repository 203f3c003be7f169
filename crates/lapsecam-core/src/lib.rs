#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Hardware-independent logic for the lapsecam periodic camera.
//!
//! Everything here runs in host tests: the wake cycle, the resource
//! acquisition chain, the capture pipeline, the photo service, and the
//! naming/clock/config plumbing they share. Hardware enters only through the
//! traits in [`camera`], [`store`], [`config`], [`clock`], and [`context`];
//! the esp32s3 crate provides the real implementations and the firmware
//! binary wires them together.

pub mod acquire;
pub mod camera;
pub mod clock;
pub mod config;
pub mod context;
pub mod cycle;
pub mod http;
pub mod naming;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod store;
