//! Camera abstraction layer.

pub mod mock;

/// Sensor output resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameSize {
    /// 1600x1200.
    Uxga,
    /// 800x600.
    Svga,
}

/// Fixed capture configuration applied during camera acquisition.
///
/// Static data, not branching logic: the acquisition chain picks one of the
/// two profiles from the spare-memory probe and hands it to the driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CameraProfile {
    pub frame_size: FrameSize,
    pub jpeg_quality: u8,
    pub frame_slots: u8,
}

impl CameraProfile {
    /// Full-resolution profile; needs spare high-speed memory for the frame.
    pub const fn preferred() -> Self {
        Self {
            frame_size: FrameSize::Uxga,
            jpeg_quality: 12,
            frame_slots: 2,
        }
    }

    /// Reduced profile used when only internal memory is available.
    pub const fn compact() -> Self {
        Self {
            frame_size: FrameSize::Svga,
            jpeg_quality: 12,
            frame_slots: 1,
        }
    }

    pub const fn for_memory(spare_frame_memory: bool) -> Self {
        if spare_frame_memory {
            Self::preferred()
        } else {
            Self::compact()
        }
    }
}

/// One-frame-at-a-time capture source.
///
/// The returned slice borrows the driver's frame buffer; the borrow ending is
/// the frame release, so a frame is handed back exactly once per capture and
/// the driver may reuse the buffer on the next call.
pub trait CameraDevice {
    type Error: core::fmt::Debug;

    fn capture(&mut self) -> Result<&[u8], Self::Error>;
}
