//! OV2640 capture over the LCD_CAM DVP engine.
//!
//! The sensor is configured over SCCB ([`ov2640`]) and streams JPEG frames
//! on its parallel bus; the LCD_CAM peripheral clocks that bus into a DMA
//! buffer, one whole VSYNC window per transfer. Starting a transfer consumes
//! the engine and the buffer, so both round-trip through every capture and
//! are reclaimed from the finished (or failed) transfer.

use embedded_hal::{delay::DelayNs, i2c::I2c};
use esp_hal::{
    dma::{DmaBufError, DmaDescriptor, DmaError, DmaRxBuf},
    lcd_cam::cam::Camera,
};
use lapsecam_core::camera::{CameraDevice, CameraProfile, FrameSize};
use log::{debug, warn};
use ov2640::{Config as SensorConfig, Ov2640, Resolution, SCCB_ADDRESS};

/// Errors raised while bringing the capture path up.
#[derive(Debug)]
pub enum SetupError<E> {
    /// SCCB access failed or the probed chip is not an OV2640.
    Sensor(ov2640::Error<E>),
    /// The DMA descriptors cannot cover the frame buffer.
    Buffer(DmaBufError),
}

impl<E> From<ov2640::Error<E>> for SetupError<E> {
    fn from(err: ov2640::Error<E>) -> Self {
        Self::Sensor(err)
    }
}

/// Errors raised by a single capture.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureError {
    /// The descriptor/buffer pair was lost by an earlier failure.
    BufferLost,
    /// The DMA engine rejected the transfer or aborted mid-frame.
    Dma(DmaError),
    /// The transfer completed without JPEG start/end markers.
    NoFrame,
}

/// JPEG camera built from an SCCB-side [`Ov2640`] and a DVP-side
/// [`Camera`] engine.
///
/// The engine, descriptors and buffer are held in `Option`s because a
/// transfer takes ownership of all three; they are put back once the
/// transfer hands them out again.
pub struct DvpCamera<I2C> {
    sensor: Ov2640<I2C>,
    engine: Option<Camera<'static>>,
    descriptors: Option<&'static mut [DmaDescriptor]>,
    buffer: Option<&'static mut [u8]>,
}

impl<I2C: I2c> DvpCamera<I2C> {
    /// Probes and configures the sensor, then validates that the
    /// descriptor slice can cover the frame buffer.
    pub fn new(
        i2c: I2C,
        engine: Camera<'static>,
        descriptors: &'static mut [DmaDescriptor],
        buffer: &'static mut [u8],
        profile: &CameraProfile,
        delay: &mut impl DelayNs,
    ) -> Result<Self, SetupError<I2C::Error>> {
        let mut sensor = Ov2640::new(i2c, SCCB_ADDRESS);
        let id = sensor.probe()?;
        debug!("camera: ov2640 pid={:#04x} ver={:#04x}", id.pid, id.ver);
        sensor.init(&sensor_config(profile), delay)?;

        let rx = DmaRxBuf::new(descriptors, buffer).map_err(SetupError::Buffer)?;
        let (descriptors, buffer) = rx.split();
        Ok(Self {
            sensor,
            engine: Some(engine),
            descriptors: Some(descriptors),
            buffer: Some(buffer),
        })
    }

    /// Register-level access for runtime knobs (flips, quality, standby).
    pub fn sensor_mut(&mut self) -> &mut Ov2640<I2C> {
        &mut self.sensor
    }

    fn restore(&mut self, engine: Camera<'static>, rx: DmaRxBuf) {
        let (descriptors, buffer) = rx.split();
        self.engine = Some(engine);
        self.descriptors = Some(descriptors);
        self.buffer = Some(buffer);
    }
}

impl<I2C: I2c> CameraDevice for DvpCamera<I2C> {
    type Error = CaptureError;

    fn capture(&mut self) -> Result<&[u8], Self::Error> {
        let engine = self.engine.take().ok_or(CaptureError::BufferLost)?;
        let descriptors = self.descriptors.take().ok_or(CaptureError::BufferLost)?;
        let buffer = self.buffer.take().ok_or(CaptureError::BufferLost)?;

        let rx = match DmaRxBuf::new(descriptors, buffer) {
            Ok(rx) => rx,
            Err(err) => {
                // The failed constructor keeps the parts; only the engine
                // survives for the next attempt.
                self.engine = Some(engine);
                warn!("camera: dma buffer rebuild failed: {err:?}");
                return Err(CaptureError::BufferLost);
            }
        };

        let transfer = match engine.receive(rx) {
            Ok(transfer) => transfer,
            Err((err, engine, rx)) => {
                self.restore(engine, rx);
                return Err(CaptureError::Dma(err));
            }
        };
        let (result, engine, rx) = transfer.wait();
        self.restore(engine, rx);
        result.map_err(CaptureError::Dma)?;

        let raw = self.buffer.as_deref().ok_or(CaptureError::BufferLost)?;
        let (start, end) = jpeg_bounds(raw).ok_or(CaptureError::NoFrame)?;
        Ok(&raw[start..end])
    }
}

/// Maps the portable capture profile onto sensor settings.
fn sensor_config(profile: &CameraProfile) -> SensorConfig {
    SensorConfig {
        resolution: match profile.frame_size {
            FrameSize::Uxga => Resolution::Uxga,
            FrameSize::Svga => Resolution::Svga,
        },
        quality: profile.jpeg_quality,
        ..SensorConfig::default()
    }
}

/// Locates the JPEG payload inside a raw DMA capture.
///
/// The engine writes whole VSYNC windows, so the buffer can carry sync
/// bytes before the SOI marker and stale bytes from an older frame after
/// the EOI marker. Entropy-coded JPEG escapes 0xFF as 0xFF 0x00, so the
/// first EOI past the SOI closes the current frame.
fn jpeg_bounds(raw: &[u8]) -> Option<(usize, usize)> {
    let start = raw.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let tail = &raw[start..];
    let end = tail.windows(2).position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + end + 2))
}
