use super::CameraDevice;

const MOCK_FRAME_BYTES: usize = 256;

/// No-hardware frame source used during bring-up.
///
/// Emits a fixed pseudo-JPEG (valid start/end markers around a byte ramp).
#[derive(Debug)]
pub struct MockCamera {
    frame: [u8; MOCK_FRAME_BYTES],
}

impl MockCamera {
    pub fn new() -> Self {
        let mut frame = [0u8; MOCK_FRAME_BYTES];
        for (index, byte) in frame.iter_mut().enumerate() {
            *byte = index as u8;
        }
        frame[0] = 0xFF;
        frame[1] = 0xD8;
        frame[MOCK_FRAME_BYTES - 2] = 0xFF;
        frame[MOCK_FRAME_BYTES - 1] = 0xD9;
        Self { frame }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for MockCamera {
    type Error = core::convert::Infallible;

    fn capture(&mut self) -> Result<&[u8], Self::Error> {
        Ok(&self.frame)
    }
}
