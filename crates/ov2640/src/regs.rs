//! OV2640 register map subset and init sequences for the JPEG path.
//!
//! The sensor multiplexes two register banks through `BANK_SELECT`; every
//! table below starts with a bank select and may switch banks mid-sequence.
//! Values come from the vendor bring-up sequence, condensed to the JPEG/DVP
//! path this crate drives. Registers the datasheet names are named here;
//! the rest is vendor magic carried as-is.

/// Bank multiplexer; present at the same offset in both banks.
pub const BANK_SELECT: u8 = 0xFF;
pub const BANK_DSP: u8 = 0x00;
pub const BANK_SENSOR: u8 = 0x01;

// Sensor bank.
pub const REG04: u8 = 0x04;
pub const COM2: u8 = 0x09;
pub const PID: u8 = 0x0A;
pub const VER: u8 = 0x0B;
pub const CLKRC: u8 = 0x11;
pub const COM7: u8 = 0x12;
pub const COM8: u8 = 0x13;
pub const COM10: u8 = 0x15;

pub const COM2_STANDBY: u8 = 0x10;
pub const COM7_SRST: u8 = 0x80;
pub const REG04_VFLIP: u8 = 0x40;
pub const REG04_HMIRROR: u8 = 0x80;

// DSP bank.
pub const R_BYPASS: u8 = 0x05;
pub const QS: u8 = 0x44;
pub const ZMOW: u8 = 0x5A;
pub const ZMOH: u8 = 0x5B;
pub const ZMHH: u8 = 0x5C;
pub const IMAGE_MODE: u8 = 0xDA;
pub const RESET: u8 = 0xE0;

pub const IMAGE_MODE_JPEG: u8 = 0x10;

/// Product ID the probe expects; VER distinguishes silicon revisions.
pub const PID_OV2640: u8 = 0x26;

/// `(register, value)` pair; a [`BANK_SELECT`] entry switches banks.
pub type RegPair = (u8, u8);

/// Common bring-up after software reset: clock tree, AGC/AEC/AWB, analog
/// conditioning, and the DSP-side defaults shared by every output mode.
pub const SENSOR_BASE: &[RegPair] = &[
    (BANK_SELECT, BANK_DSP),
    (0x2C, 0xFF),
    (0x2E, 0xDF),
    (BANK_SELECT, BANK_SENSOR),
    (0x3C, 0x32),
    (CLKRC, 0x00),
    (COM2, 0x02),
    (REG04, 0x28),
    (COM8, 0xE5),
    (0x14, 0x48),
    (0x2C, 0x0C),
    (0x33, 0x78),
    (0x3A, 0x33),
    (0x3B, 0xFB),
    (0x3E, 0x00),
    (0x43, 0x11),
    (0x16, 0x10),
    (0x39, 0x92),
    (0x35, 0xDA),
    (0x22, 0x1A),
    (0x37, 0xC3),
    (0x23, 0x00),
    (0x34, 0xC0),
    (0x36, 0x1A),
    (0x06, 0x88),
    (0x07, 0xC0),
    (0x0D, 0x87),
    (0x0E, 0x41),
    (0x4C, 0x00),
    (0x48, 0x00),
    (0x5B, 0x00),
    (0x42, 0x03),
    (0x4A, 0x81),
    (0x21, 0x99),
    (0x24, 0x40),
    (0x25, 0x38),
    (0x26, 0x82),
    (0x5C, 0x00),
    (0x63, 0x00),
    (0x61, 0x70),
    (0x62, 0x80),
    (0x7C, 0x05),
    (0x20, 0x80),
    (0x28, 0x30),
    (0x6C, 0x00),
    (0x6D, 0x80),
    (0x6E, 0x00),
    (0x70, 0x02),
    (0x71, 0x94),
    (0x73, 0xC1),
    (BANK_SELECT, BANK_DSP),
    (0xE5, 0x7F),
    (0xF9, 0xC0),
    (0x41, 0x24),
    (RESET, 0x14),
    (0x76, 0xFF),
    (0x33, 0xA0),
    (0x42, 0x20),
    (0x43, 0x18),
    (0x4C, 0x00),
    (0x87, 0xD5),
    (0x88, 0x3F),
    (0xD7, 0x03),
    (0xD9, 0x10),
    (0xD3, 0x82),
    (0xC8, 0x08),
    (0xC9, 0x80),
    (0x7C, 0x00),
    (0x7D, 0x00),
    (0x7C, 0x03),
    (0x7D, 0x48),
    (0x7D, 0x48),
    (0x7C, 0x08),
    (0x7D, 0x20),
    (0x7D, 0x10),
    (0x7D, 0x0E),
    (RESET, 0x00),
];

/// Route the DSP output through the YUV422 path JPEG compression taps.
pub const OUTPUT_YUV422: &[RegPair] = &[
    (BANK_SELECT, BANK_DSP),
    (R_BYPASS, 0x00),
    (IMAGE_MODE, IMAGE_MODE_JPEG),
    (0xD7, 0x03),
    (0xDF, 0x00),
    (0x33, 0x80),
    (0x3C, 0x40),
    (0xE1, 0x77),
    (0x00, 0x00),
];

/// Enable the JPEG encoder proper.
pub const JPEG_MODE: &[RegPair] = &[
    (BANK_SELECT, BANK_DSP),
    (RESET, 0x14),
    (0xE1, 0x77),
    (0xE5, 0x1F),
    (0xD7, 0x03),
    (IMAGE_MODE, IMAGE_MODE_JPEG),
    (RESET, 0x00),
];

/// Sensor window for the 800x600 array readout mode.
pub const WINDOW_SVGA: &[RegPair] = &[
    (BANK_SELECT, BANK_SENSOR),
    (CLKRC, 0x01),
    (COM7, 0x40),
    (0x17, 0x11),
    (0x18, 0x43),
    (0x19, 0x00),
    (0x1A, 0x4B),
    (0x32, 0x09),
    (0x4F, 0xCA),
    (0x50, 0xA8),
    (0x5A, 0x23),
    (0x6D, 0x00),
    (0x3D, 0x38),
];

/// DSP output sizing for 800x600.
pub const OUTPUT_800X600: &[RegPair] = &[
    (BANK_SELECT, BANK_DSP),
    (RESET, 0x04),
    (0xC0, 0x64),
    (0xC1, 0x4B),
    (0x86, 0x35),
    (0x50, 0x00),
    (0x51, 0xC8),
    (0x52, 0x96),
    (0x53, 0x00),
    (0x54, 0x00),
    (0x55, 0x00),
    (0x57, 0x00),
    (ZMOW, 0xC8),
    (ZMOH, 0x96),
    (ZMHH, 0x00),
    (0xD3, 0x02),
    (RESET, 0x00),
];

/// Sensor window for the full 1600x1200 array readout mode.
pub const WINDOW_UXGA: &[RegPair] = &[
    (BANK_SELECT, BANK_SENSOR),
    (CLKRC, 0x00),
    (COM7, 0x00),
    (0x17, 0x11),
    (0x18, 0x75),
    (0x19, 0x01),
    (0x1A, 0x97),
    (0x32, 0x36),
    (0x4F, 0xBB),
    (0x50, 0x9C),
    (0x5A, 0x57),
    (0x6D, 0x80),
    (0x3D, 0x34),
];

/// DSP output sizing for 1600x1200. Width and height carry a ninth bit in
/// `ZMHH` and `VHYX` (0x55).
pub const OUTPUT_1600X1200: &[RegPair] = &[
    (BANK_SELECT, BANK_DSP),
    (RESET, 0x04),
    (0xC0, 0xC8),
    (0xC1, 0x96),
    (0x86, 0x3D),
    (0x50, 0x00),
    (0x51, 0x90),
    (0x52, 0x2C),
    (0x53, 0x00),
    (0x54, 0x00),
    (0x55, 0x88),
    (0x57, 0x00),
    (ZMOW, 0x90),
    (ZMOH, 0x2C),
    (ZMHH, 0x05),
    (0xD3, 0x02),
    (RESET, 0x00),
];

/// Validated QS quantizer scale for a user-facing quality, 1..=63; lower is
/// finer.
#[inline]
pub fn quality_to_qs(quality: u8) -> Option<u8> {
    (1..=63).contains(&quality).then_some(quality)
}

/// `ZMOW`/`ZMOH`/`ZMHH` triple for an output size in pixels.
///
/// Both dimensions are stored in quarter-pixel units with their high bits
/// packed into `ZMHH`; returns `None` for sizes the registers cannot encode.
#[inline]
pub fn output_words(width: u16, height: u16) -> Option<(u8, u8, u8)> {
    if width % 4 != 0 || height % 4 != 0 {
        return None;
    }
    let w = width / 4;
    let h = height / 4;
    if w > 0x3FF || h > 0x1FF {
        return None;
    }
    let zmhh = ((w >> 8) as u8 & 0x03) | (((h >> 8) as u8 & 0x01) << 2);
    Some((w as u8, h as u8, zmhh))
}
