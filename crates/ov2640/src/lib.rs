#![cfg_attr(not(test), no_std)]

//! OV2640 2-megapixel camera sensor control primitives (SCCB side).
//!
//! Pixel data leaves the sensor over its parallel DVP bus and never passes
//! through here; this driver owns only the register interface: probing, the
//! JPEG bring-up sequence, output sizing, and the runtime knobs boards
//! actually touch. The board glue supplies XCLK and the DVP capture engine.

pub mod regs;

use embedded_hal::{delay::DelayNs, i2c::I2c};

/// Default SCCB address (7-bit).
pub const SCCB_ADDRESS: u8 = 0x30;

/// JPEG output resolutions wired up by this driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// 800x600.
    Svga,
    /// 1600x1200, the full pixel array.
    Uxga,
}

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    pub resolution: Resolution,
    /// JPEG quantizer scale, 1..=63; lower is finer.
    pub quality: u8,
    pub vflip: bool,
    pub hmirror: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::Uxga,
            quality: 12,
            vflip: false,
            hmirror: false,
        }
    }
}

/// Driver errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error<I2cErr> {
    /// SCCB transaction failed.
    Bus(I2cErr),
    /// The probed chip did not identify as an OV2640.
    WrongChip { pid: u8, ver: u8 },
    /// Input parameters are outside supported bounds.
    InvalidInput,
}

/// Identity read back by [`Ov2640::probe`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChipId {
    pub pid: u8,
    pub ver: u8,
}

/// OV2640 SCCB driver.
#[derive(Debug)]
pub struct Ov2640<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ov2640<I2C> {
    /// Creates a new driver instance.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Releases the owned bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Reads and checks the chip identity registers.
    pub fn probe(&mut self) -> Result<ChipId, Error<I2C::Error>> {
        self.select_bank(regs::BANK_SENSOR)?;
        let pid = self.read_reg(regs::PID)?;
        let ver = self.read_reg(regs::VER)?;
        if pid != regs::PID_OV2640 {
            return Err(Error::WrongChip { pid, ver });
        }
        Ok(ChipId { pid, ver })
    }

    /// Issues a software reset and waits out the settle time.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<I2C::Error>> {
        self.select_bank(regs::BANK_SENSOR)?;
        self.write_reg(regs::COM7, regs::COM7_SRST)?;
        delay.delay_ms(10);
        Ok(())
    }

    /// Enters register-controlled standby (`COM2[4]`). SCCB stays live in
    /// this state; the reset inside [`Ov2640::init`] brings the part back.
    pub fn standby(&mut self) -> Result<(), Error<I2C::Error>> {
        self.select_bank(regs::BANK_SENSOR)?;
        let current = self.read_reg(regs::COM2)?;
        self.write_reg(regs::COM2, current | regs::COM2_STANDBY)
    }

    /// Full JPEG-path bring-up in the vendor sequence order: reset, base
    /// tables, YUV422 routing, JPEG encoder, then sizing and knobs.
    ///
    /// The sensor emits a few garbage frames after reconfiguration; the
    /// trailing delay covers them.
    pub fn init(
        &mut self,
        config: &Config,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<I2C::Error>> {
        self.reset(delay)?;
        self.load(regs::SENSOR_BASE)?;
        delay.delay_ms(10);
        self.load(regs::OUTPUT_YUV422)?;
        self.load(regs::JPEG_MODE)?;
        self.set_resolution(config.resolution)?;
        self.set_jpeg_quality(config.quality)?;
        self.set_vflip(config.vflip)?;
        self.set_hmirror(config.hmirror)?;
        delay.delay_ms(30);
        Ok(())
    }

    /// Switches the sensor window and DSP output sizing together.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), Error<I2C::Error>> {
        match resolution {
            Resolution::Svga => {
                self.load(regs::WINDOW_SVGA)?;
                self.load(regs::OUTPUT_800X600)
            }
            Resolution::Uxga => {
                self.load(regs::WINDOW_UXGA)?;
                self.load(regs::OUTPUT_1600X1200)
            }
        }
    }

    pub fn set_jpeg_quality(&mut self, quality: u8) -> Result<(), Error<I2C::Error>> {
        let qs = regs::quality_to_qs(quality).ok_or(Error::InvalidInput)?;
        self.select_bank(regs::BANK_DSP)?;
        self.write_reg(regs::QS, qs)
    }

    pub fn set_vflip(&mut self, on: bool) -> Result<(), Error<I2C::Error>> {
        self.update_reg04(regs::REG04_VFLIP, on)
    }

    pub fn set_hmirror(&mut self, on: bool) -> Result<(), Error<I2C::Error>> {
        self.update_reg04(regs::REG04_HMIRROR, on)
    }

    fn update_reg04(&mut self, bit: u8, on: bool) -> Result<(), Error<I2C::Error>> {
        self.select_bank(regs::BANK_SENSOR)?;
        let current = self.read_reg(regs::REG04)?;
        let next = if on { current | bit } else { current & !bit };
        self.write_reg(regs::REG04, next)
    }

    fn load(&mut self, table: &[regs::RegPair]) -> Result<(), Error<I2C::Error>> {
        for &(reg, value) in table {
            self.write_raw(reg, value)?;
        }
        Ok(())
    }

    fn select_bank(&mut self, bank: u8) -> Result<(), Error<I2C::Error>> {
        self.write_raw(regs::BANK_SELECT, bank)
    }

    /// Register write within the currently selected bank.
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.write_raw(reg, value)
    }

    fn write_raw(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.address, &[reg, value]).map_err(Error::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut value = [0u8];
        self.i2c
            .write_read(self.address, &[reg], &mut value)
            .map_err(Error::Bus)?;
        Ok(value[0])
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorType, I2c, Operation};

    use super::*;

    /// Flat register map standing in for the SCCB endpoint: records every
    /// register write, answers reads from the map.
    struct ScriptedBus {
        regs: [u8; 256],
        writes: Vec<(u8, u8)>,
    }

    impl ScriptedBus {
        fn new() -> Self {
            Self {
                regs: [0; 256],
                writes: Vec::new(),
            }
        }
    }

    impl ErrorType for ScriptedBus {
        type Error = core::convert::Infallible;
    }

    impl I2c for ScriptedBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut pointed = 0u8;
            for op in operations {
                match op {
                    Operation::Write(bytes) => match **bytes {
                        [reg, value] => {
                            self.regs[usize::from(reg)] = value;
                            self.writes.push((reg, value));
                        }
                        [reg] => pointed = reg,
                        _ => {}
                    },
                    Operation::Read(buf) => buf[0] = self.regs[usize::from(pointed)],
                }
            }
            Ok(())
        }
    }

    #[test]
    fn standby_sets_com2_standby_in_the_sensor_bank() {
        let mut bus = ScriptedBus::new();
        // Drive-strength bits as left by the bring-up tables.
        bus.regs[usize::from(regs::COM2)] = 0x02;

        let mut sensor = Ov2640::new(bus, SCCB_ADDRESS);
        sensor.standby().unwrap();

        let bus = sensor.release();
        assert_eq!(bus.writes[0], (regs::BANK_SELECT, regs::BANK_SENSOR));
        assert_eq!(
            bus.writes.last().copied(),
            Some((regs::COM2, regs::COM2_STANDBY | 0x02))
        );
    }
}
