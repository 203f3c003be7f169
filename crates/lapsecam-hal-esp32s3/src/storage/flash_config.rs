//! WiFi credential persistence in a raw flash sector.
//!
//! The record lives in the last sector of the first suitable data partition,
//! written through the ROM spiflash routines so it works before (and without)
//! any filesystem. Wiping the sector is the factory-reset path.

use core::str;

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use lapsecam_core::config::{ConfigStore, DeviceConfig, PASSWORD_BYTES, SSID_BYTES};

const FLASH_SECTOR_SIZE: u32 = 4096;
const FLASH_CAPACITY_BYTES: usize = 8 * 1024 * 1024;

const CONFIG_MAGIC: u32 = 0x3143_434C; // "LCC1"
const CONFIG_VERSION: u8 = 1;

// magic, version, two field lengths, one reserved byte, then the fields.
const SSID_AT: usize = 8;
const PASSWORD_AT: usize = SSID_AT + SSID_BYTES;
const CHECKSUM_AT: usize = PASSWORD_AT + PASSWORD_BYTES;
const RECORD_LEN: usize = CHECKSUM_AT + 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashConfigError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Corrupted,
    Unsupported,
}

/// Word-granular access to the SPI flash via the ROM routines.
#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashConfigError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashConfigError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashConfigError::Unsupported);
        }

        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    fn write_word(&mut self, addr: u32, word: u32) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        let rc = unsafe { esp_rom_spiflash_write(addr, &word as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(())
    }

    /// Byte read at any alignment; the ROM only reads whole words.
    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashConfigError> {
        let mut cached: Option<(u32, [u8; 4])> = None;
        for (index, slot) in out.iter_mut().enumerate() {
            let byte_addr = addr + index as u32;
            let word_addr = byte_addr & !3;
            let bytes = match cached {
                Some((at, bytes)) if at == word_addr => bytes,
                _ => {
                    let bytes = self.read_word(word_addr)?.to_le_bytes();
                    cached = Some((word_addr, bytes));
                    bytes
                }
            };
            *slot = bytes[(byte_addr & 3) as usize];
        }
        Ok(())
    }

    /// Write a word-aligned, word-sized span into a freshly erased sector.
    fn write_record(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) || !data.len().is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        for (index, chunk) in data.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.write_word(addr + index as u32 * 4, word)?;
        }
        Ok(())
    }
}

// read_partition_table wants a Storage impl; only the read half is real.
impl ReadStorage for RawFlash {
    type Error = FlashConfigError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashConfigError::Unsupported)
    }
}

/// [`ConfigStore`] backed by one flash sector.
#[derive(Debug)]
pub struct FlashConfigStore {
    flash: RawFlash,
    record_addr: u32,
}

impl FlashConfigStore {
    /// Locate the credential sector from the partition table.
    ///
    /// Credentials go to the nvs partition when the table has one, otherwise
    /// to an undefined data partition; the record occupies the last sector so
    /// it never collides with other users of the partition's front.
    pub fn new() -> Result<Self, FlashConfigError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashConfigError::PartitionTable)?;

        let mut nvs: Option<(u32, u32)> = None;
        let mut undefined: Option<(u32, u32)> = None;
        for entry in table.iter() {
            if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
                continue;
            }
            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Nvs) => {
                    nvs = Some((entry.offset(), entry.len()));
                    break;
                }
                PartitionType::Data(DataPartitionSubType::Undefined) => {
                    if undefined.is_none() {
                        undefined = Some((entry.offset(), entry.len()));
                    }
                }
                _ => {}
            }
        }

        let (offset, len) = nvs
            .or(undefined)
            .ok_or(FlashConfigError::PartitionMissing)?;
        if len < FLASH_SECTOR_SIZE {
            return Err(FlashConfigError::PartitionTooSmall);
        }

        Ok(Self {
            flash,
            record_addr: offset + len - FLASH_SECTOR_SIZE,
        })
    }
}

impl ConfigStore for FlashConfigStore {
    type Error = FlashConfigError;

    fn load(&mut self) -> Result<Option<DeviceConfig>, Self::Error> {
        let mut buf = [0u8; RECORD_LEN];
        self.flash.read_bytes(self.record_addr, &mut buf)?;

        // Erased or foreign sector reads as unconfigured, not as an error.
        if buf.iter().all(|b| *b == 0xFF) {
            return Ok(None);
        }
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != CONFIG_MAGIC || buf[4] != CONFIG_VERSION {
            return Ok(None);
        }

        let expected = u32::from_le_bytes([
            buf[CHECKSUM_AT],
            buf[CHECKSUM_AT + 1],
            buf[CHECKSUM_AT + 2],
            buf[CHECKSUM_AT + 3],
        ]);
        if checksum32(&buf[..CHECKSUM_AT]) != expected {
            return Err(FlashConfigError::Corrupted);
        }

        let ssid_len = buf[5] as usize;
        let password_len = buf[6] as usize;
        if ssid_len > SSID_BYTES || password_len > PASSWORD_BYTES {
            return Err(FlashConfigError::Corrupted);
        }

        let ssid = str::from_utf8(&buf[SSID_AT..SSID_AT + ssid_len])
            .map_err(|_| FlashConfigError::Corrupted)?;
        let password = str::from_utf8(&buf[PASSWORD_AT..PASSWORD_AT + password_len])
            .map_err(|_| FlashConfigError::Corrupted)?;
        match DeviceConfig::new(ssid, password) {
            Some(config) => Ok(Some(config)),
            None => Err(FlashConfigError::Corrupted),
        }
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), Self::Error> {
        let mut buf = [0xFFu8; RECORD_LEN];
        buf[0..4].copy_from_slice(&CONFIG_MAGIC.to_le_bytes());
        buf[4] = CONFIG_VERSION;
        buf[5] = config.ssid.len() as u8;
        buf[6] = config.password.len() as u8;
        buf[7] = 0;
        buf[SSID_AT..SSID_AT + config.ssid.len()].copy_from_slice(config.ssid.as_bytes());
        buf[PASSWORD_AT..PASSWORD_AT + config.password.len()]
            .copy_from_slice(config.password.as_bytes());
        let checksum = checksum32(&buf[..CHECKSUM_AT]);
        buf[CHECKSUM_AT..RECORD_LEN].copy_from_slice(&checksum.to_le_bytes());

        self.flash.erase_sector(self.record_addr)?;
        self.flash.write_record(self.record_addr, &buf)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.flash.erase_sector(self.record_addr)
    }
}

fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C_9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}
