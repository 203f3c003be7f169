//! SD card photo store over SPI.
//!
//! Logical photo paths are minute-stamped (`/2025_W34/2025_08_23_14_30.jpg`)
//! but the card is FAT with 8.3 names, so files are stored under an
//! eight-hex-digit stem of their capture minute (`3549B1CE.JPG`). Bucket
//! directories fit 8.3 natively. The mapping is invertible, which keeps the
//! listing scan free of any side index.

use core::str;

use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{Error as SpiErrorTrait, ErrorKind, ErrorType, Operation, SpiBus, SpiDevice},
};
use embedded_sdmmc::{
    Directory, File, FilenameError, Mode, SdCard, SdCardError, ShortFileName, TimeSource,
    Timestamp, Volume, VolumeIdx, VolumeManager,
};
use heapless::{String, Vec};
use log::debug;

use lapsecam_core::clock::{UtcTime, WallClock};
use lapsecam_core::naming::{self, BUCKET_BYTES, PhotoPath};
use lapsecam_core::store::{FrameReader, FrameSink, PhotoEntry, PhotoList, PhotoStore, StoreError};

/// Filesystem error type; everything in this module speaks it directly.
pub type SdError = embedded_sdmmc::Error<SdCardError>;

/// Week directories visited per listing scan; a card holding more weeks than
/// this gets a truncated listing.
const MAX_LIST_BUCKETS: usize = 32;

type SdVolume<'a, S, D, T> = Volume<'a, SdCard<S, D>, T, 4, 4, 1>;
type SdDir<'a, S, D, T> = Directory<'a, SdCard<S, D>, T, 4, 4, 1>;
type SdFile<'a, S, D, T> = File<'a, SdCard<S, D>, T, 4, 4, 1>;

/// SPI device wrapper owning the bus and chip-select line.
///
/// The SD card is the only client of its bus on this board, so no sharing
/// protocol is needed; the wrapper just frames each transaction with CS.
pub struct SdSpiDevice<BUS, CS> {
    bus: BUS,
    cs: CS,
}

#[derive(Debug)]
pub enum SdSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    Bus(BusErr),
    Cs(CsErr),
    DelayUnsupported,
}

impl<BusErr, CsErr> SpiErrorTrait for SdSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl<BUS, CS> SdSpiDevice<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
{
    pub fn new(bus: BUS, cs: CS) -> Self {
        Self { bus, cs }
    }

    fn run_ops(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), SdSpiError<BUS::Error, CS::Error>> {
        for operation in operations {
            match operation {
                Operation::Read(buf) => self.bus.read(buf).map_err(SdSpiError::Bus)?,
                Operation::Write(buf) => self.bus.write(buf).map_err(SdSpiError::Bus)?,
                Operation::Transfer(read, write) => {
                    self.bus.transfer(read, write).map_err(SdSpiError::Bus)?
                }
                Operation::TransferInPlace(buf) => {
                    self.bus.transfer_in_place(buf).map_err(SdSpiError::Bus)?
                }
                Operation::DelayNs(_) => return Err(SdSpiError::DelayUnsupported),
            }
        }
        self.bus.flush().map_err(SdSpiError::Bus)
    }
}

impl<BUS, CS> ErrorType for SdSpiDevice<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    type Error = SdSpiError<BUS::Error, CS::Error>;
}

impl<BUS, CS> SpiDevice<u8> for SdSpiDevice<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(SdSpiError::Cs)?;
        let result = self.run_ops(operations);
        // CS must rise even after a failed operation.
        let release = self.cs.set_high().map_err(SdSpiError::Cs);
        result.and(release)
    }
}

/// FAT timestamps from the synced wall clock; epoch placeholder before sync.
#[derive(Clone, Copy, Debug)]
pub struct FatClock<K: WallClock>(pub K);

impl<K: WallClock> TimeSource for FatClock<K> {
    fn get_timestamp(&self) -> Timestamp {
        let Some(t) = self.0.now() else {
            return Timestamp {
                year_since_1970: 0,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            };
        };
        Timestamp {
            year_since_1970: (t.year - 1970) as u8,
            zero_indexed_month: t.month - 1,
            zero_indexed_day: t.day - 1,
            hours: t.hour,
            minutes: t.minute,
            seconds: t.second,
        }
    }
}

/// [`PhotoStore`] over an SPI SD card.
///
/// Card acquisition is lazy; `reinit` forces a fresh negotiation and doubles
/// as the mount probe during resource acquisition.
pub struct SdPhotoStore<S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    vm: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdPhotoStore<S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    pub fn new(spi: S, delay: D, clock: T) -> Self {
        Self {
            vm: VolumeManager::new(SdCard::new(spi, delay), clock),
        }
    }
}

/// Open handle chain for one file write; closing unwinds it leaf to volume.
pub struct SdWriter<'a, S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    file: SdFile<'a, S, D, T>,
    bucket: Option<SdDir<'a, S, D, T>>,
    root: SdDir<'a, S, D, T>,
    volume: SdVolume<'a, S, D, T>,
}

impl<S, D, T> FrameSink for SdWriter<'_, S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    type Error = SdError;

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Self::Error> {
        self.file.write(chunk)?;
        Ok(chunk.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.flush()
    }

    fn close(self) -> Result<(), Self::Error> {
        self.file.close()?;
        if let Some(bucket) = self.bucket {
            bucket.close()?;
        }
        self.root.close()?;
        self.volume.close()
    }
}

/// Open handle chain for one file read.
pub struct SdReader<'a, S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    file: SdFile<'a, S, D, T>,
    bucket: Option<SdDir<'a, S, D, T>>,
    root: SdDir<'a, S, D, T>,
    volume: SdVolume<'a, S, D, T>,
}

impl<S, D, T> FrameReader for SdReader<'_, S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    type Error = SdError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.file.is_eof() {
            return Ok(0);
        }
        self.file.read(buf)
    }

    fn close(self) -> Result<(), Self::Error> {
        self.file.close()?;
        if let Some(bucket) = self.bucket {
            bucket.close()?;
        }
        self.root.close()?;
        self.volume.close()
    }
}

impl<S, D, T> PhotoStore for SdPhotoStore<S, D, T>
where
    S: SpiDevice<u8>,
    D: DelayNs,
    T: TimeSource,
{
    type Error = SdError;
    type Writer<'a>
        = SdWriter<'a, S, D, T>
    where
        Self: 'a;
    type Reader<'a>
        = SdReader<'a, S, D, T>
    where
        Self: 'a;

    fn reinit(&mut self) -> Result<(), Self::Error> {
        self.vm.device(|card| card.mark_card_uninit());
        let bytes = self
            .vm
            .device(|card| card.num_bytes())
            .map_err(SdError::DeviceError)?;
        debug!("sd: card reports {bytes} bytes");
        Ok(())
    }

    fn make_bucket(&mut self, bucket: &str) -> Result<(), Self::Error> {
        let volume = self.vm.open_volume(VolumeIdx(0))?;
        let root = volume.open_root_dir()?;
        let result = match root.make_dir_in_dir(bucket) {
            Ok(()) | Err(SdError::DirAlreadyExists) => Ok(()),
            Err(err) => Err(err),
        };
        root.close()?;
        volume.close()?;
        result
    }

    fn bucket_exists(&mut self, bucket: &str) -> Result<bool, Self::Error> {
        let volume = self.vm.open_volume(VolumeIdx(0))?;
        let root = volume.open_root_dir()?;
        let result = match root.open_dir(bucket) {
            Ok(dir) => dir.close().map(|()| true),
            Err(SdError::NotFound) => Ok(false),
            Err(err) => Err(err),
        };
        root.close()?;
        volume.close()?;
        result
    }

    fn open_writer(&mut self, path: &PhotoPath) -> Result<Self::Writer<'_>, Self::Error> {
        let (bucket, leaf) = path.split();
        let name = physical_name(leaf)
            .ok_or(SdError::FilenameError(FilenameError::InvalidCharacter))?;

        let volume = self.vm.open_volume(VolumeIdx(0))?;
        let root = volume.open_root_dir()?;
        let (bucket, file) = match bucket {
            Some(bucket) => {
                let dir = root.open_dir(bucket)?;
                let file = dir.open_file_in_dir(name.as_str(), Mode::ReadWriteCreateOrTruncate)?;
                (Some(dir), file)
            }
            None => (
                None,
                root.open_file_in_dir(name.as_str(), Mode::ReadWriteCreateOrTruncate)?,
            ),
        };
        Ok(SdWriter {
            file,
            bucket,
            root,
            volume,
        })
    }

    fn open_reader(
        &mut self,
        path: &PhotoPath,
    ) -> Result<(Self::Reader<'_>, u32), StoreError<Self::Error>> {
        let (bucket, leaf) = path.split();
        // Every stored photo has a minute-stamped name; anything else cannot
        // be on the card.
        let Some(name) = physical_name(leaf) else {
            return Err(StoreError::NotFound);
        };

        let volume = self.vm.open_volume(VolumeIdx(0)).map_err(classify)?;
        let root = volume.open_root_dir().map_err(classify)?;
        let (bucket, file) = match bucket {
            Some(bucket) => {
                let dir = root.open_dir(bucket).map_err(classify)?;
                let file = dir
                    .open_file_in_dir(name.as_str(), Mode::ReadOnly)
                    .map_err(classify)?;
                (Some(dir), file)
            }
            None => (
                None,
                root.open_file_in_dir(name.as_str(), Mode::ReadOnly)
                    .map_err(classify)?,
            ),
        };
        let length = file.length();
        Ok((
            SdReader {
                file,
                bucket,
                root,
                volume,
            },
            length,
        ))
    }

    fn remove(&mut self, path: &PhotoPath) -> Result<(), StoreError<Self::Error>> {
        let (bucket, leaf) = path.split();
        let Some(name) = physical_name(leaf) else {
            return Err(StoreError::NotFound);
        };

        let volume = self.vm.open_volume(VolumeIdx(0)).map_err(classify)?;
        let root = volume.open_root_dir().map_err(classify)?;
        let bucket = match bucket {
            Some(bucket) => Some(root.open_dir(bucket).map_err(classify)?),
            None => None,
        };

        let target = bucket.as_ref().unwrap_or(&root);
        let result = target.delete_file_in_dir(name.as_str()).map_err(classify);

        if let Some(bucket) = bucket {
            bucket.close().map_err(StoreError::Backend)?;
        }
        root.close().map_err(StoreError::Backend)?;
        volume.close().map_err(StoreError::Backend)?;
        result
    }

    fn list_photos(&mut self) -> Result<PhotoList, Self::Error> {
        let mut list = PhotoList::new();
        let volume = self.vm.open_volume(VolumeIdx(0))?;
        let root = volume.open_root_dir()?;

        // Root pass first: loose photos plus the bucket directories to visit.
        // Directories cannot be opened from inside the iteration callback, so
        // bucket names are collected and walked afterwards.
        let mut buckets: Vec<String<BUCKET_BYTES>, MAX_LIST_BUCKETS> = Vec::new();
        let mut bucket_overflow = false;
        root.iterate_dir(|entry| {
            if entry.attributes.is_directory() {
                if let Some(bucket) = bucket_of(&entry.name) {
                    bucket_overflow |= buckets.push(bucket).is_err();
                }
            } else if let Some(minutes) = photo_minutes(&entry.name) {
                list.push_entry(PhotoEntry {
                    path: PhotoPath::compose(None, &UtcTime::from_unix(minutes * 60)),
                    size: entry.size,
                });
            }
        })?;

        for bucket in &buckets {
            let dir = match root.open_dir(bucket.as_str()) {
                Ok(dir) => dir,
                Err(SdError::NotFound) => continue,
                Err(err) => return Err(err),
            };
            dir.iterate_dir(|entry| {
                if entry.attributes.is_directory() {
                    return;
                }
                if let Some(minutes) = photo_minutes(&entry.name) {
                    list.push_entry(PhotoEntry {
                        path: PhotoPath::compose(
                            Some(bucket.as_str()),
                            &UtcTime::from_unix(minutes * 60),
                        ),
                        size: entry.size,
                    });
                }
            })?;
            dir.close()?;
        }
        if bucket_overflow {
            list.truncated = true;
        }

        root.close()?;
        volume.close()?;
        Ok(list)
    }
}

fn classify(err: SdError) -> StoreError<SdError> {
    match err {
        SdError::NotFound => StoreError::NotFound,
        SdError::OpenedDirAsFile | SdError::DeleteDirAsFile => StoreError::NotAFile,
        other => StoreError::Backend(other),
    }
}

/// Map a logical capture name to its FAT short name, `{minute:08X}.JPG`.
fn physical_name(leaf: &str) -> Option<String<12>> {
    let minutes = naming::file_minutes(leaf)?;
    let mut name: String<12> = String::new();
    let _ = name.push_str(&naming::encode_stem(minutes));
    let _ = name.push_str(".JPG");
    Some(name)
}

/// Recover the capture minute from a FAT short name; foreign files are `None`.
fn photo_minutes(name: &ShortFileName) -> Option<u64> {
    if name.extension() != b"JPG" {
        return None;
    }
    let stem = str::from_utf8(name.base_name()).ok()?;
    naming::decode_stem(stem)
}

/// Accept only directory names shaped like a week bucket, `{year}_W{week}`.
fn bucket_of(name: &ShortFileName) -> Option<String<BUCKET_BYTES>> {
    if !name.extension().is_empty() {
        return None;
    }
    let base = name.base_name();
    if base.len() != 8
        || !base[0..4].iter().all(|b| b.is_ascii_digit())
        || &base[4..6] != b"_W"
        || !base[6..8].iter().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let mut out = String::new();
    for &b in base {
        let _ = out.push(b as char);
    }
    Some(out)
}
