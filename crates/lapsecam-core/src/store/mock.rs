use heapless::{String, Vec};

use super::{FrameReader, FrameSink, PhotoEntry, PhotoList, PhotoStore, StoreError};
use crate::naming::{BUCKET_BYTES, PATH_BYTES, PHOTO_SUFFIX, PhotoPath};

const MAX_FILES: usize = 16;
const MAX_BUCKETS: usize = 8;
/// Per-file capacity; large enough for a frame spanning several write chunks.
pub const MOCK_FILE_BYTES: usize = 16_384;

/// Storage failure injected by a [`MemoryStore`] knob.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MockStoreError;

#[derive(Debug)]
struct MockFile {
    path: String<PATH_BYTES>,
    data: Vec<u8, MOCK_FILE_BYTES>,
}

/// In-memory photo store with deterministic fault injection.
///
/// Failure knobs are countdowns: each relevant call consumes one until the
/// knob reaches zero and the store behaves normally again.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Vec<MockFile, MAX_FILES>,
    buckets: Vec<String<BUCKET_BYTES>, MAX_BUCKETS>,

    /// Fail the next N `reinit` calls.
    pub fail_reinits: u8,
    /// Fail the next N `make_bucket` calls.
    pub fail_bucket_creates: u8,
    /// `make_bucket` reports success but the bucket never appears.
    pub ghost_buckets: bool,
    /// Fail the next N `open_writer` calls.
    pub fail_writer_opens: u8,
    /// Per-open write caps; each opened writer pops one and accepts at most
    /// that many bytes in total.
    pub write_limits: Vec<usize, 4>,

    /// Calls observed, for asserting an operation issued no storage access.
    pub storage_calls: u32,
    pub reinit_calls: u32,
    pub remove_calls: u32,
    pub bucket_create_calls: u32,
    pub bucket_verify_calls: u32,
    pub writer_opens: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a photo of `len` deterministic bytes at a validated path.
    pub fn seed_photo(&mut self, path: &str, len: usize) {
        self.seed_raw_file(path, len);
    }

    /// Insert a file without suffix rules, for listing-filter tests.
    pub fn seed_raw_file(&mut self, path: &str, len: usize) {
        let mut data = Vec::new();
        for index in 0..len {
            let _ = data.push((index % 251) as u8);
        }
        if let Some((Some(bucket), _)) = path_parts(path) {
            if !self.buckets.iter().any(|b| b == bucket) {
                let _ = self.buckets.push(String::try_from(bucket).unwrap_or_default());
            }
        }
        let file = MockFile {
            path: String::try_from(path).unwrap_or_default(),
            data,
        };
        if let Some(slot) = self.files.iter_mut().find(|f| f.path == path) {
            *slot = file;
        } else {
            let _ = self.files.push(file);
        }
    }

    pub fn insert_bucket(&mut self, bucket: &str) {
        if !self.buckets.iter().any(|b| b == bucket) {
            let _ = self.buckets.push(String::try_from(bucket).unwrap_or_default());
        }
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.iter().any(|b| b == bucket)
    }

    pub fn bytes_of(&self, path: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.data.as_slice())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn bucket_of_path(&self, path: &PhotoPath) -> bool {
        let body = &path.as_str()[1..];
        self.buckets.iter().any(|b| b == body)
    }
}

fn path_parts(path: &str) -> Option<(Option<&str>, &str)> {
    let body = path.strip_prefix('/')?;
    Some(match body.split_once('/') {
        Some((bucket, file)) => (Some(bucket), file),
        None => (None, body),
    })
}

/// Write handle over one [`MemoryStore`] slot.
#[derive(Debug)]
pub struct MemoryWriter<'a> {
    store: &'a mut MemoryStore,
    index: usize,
    accept_limit: Option<usize>,
    written: usize,
}

impl FrameSink for MemoryWriter<'_> {
    type Error = MockStoreError;

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Self::Error> {
        self.store.storage_calls += 1;
        let accepted = match self.accept_limit {
            Some(limit) => chunk.len().min(limit.saturating_sub(self.written)),
            None => chunk.len(),
        };
        let file = &mut self.store.files[self.index];
        if file.data.extend_from_slice(&chunk[..accepted]).is_err() {
            return Err(MockStoreError);
        }
        self.written += accepted;
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.store.storage_calls += 1;
        Ok(())
    }

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Read handle over one [`MemoryStore`] slot.
#[derive(Debug)]
pub struct MemoryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl FrameReader for MemoryReader<'_> {
    type Error = MockStoreError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.data[self.position..];
        let take = remaining.len().min(buf.len());
        buf[..take].copy_from_slice(&remaining[..take]);
        self.position += take;
        Ok(take)
    }

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl PhotoStore for MemoryStore {
    type Error = MockStoreError;
    type Writer<'a> = MemoryWriter<'a>;
    type Reader<'a> = MemoryReader<'a>;

    fn reinit(&mut self) -> Result<(), Self::Error> {
        self.storage_calls += 1;
        self.reinit_calls += 1;
        if self.fail_reinits > 0 {
            self.fail_reinits -= 1;
            return Err(MockStoreError);
        }
        Ok(())
    }

    fn make_bucket(&mut self, bucket: &str) -> Result<(), Self::Error> {
        self.storage_calls += 1;
        self.bucket_create_calls += 1;
        if self.fail_bucket_creates > 0 {
            self.fail_bucket_creates -= 1;
            return Err(MockStoreError);
        }
        if !self.ghost_buckets {
            self.insert_bucket(bucket);
        }
        Ok(())
    }

    fn bucket_exists(&mut self, bucket: &str) -> Result<bool, Self::Error> {
        self.storage_calls += 1;
        self.bucket_verify_calls += 1;
        Ok(self.has_bucket(bucket))
    }

    fn open_writer(&mut self, path: &PhotoPath) -> Result<Self::Writer<'_>, Self::Error> {
        self.storage_calls += 1;
        self.writer_opens += 1;
        if self.fail_writer_opens > 0 {
            self.fail_writer_opens -= 1;
            return Err(MockStoreError);
        }
        let accept_limit = if self.write_limits.is_empty() {
            None
        } else {
            Some(self.write_limits.remove(0))
        };

        let index = match self.files.iter().position(|f| f.path == path.as_str()) {
            Some(index) => {
                self.files[index].data.clear();
                index
            }
            None => {
                let file = MockFile {
                    path: String::try_from(path.as_str()).map_err(|_| MockStoreError)?,
                    data: Vec::new(),
                };
                self.files.push(file).map_err(|_| MockStoreError)?;
                self.files.len() - 1
            }
        };
        Ok(MemoryWriter {
            store: self,
            index,
            accept_limit,
            written: 0,
        })
    }

    fn open_reader(
        &mut self,
        path: &PhotoPath,
    ) -> Result<(Self::Reader<'_>, u32), StoreError<Self::Error>> {
        self.storage_calls += 1;
        if self.bucket_of_path(path) {
            return Err(StoreError::NotAFile);
        }
        let file = self
            .files
            .iter()
            .find(|f| f.path == path.as_str())
            .ok_or(StoreError::NotFound)?;
        let len = file.data.len() as u32;
        Ok((
            MemoryReader {
                data: &file.data,
                position: 0,
            },
            len,
        ))
    }

    fn remove(&mut self, path: &PhotoPath) -> Result<(), StoreError<Self::Error>> {
        self.storage_calls += 1;
        if self.bucket_of_path(path) {
            return Err(StoreError::NotAFile);
        }
        let index = self
            .files
            .iter()
            .position(|f| f.path == path.as_str())
            .ok_or(StoreError::NotFound)?;
        self.files.remove(index);
        self.remove_calls += 1;
        Ok(())
    }

    fn list_photos(&mut self) -> Result<PhotoList, Self::Error> {
        self.storage_calls += 1;
        let mut list = PhotoList::new();
        for file in &self.files {
            if !file.path.ends_with(PHOTO_SUFFIX) {
                continue;
            }
            let Ok(path) = PhotoPath::parse(&file.path) else {
                continue;
            };
            list.push_entry(PhotoEntry {
                path,
                size: file.data.len() as u32,
            });
        }
        Ok(list)
    }
}
