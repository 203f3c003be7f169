//! Photo storage abstraction layer.

pub mod mock;

use heapless::Vec;

use crate::naming::PhotoPath;

/// Listing cap; a full card yields a truncated page rather than an overrun.
pub const MAX_PHOTO_LIST: usize = 96;

/// Semantic wrapper for lookups that can miss.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreError<E> {
    /// No entry at the path.
    NotFound,
    /// The path resolves to a directory, not a regular file.
    NotAFile,
    Backend(E),
}

impl<E> From<E> for StoreError<E> {
    fn from(err: E) -> Self {
        Self::Backend(err)
    }
}

/// One stored photo surfaced by a listing scan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhotoEntry {
    pub path: PhotoPath,
    pub size: u32,
}

/// Bounded listing result.
#[derive(Debug, Default)]
pub struct PhotoList {
    pub entries: Vec<PhotoEntry, MAX_PHOTO_LIST>,
    pub truncated: bool,
}

impl PhotoList {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            truncated: false,
        }
    }

    /// Keep the entry if there is room, otherwise mark the list truncated.
    pub fn push_entry(&mut self, entry: PhotoEntry) {
        if self.entries.push(entry).is_err() {
            self.truncated = true;
        }
    }
}

/// Chunk-accepting write handle for one destination file.
///
/// `write` may accept fewer bytes than offered; the caller is responsible for
/// comparing totals against the source length.
pub trait FrameSink {
    type Error: core::fmt::Debug;

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Self::Error>;
    fn flush(&mut self) -> Result<(), Self::Error>;
    fn close(self) -> Result<(), Self::Error>;
}

/// Chunk-yielding read handle; `read` returns `0` at end of file.
pub trait FrameReader {
    type Error: core::fmt::Debug;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn close(self) -> Result<(), Self::Error>;
}

/// Abstract photo storage backend.
///
/// `&mut` receivers keep one storage operation in flight at a time; an open
/// writer or reader borrows the store for its whole lifetime.
pub trait PhotoStore {
    type Error: core::fmt::Debug;
    type Writer<'a>: FrameSink<Error = Self::Error>
    where
        Self: 'a;
    type Reader<'a>: FrameReader<Error = Self::Error>
    where
        Self: 'a;

    /// Re-initialize the storage connection, dropping any cached device
    /// state. Used as the pipeline's pre-write stabilization step and as the
    /// acquisition chain's mount retry.
    fn reinit(&mut self) -> Result<(), Self::Error>;

    /// Create the bucket directory; an already existing bucket is success.
    fn make_bucket(&mut self, bucket: &str) -> Result<(), Self::Error>;

    /// Reopen the bucket to confirm it exists as a directory.
    fn bucket_exists(&mut self, bucket: &str) -> Result<bool, Self::Error>;

    /// Open `path` for writing, truncating any previous content.
    fn open_writer(&mut self, path: &PhotoPath) -> Result<Self::Writer<'_>, Self::Error>;

    /// Open `path` for reading; returns the handle and the file length.
    fn open_reader(
        &mut self,
        path: &PhotoPath,
    ) -> Result<(Self::Reader<'_>, u32), StoreError<Self::Error>>;

    /// Remove the file at `path`. Not retried by any caller.
    fn remove(&mut self, path: &PhotoPath) -> Result<(), StoreError<Self::Error>>;

    /// Scan the root directory and one level of bucket subdirectories for
    /// photo files.
    fn list_photos(&mut self) -> Result<PhotoList, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::UtcTime;

    #[test]
    fn list_marks_truncation_instead_of_dropping_silently() {
        let mut list = PhotoList::new();
        let path = PhotoPath::compose(None, &UtcTime::from_unix(0));
        for _ in 0..MAX_PHOTO_LIST {
            list.push_entry(PhotoEntry {
                path: path.clone(),
                size: 1,
            });
        }
        assert!(!list.truncated);
        assert_eq!(list.entries.len(), MAX_PHOTO_LIST);

        list.push_entry(PhotoEntry { path, size: 1 });
        assert!(list.truncated);
        assert_eq!(list.entries.len(), MAX_PHOTO_LIST);
    }
}
