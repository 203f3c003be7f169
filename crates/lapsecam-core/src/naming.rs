//! Capture destination naming.
//!
//! Buckets group captures by year and week; files are named to the minute.
//! Both names derive from one wall-clock snapshot so a slow write cannot
//! shift the recorded capture time.

use core::fmt::Write;

use heapless::String;

use crate::clock::UtcTime;

/// Capacity of a full photo path, `/{year}_W{week}/{minute-stamp}.jpg`.
pub const PATH_BYTES: usize = 48;
/// Capacity of a bucket directory name.
pub const BUCKET_BYTES: usize = 12;
/// Capacity of a photo file name.
pub const FILE_BYTES: usize = 24;
/// Required suffix for every served or stored photo.
pub const PHOTO_SUFFIX: &str = ".jpg";

const MAX_WEEK: u16 = 53;

/// Directory name for the week containing `day_of_year`, `"{year}_W{week:02}"`.
///
/// Week is `day_of_year / 7 + 1`, clamped to `[1, 53]`.
pub fn bucket_name(year: u16, day_of_year: u16) -> String<BUCKET_BYTES> {
    let week = (day_of_year / 7 + 1).clamp(1, MAX_WEEK);
    let mut name = String::new();
    let _ = write!(name, "{year}_W{week:02}");
    name
}

/// Minute-granular file name, `"{Y}_{M:02}_{D:02}_{H:02}_{Min:02}.jpg"`.
///
/// Two captures within one minute produce the same name; the later write
/// overwrites the earlier file.
pub fn file_name(t: &UtcTime) -> String<FILE_BYTES> {
    let mut name = String::new();
    let _ = write!(
        name,
        "{}_{:02}_{:02}_{:02}_{:02}{PHOTO_SUFFIX}",
        t.year, t.month, t.day, t.hour, t.minute
    );
    name
}

/// Path validation failures, rejected before any storage access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathError {
    Empty,
    TooLong,
    /// Contains a parent-directory sequence.
    ParentTraversal,
    /// Does not end in [`PHOTO_SUFFIX`].
    WrongSuffix,
    /// Nested deeper than one bucket level.
    TooDeep,
}

/// Validated absolute photo path, `/{file}.jpg` or `/{bucket}/{file}.jpg`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhotoPath {
    inner: String<PATH_BYTES>,
}

impl PhotoPath {
    /// Validate an untrusted, percent-decoded identifier.
    ///
    /// A missing leading slash is tolerated (list links always carry one, but
    /// hand-typed requests often do not).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.contains("..") {
            return Err(PathError::ParentTraversal);
        }
        if !raw.ends_with(PHOTO_SUFFIX) {
            return Err(PathError::WrongSuffix);
        }

        let mut inner: String<PATH_BYTES> = String::new();
        if !raw.starts_with('/') {
            inner.push('/').map_err(|_| PathError::TooLong)?;
        }
        inner.push_str(raw).map_err(|_| PathError::TooLong)?;

        // "/bucket/file.jpg" is the deepest stored layout.
        if inner[1..].split('/').count() > 2 || inner[1..].split('/').any(str::is_empty) {
            return Err(PathError::TooDeep);
        }
        Ok(Self { inner })
    }

    /// Compose the destination for a capture taken at `t`.
    pub fn compose(bucket: Option<&str>, t: &UtcTime) -> Self {
        let mut inner: String<PATH_BYTES> = String::new();
        if let Some(bucket) = bucket {
            let _ = write!(inner, "/{bucket}");
        }
        let _ = write!(inner, "/{}", file_name(t));
        Self { inner }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Split into `(bucket, file name)`.
    pub fn split(&self) -> (Option<&str>, &str) {
        let body = &self.inner[1..];
        match body.split_once('/') {
            Some((bucket, file)) => (Some(bucket), file),
            None => (None, body),
        }
    }
}

impl core::fmt::Display for PhotoPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Recover the capture minute from a well-formed file name.
///
/// Foreign files on the card produce `None` and are skipped by listing scans
/// rather than surfaced with a bogus timestamp.
pub fn file_minutes(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(PHOTO_SUFFIX)?;
    let mut fields = stem.split('_');
    let year: u16 = fields.next()?.parse().ok()?;
    let month: u8 = fields.next()?.parse().ok()?;
    let day: u8 = fields.next()?.parse().ok()?;
    let hour: u8 = fields.next()?.parse().ok()?;
    let minute: u8 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    if !(1970..=2105).contains(&year)
        || !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
    {
        return None;
    }
    Some(crate::clock::unix_from_civil(year, month, day, hour, minute, 0) / 60)
}

/// Encode unix minutes as the eight-hex-digit stem used for FAT short names.
pub fn encode_stem(unix_minutes: u64) -> String<8> {
    let mut stem = String::new();
    let _ = write!(stem, "{:08X}", unix_minutes as u32);
    stem
}

/// Decode an eight-hex-digit stem back to unix minutes.
pub fn decode_stem(stem: &str) -> Option<u64> {
    if stem.len() != 8 {
        return None;
    }
    let mut value: u64 = 0;
    for byte in stem.bytes() {
        let digit = (byte as char).to_digit(16)?;
        value = value * 16 + u64::from(digit);
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(unix: u64) -> UtcTime {
        UtcTime::from_unix(unix)
    }

    #[test]
    fn bucket_name_is_deterministic_and_zero_padded() {
        assert_eq!(bucket_name(2025, 235).as_str(), "2025_W34");
        assert_eq!(bucket_name(2025, 235).as_str(), "2025_W34");
        assert_eq!(bucket_name(2026, 3).as_str(), "2026_W01");
    }

    #[test]
    fn bucket_week_stays_within_bounds() {
        assert_eq!(bucket_name(2024, 0).as_str(), "2024_W01");
        assert_eq!(bucket_name(2024, 366).as_str(), "2024_W53");
        assert_eq!(bucket_name(2024, 999).as_str(), "2024_W53");
    }

    #[test]
    fn file_name_is_minute_granular() {
        // 2025-08-23 14:30:05 UTC
        let name = file_name(&at(1_755_959_405));
        assert_eq!(name.as_str(), "2025_08_23_14_30.jpg");
        // Same minute, different second: identical name.
        assert_eq!(file_name(&at(1_755_959_440)), name);
    }

    #[test]
    fn compose_joins_bucket_and_root_forms() {
        let t = at(1_755_959_405);
        let bucketed = PhotoPath::compose(Some("2025_W34"), &t);
        assert_eq!(bucketed.as_str(), "/2025_W34/2025_08_23_14_30.jpg");
        assert_eq!(
            bucketed.split(),
            (Some("2025_W34"), "2025_08_23_14_30.jpg")
        );

        let rooted = PhotoPath::compose(None, &t);
        assert_eq!(rooted.as_str(), "/2025_08_23_14_30.jpg");
        assert_eq!(rooted.split(), (None, "2025_08_23_14_30.jpg"));
    }

    #[test]
    fn parse_rejects_traversal_everywhere() {
        assert_eq!(
            PhotoPath::parse("/../secret.jpg"),
            Err(PathError::ParentTraversal)
        );
        assert_eq!(
            PhotoPath::parse("/2025_W34/..teaser.jpg"),
            Err(PathError::ParentTraversal)
        );
        assert_eq!(PhotoPath::parse("/.."), Err(PathError::ParentTraversal));
    }

    #[test]
    fn parse_requires_photo_suffix() {
        assert_eq!(PhotoPath::parse("/a.jpeg"), Err(PathError::WrongSuffix));
        assert_eq!(PhotoPath::parse("/a.txt"), Err(PathError::WrongSuffix));
        assert_eq!(PhotoPath::parse(""), Err(PathError::Empty));
    }

    #[test]
    fn parse_limits_depth_to_one_bucket() {
        assert!(PhotoPath::parse("/2025_W34/a.jpg").is_ok());
        assert_eq!(
            PhotoPath::parse("/a/b/c.jpg"),
            Err(PathError::TooDeep)
        );
        assert_eq!(PhotoPath::parse("//a.jpg"), Err(PathError::TooDeep));
    }

    #[test]
    fn parse_tolerates_missing_leading_slash() {
        let path = PhotoPath::parse("2025_W34/a.jpg").unwrap();
        assert_eq!(path.as_str(), "/2025_W34/a.jpg");
    }

    #[test]
    fn file_minutes_inverts_file_name() {
        let t = at(1_755_959_405);
        assert_eq!(file_minutes(&file_name(&t)), Some(t.unix_minutes()));
        assert_eq!(file_minutes("1970_01_01_00_00.jpg"), Some(0));
    }

    #[test]
    fn file_minutes_skips_foreign_names() {
        assert_eq!(file_minutes("VACATION.jpg"), None);
        assert_eq!(file_minutes("2025_08_23_14.jpg"), None);
        assert_eq!(file_minutes("2025_13_01_00_00.jpg"), None);
        assert_eq!(file_minutes("2025_08_23_14_30.png"), None);
    }

    #[test]
    fn stem_codec_round_trips() {
        let t = at(1_755_959_405);
        let stem = encode_stem(t.unix_minutes());
        assert_eq!(stem.len(), 8);
        assert_eq!(decode_stem(&stem), Some(t.unix_minutes()));
    }

    #[test]
    fn stem_decode_rejects_malformed_input() {
        assert_eq!(decode_stem("XYZ"), None);
        assert_eq!(decode_stem("GGGGGGGG"), None);
        assert_eq!(decode_stem("01C0F3A"), None);
    }
}
