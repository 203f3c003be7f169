//! Wall-clock abstraction and civil time conversion.

/// Seconds between the NTP era (1900) and the unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const SECS_PER_DAY: u64 = 86_400;
const DAYS_BEFORE_MONTH: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Broken-down civil time derived from unix seconds.
///
/// Valid for 1970..=2105; capture timestamps never leave that range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UtcTime {
    pub unix: u64,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub day_of_year: u16,
}

impl UtcTime {
    /// Convert unix seconds to civil time (Howard Hinnant's civil_from_days).
    pub fn from_unix(unix: u64) -> Self {
        let days = unix / SECS_PER_DAY;
        let secs_of_day = unix % SECS_PER_DAY;

        let z = days + 719_468;
        let era = z / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy_march = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy_march + 2) / 153;
        let day = (doy_march - (153 * mp + 2) / 5 + 1) as u8;
        let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
        let year = (y + u64::from(month <= 2)) as u16;

        let leap_day = u16::from(month > 2 && is_leap_year(year));
        let day_of_year = DAYS_BEFORE_MONTH[month as usize - 1] + u16::from(day) + leap_day;

        Self {
            unix,
            year,
            month,
            day,
            hour: (secs_of_day / 3_600) as u8,
            minute: (secs_of_day % 3_600 / 60) as u8,
            second: (secs_of_day % 60) as u8,
            day_of_year,
        }
    }

    /// Whole minutes since the unix epoch; granularity of capture names.
    pub const fn unix_minutes(&self) -> u64 {
        self.unix / 60
    }
}

/// Whether `year` is a leap year in the Gregorian calendar.
pub const fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Convert civil time back to unix seconds (Hinnant's days_from_civil).
///
/// Inverse of [`UtcTime::from_unix`] over the same 1970..=2105 range; the
/// unsigned arithmetic underflows for earlier dates.
pub fn unix_from_civil(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> u64 {
    let y = u64::from(year) - u64::from(month <= 2);
    let era = y / 400;
    let yoe = y - era * 400;
    let mp = u64::from(if month > 2 { month - 3 } else { month + 9 });
    let doy = (153 * mp + 2) / 5 + u64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe - 719_468;

    days * SECS_PER_DAY + u64::from(hour) * 3_600 + u64::from(minute) * 60 + u64::from(second)
}

/// Synced wall-clock source.
///
/// Returns `None` until the first successful sync; capture naming requires a
/// synced clock.
pub trait WallClock {
    fn now(&self) -> Option<UtcTime>;
}
