use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Packs a calendar date/time into the SC's 32-bit date field (spec.md
/// §4.5). Valid year range 2024-2087 inclusive.
pub fn pack_date(dt: DateTime<Utc>) -> EngineResult<u32> {
    let year = dt.year();
    if !(2024..=2087).contains(&year) {
        return Err(EngineError::DateOutOfRange(year));
    }
    let year_bits = ((year - 2024) as u32) & 0x3F;
    let month = dt.month() & 0xF;
    let day = dt.day() & 0x1F;
    let hour = dt.hour() & 0x1F;
    let minute = dt.minute() & 0x3F;
    let second = dt.second() & 0x3F;

    Ok(year_bits << 26 | month << 22 | day << 17 | hour << 12 | minute << 6 | second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn packs_known_date() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let packed = pack_date(dt).unwrap();
        assert_eq!(packed >> 26, 0);
    }

    #[test]
    fn rejects_out_of_range_year() {
        let dt = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert!(pack_date(dt).is_err());
    }
}
