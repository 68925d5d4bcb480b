//! Converts instants into the server's configured local time.

use time::OffsetDateTime;
use time_tz::{Offset, TimeZone, Tz};

/// Look up a canonical timezone name, e.g. "Pacific/Auckland".
pub fn get_timezone(canonical_timezone: &str) -> Option<&'static Tz> {
    time_tz::timezones::get_by_name(canonical_timezone)
}

/// Express `date_time` in `timezone`, using the offset in effect at that instant.
pub fn to_local(date_time: OffsetDateTime, timezone: &Tz) -> OffsetDateTime {
    let offset = timezone.get_offset_utc(&date_time).to_utc();

    date_time.to_offset(offset)
}
