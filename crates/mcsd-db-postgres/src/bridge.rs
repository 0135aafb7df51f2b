//! Conversions between `mcsd_core::FhirDateTime` (a `time::OffsetDateTime`
//! newtype) and `chrono::DateTime<Utc>`, the type sqlx-postgres binds
//! `TIMESTAMPTZ` columns to.

use chrono::{DateTime, Utc};
use mcsd_core::FhirDateTime;
use time::OffsetDateTime;

pub fn to_chrono(dt: &FhirDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(dt.timestamp_nanos() as i64)
}

pub fn from_chrono(dt: DateTime<Utc>) -> FhirDateTime {
    let nanos = dt.timestamp_nanos_opt().unwrap_or(0);
    let offset = OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    FhirDateTime::new(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsd_core::now_utc;

    #[test]
    fn roundtrips_through_chrono() {
        let original = now_utc();
        let chrono_dt = to_chrono(&original);
        let back = from_chrono(chrono_dt);
        assert_eq!(original.timestamp(), back.timestamp());
    }
}
