use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        if parsed.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            });
        }

        Ok(Self(parsed))
    }

    /// Parse a calendar date (`YYYY-MM-DD`) as midnight UTC.
    pub fn parse_date(input: &str) -> Result<Self, ValidationError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(input, &format)
            .map(Self::from_date)
            .map_err(|_| ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            })
    }

    pub fn from_date(date: Date) -> Self {
        Self(date.midnight().assume_utc())
    }

    pub fn from_unix_timestamp(seconds: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| ValidationError::TimestampNotUtc {
                value: seconds.to_string(),
            })
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Time elapsed from `earlier` to `self`; negative when `earlier` is in the future.
    pub fn since(self, earlier: Self) -> Duration {
        self.0 - earlier.0
    }

    pub fn plus_hours(self, hours: u32) -> Self {
        Self(self.0 + Duration::hours(i64::from(hours)))
    }

    pub fn minus_days(self, days: u32) -> Self {
        Self(self.0 - Duration::days(i64::from(days)))
    }

    pub fn date(self) -> Date {
        self.0.date()
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    /// Calendar date as `YYYY-MM-DD`.
    pub fn date_string(self) -> String {
        let date = self.0.date();
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calendar_dates_as_utc_midnight() {
        let parsed = UtcDateTime::parse_date("2024-09-28").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-09-28T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }

    #[test]
    fn since_measures_forward_elapsed_time() {
        let start = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid");
        let later = start.plus_hours(5);
        assert_eq!(later.since(start), Duration::hours(5));
        assert!(start.since(later).is_negative());
    }

    #[test]
    fn minus_days_crosses_year_boundaries() {
        let start = UtcDateTime::parse_date("2024-01-05").expect("valid");
        let earlier = start.minus_days(10);
        assert_eq!(earlier.date_string(), "2023-12-26");
        assert_eq!(earlier.year(), 2023);
    }
}
