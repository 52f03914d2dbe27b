//! PostgreSQL type tags and value types.
//!
//! Temporal values are stored already rebased to the Unix epoch; the
//! server's binary format counts from 2000-01-01.
//! Reference: https://www.postgresql.org/docs/current/datatype-datetime.html

use std::fmt;

// ============================================================================
// Epoch Offsets
// ============================================================================

/// Days between 1970-01-01 and 2000-01-01.
pub const DAYS_UNIX_TO_J2000_EPOCH: i64 = 10_957;

/// Seconds between 1970-01-01 and 2000-01-01.
pub const SECONDS_UNIX_TO_J2000_EPOCH: i64 = DAYS_UNIX_TO_J2000_EPOCH * SECONDS_PER_DAY;

/// Microseconds between 1970-01-01 and 2000-01-01.
pub const MICROSEC_UNIX_TO_J2000_EPOCH: i64 = SECONDS_UNIX_TO_J2000_EPOCH * 1_000_000;

pub const SECONDS_PER_DAY: i64 = 86_400;

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifiers (OIDs).
///
/// These are the built-in type OIDs from PostgreSQL's `pg_type.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub i32);

impl Oid {
    /// Let the server infer the type (used for NULL parameters).
    pub const UNSPECIFIED: Oid = Oid(0);

    // Boolean types
    pub const BOOL: Oid = Oid(16);

    // Binary data
    pub const BYTEA: Oid = Oid(17);

    // Character types
    pub const CHAR: Oid = Oid(18);
    pub const NAME: Oid = Oid(19);

    // Integer types
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);

    // Text types
    pub const TEXT: Oid = Oid(25);

    // Floating point types
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);

    // String types
    pub const BPCHAR: Oid = Oid(1042);
    pub const VARCHAR: Oid = Oid(1043);

    // Date/time types
    pub const DATE: Oid = Oid(1082);
    pub const TIME: Oid = Oid(1083);
    pub const TIMESTAMP: Oid = Oid(1114);
    pub const TIMESTAMPTZ: Oid = Oid(1184);
    pub const INTERVAL: Oid = Oid(1186);
    pub const TIMETZ: Oid = Oid(1266);

    // One-dimensional array types
    pub const BOOL_ARRAY: Oid = Oid(1000);
    pub const INT2_ARRAY: Oid = Oid(1005);
    pub const INT4_ARRAY: Oid = Oid(1007);
    pub const TEXT_ARRAY: Oid = Oid(1009);
    pub const INT8_ARRAY: Oid = Oid(1016);
    pub const FLOAT4_ARRAY: Oid = Oid(1021);
    pub const FLOAT8_ARRAY: Oid = Oid(1022);

    /// Create from raw i32 value
    #[inline]
    pub fn from_i32(oid: i32) -> Self {
        Oid(oid)
    }

    /// Get the raw i32 value
    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Check if this is a text-like type
    pub fn is_text_like(self) -> bool {
        matches!(self, Oid::TEXT | Oid::VARCHAR | Oid::BPCHAR | Oid::NAME)
    }

    /// SQL name of the type, if it is one this crate knows.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Oid::BOOL => "bool",
            Oid::BYTEA => "bytea",
            Oid::CHAR => "\"char\"",
            Oid::NAME => "name",
            Oid::INT8 => "int8",
            Oid::INT2 => "int2",
            Oid::INT4 => "int4",
            Oid::TEXT => "text",
            Oid::FLOAT4 => "float4",
            Oid::FLOAT8 => "float8",
            Oid::BPCHAR => "bpchar",
            Oid::VARCHAR => "varchar",
            Oid::DATE => "date",
            Oid::TIME => "time",
            Oid::TIMESTAMP => "timestamp",
            Oid::TIMESTAMPTZ => "timestamptz",
            Oid::INTERVAL => "interval",
            Oid::TIMETZ => "timetz",
            Oid::BOOL_ARRAY => "bool[]",
            Oid::INT2_ARRAY => "int2[]",
            Oid::INT4_ARRAY => "int4[]",
            Oid::TEXT_ARRAY => "text[]",
            Oid::INT8_ARRAY => "int8[]",
            Oid::FLOAT4_ARRAY => "float4[]",
            Oid::FLOAT8_ARRAY => "float8[]",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (oid {})", name, self.0),
            None => write!(f, "oid {}", self.0),
        }
    }
}

// ============================================================================
// Temporal Values
// ============================================================================

/// `date`, as seconds since the Unix epoch (always a multiple of a day).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    pub epoch_seconds: i64,
}

impl Date {
    /// Build from the wire day count (days since 2000-01-01).
    pub fn from_wire_days(days: i32) -> Self {
        Self {
            epoch_seconds: (days as i64 + DAYS_UNIX_TO_J2000_EPOCH) * SECONDS_PER_DAY,
        }
    }

    /// Days since 2000-01-01, as the server counts them. Saturates at the
    /// `i32` range.
    pub fn to_wire_days(self) -> i32 {
        let days = self
            .epoch_seconds
            .div_euclid(SECONDS_PER_DAY)
            .saturating_sub(DAYS_UNIX_TO_J2000_EPOCH);
        i32::try_from(days).unwrap_or(if days < 0 { i32::MIN } else { i32::MAX })
    }
}

/// `time without time zone`, as microseconds since midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Time {
    pub micros: i64,
}

/// `time with time zone`.
///
/// `zone_offset` is in seconds and keeps the server's sign convention
/// (positive west of Greenwich).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeTz {
    pub micros: i64,
    pub zone_offset: i32,
}

/// `timestamp without time zone`, as microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub epoch_micros: i64,
}

/// `timestamp with time zone`, as UTC microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimestampTz {
    pub epoch_micros: i64,
}

impl Timestamp {
    pub fn from_wire_micros(micros: i64) -> Self {
        Self {
            epoch_micros: micros.saturating_add(MICROSEC_UNIX_TO_J2000_EPOCH),
        }
    }

    pub fn to_wire_micros(self) -> i64 {
        self.epoch_micros.saturating_sub(MICROSEC_UNIX_TO_J2000_EPOCH)
    }
}

impl TimestampTz {
    pub fn from_wire_micros(micros: i64) -> Self {
        Self {
            epoch_micros: micros.saturating_add(MICROSEC_UNIX_TO_J2000_EPOCH),
        }
    }

    pub fn to_wire_micros(self) -> i64 {
        self.epoch_micros.saturating_sub(MICROSEC_UNIX_TO_J2000_EPOCH)
    }
}

/// `interval`. The three parts are kept apart, as the server does:
/// a month is not a fixed number of days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interval {
    pub micros: i64,
    pub days: i32,
    pub months: i32,
}

#[cfg(feature = "chrono")]
mod chrono_interop {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    impl Date {
        pub fn to_naive_date(self) -> Option<NaiveDate> {
            DateTime::from_timestamp(self.epoch_seconds, 0).map(|dt| dt.date_naive())
        }
    }

    impl Time {
        pub fn to_naive_time(self) -> Option<NaiveTime> {
            let secs = u32::try_from(self.micros.div_euclid(1_000_000)).ok()?;
            let nanos = u32::try_from(self.micros.rem_euclid(1_000_000) * 1_000).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        }
    }

    impl Timestamp {
        pub fn to_naive_date_time(self) -> Option<NaiveDateTime> {
            DateTime::from_timestamp_micros(self.epoch_micros).map(|dt| dt.naive_utc())
        }
    }

    impl TimestampTz {
        pub fn to_date_time(self) -> Option<DateTime<Utc>> {
            DateTime::from_timestamp_micros(self.epoch_micros)
        }
    }
}

// ============================================================================
// Parameter Values
// ============================================================================

/// A parameter value sent in binary format with `Bind`.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
    Date(Date),
    Time(Time),
    TimeTz(TimeTz),
    Timestamp(Timestamp),
    TimestampTz(TimestampTz),
    Interval(Interval),
}

impl PgValue {
    /// Check if this value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    /// Encode this value to binary format.
    pub fn encode_binary(&self) -> Vec<u8> {
        match self {
            PgValue::Null => vec![],
            PgValue::Bool(v) => vec![u8::from(*v)],
            PgValue::Int2(v) => v.to_be_bytes().to_vec(),
            PgValue::Int4(v) => v.to_be_bytes().to_vec(),
            PgValue::Int8(v) => v.to_be_bytes().to_vec(),
            PgValue::Float4(v) => v.to_be_bytes().to_vec(),
            PgValue::Float8(v) => v.to_be_bytes().to_vec(),
            PgValue::Text(v) => v.as_bytes().to_vec(),
            PgValue::Bytea(v) => v.clone(),
            PgValue::Date(v) => v.to_wire_days().to_be_bytes().to_vec(),
            PgValue::Time(v) => v.micros.to_be_bytes().to_vec(),
            PgValue::TimeTz(v) => {
                let mut out = v.micros.to_be_bytes().to_vec();
                out.extend_from_slice(&v.zone_offset.to_be_bytes());
                out
            }
            PgValue::Timestamp(v) => v.to_wire_micros().to_be_bytes().to_vec(),
            PgValue::TimestampTz(v) => v.to_wire_micros().to_be_bytes().to_vec(),
            PgValue::Interval(v) => {
                let mut out = v.micros.to_be_bytes().to_vec();
                out.extend_from_slice(&v.days.to_be_bytes());
                out.extend_from_slice(&v.months.to_be_bytes());
                out
            }
        }
    }

    /// Get the OID for this value's type
    pub fn type_oid(&self) -> Oid {
        match self {
            PgValue::Null => Oid::UNSPECIFIED,
            PgValue::Bool(_) => Oid::BOOL,
            PgValue::Int2(_) => Oid::INT2,
            PgValue::Int4(_) => Oid::INT4,
            PgValue::Int8(_) => Oid::INT8,
            PgValue::Float4(_) => Oid::FLOAT4,
            PgValue::Float8(_) => Oid::FLOAT8,
            PgValue::Text(_) => Oid::TEXT,
            PgValue::Bytea(_) => Oid::BYTEA,
            PgValue::Date(_) => Oid::DATE,
            PgValue::Time(_) => Oid::TIME,
            PgValue::TimeTz(_) => Oid::TIMETZ,
            PgValue::Timestamp(_) => Oid::TIMESTAMP,
            PgValue::TimestampTz(_) => Oid::TIMESTAMPTZ,
            PgValue::Interval(_) => Oid::INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_classification() {
        assert!(Oid::TEXT.is_text_like());
        assert!(Oid::VARCHAR.is_text_like());
        assert!(Oid::NAME.is_text_like());
        assert!(!Oid::CHAR.is_text_like());
        assert!(!Oid::INT4.is_text_like());
    }

    #[test]
    fn test_oid_display() {
        assert_eq!(Oid::INT4.to_string(), "int4 (oid 23)");
        assert_eq!(Oid(99999).to_string(), "oid 99999");
    }

    #[test]
    fn test_epoch_constants() {
        // 2000-01-01T00:00:00Z
        assert_eq!(SECONDS_UNIX_TO_J2000_EPOCH, 946_684_800);
        assert_eq!(MICROSEC_UNIX_TO_J2000_EPOCH, 946_684_800_000_000);
    }

    #[test]
    fn test_date_wire_days_roundtrip() {
        for days in [-800_000, -1, 0, 1, 8_766] {
            assert_eq!(Date::from_wire_days(days).to_wire_days(), days);
        }
        assert_eq!(Date::from_wire_days(-DAYS_UNIX_TO_J2000_EPOCH as i32).epoch_seconds, 0);
    }

    #[test]
    fn test_date_out_of_wire_range_saturates() {
        let far_future = Date { epoch_seconds: i64::MAX };
        assert_eq!(far_future.to_wire_days(), i32::MAX);
        let far_past = Date { epoch_seconds: i64::MIN };
        assert_eq!(far_past.to_wire_days(), i32::MIN);

        let just_past = Date::from_wire_days(i32::MAX);
        let next_day = Date {
            epoch_seconds: just_past.epoch_seconds + SECONDS_PER_DAY,
        };
        assert_eq!(next_day.to_wire_days(), i32::MAX);
        assert_eq!(
            PgValue::Date(next_day).encode_binary(),
            i32::MAX.to_be_bytes().to_vec()
        );
    }

    #[test]
    fn test_temporal_param_encoding() {
        let ts = PgValue::Timestamp(Timestamp {
            epoch_micros: MICROSEC_UNIX_TO_J2000_EPOCH,
        });
        assert_eq!(ts.encode_binary(), 0i64.to_be_bytes().to_vec());

        let iv = PgValue::Interval(Interval {
            micros: 1,
            days: 2,
            months: 3,
        });
        assert_eq!(
            iv.encode_binary(),
            vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
        );
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_chrono_conversions() {
        use chrono::Datelike;

        let date = Date::from_wire_days(0).to_naive_date().unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2000, 1, 1));

        let ts = TimestampTz::from_wire_micros(0).to_date_time().unwrap();
        assert_eq!(ts.timestamp(), 946_684_800);
    }
}
