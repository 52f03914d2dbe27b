//! Binary decoding of column values into Rust types.
//!
//! `FromColumn` is implemented only for the types the server's binary
//! format is decoded into here; each implementation names the type tag it
//! expects so the row can refuse a mismatched request before touching bytes.
//! Reference: https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES

use super::error::DecodeError;
use super::types::{Date, Interval, Oid, Time, TimeTz, Timestamp, TimestampTz};
use super::wire::{WireFixed, WireReader};

mod sealed {
    pub trait Sealed {}
}

/// A Rust type a column can be decoded into.
pub trait FromColumn: Sized + sealed::Sealed {
    /// Type tag reported in mismatch errors.
    const OID: Oid;

    /// Text-format columns carry the same bytes as binary for this type.
    const TEXT_FORMAT_OK: bool = false;

    /// Whether a column of type `oid` can be decoded into `Self`.
    fn accepts(oid: Oid) -> bool {
        oid == Self::OID
    }

    /// Value returned for a NULL column.
    fn null_default() -> Self;

    /// Decode one non-null value. `raw` is exactly the column's bytes.
    fn decode(raw: &[u8]) -> Result<Self, DecodeError>;
}

/// Fixed-width type that can appear as an array element.
pub trait ArrayElement: FromColumn {
    /// Type tag of the one-dimensional array of `Self`.
    const ARRAY_OID: Oid;
}

/// Read a fixed-width value that must fill `raw` exactly.
fn decode_exact<T: WireFixed>(oid: Oid, raw: &[u8]) -> Result<T, DecodeError> {
    let mut reader = WireReader::new(raw);
    let value = reader.read::<T>()?;
    finish(oid, &reader)?;
    Ok(value)
}

fn finish(oid: Oid, reader: &WireReader<'_>) -> Result<(), DecodeError> {
    match reader.remaining() {
        0 => Ok(()),
        extra => Err(DecodeError::TrailingBytes { oid, extra }),
    }
}

macro_rules! fixed_scalar {
    ($ty:ty, $oid:expr, $array_oid:expr) => {
        impl sealed::Sealed for $ty {}

        impl FromColumn for $ty {
            const OID: Oid = $oid;

            fn null_default() -> Self {
                <$ty>::default()
            }

            fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
                decode_exact::<$ty>(Self::OID, raw)
            }
        }

        impl ArrayElement for $ty {
            const ARRAY_OID: Oid = $array_oid;
        }
    };
}

fixed_scalar!(bool, Oid::BOOL, Oid::BOOL_ARRAY);
fixed_scalar!(i16, Oid::INT2, Oid::INT2_ARRAY);
fixed_scalar!(i32, Oid::INT4, Oid::INT4_ARRAY);
fixed_scalar!(i64, Oid::INT8, Oid::INT8_ARRAY);
fixed_scalar!(f32, Oid::FLOAT4, Oid::FLOAT4_ARRAY);
fixed_scalar!(f64, Oid::FLOAT8, Oid::FLOAT8_ARRAY);

// ----------------------------------------------------------------------------
// char, varchar, text, name
// ----------------------------------------------------------------------------

impl sealed::Sealed for String {}

impl FromColumn for String {
    const OID: Oid = Oid::TEXT;
    const TEXT_FORMAT_OK: bool = true;

    fn accepts(oid: Oid) -> bool {
        oid.is_text_like()
    }

    fn null_default() -> Self {
        String::new()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

// ----------------------------------------------------------------------------
// "char": a single byte, signed like the server's C type
// ----------------------------------------------------------------------------

impl sealed::Sealed for i8 {}

impl FromColumn for i8 {
    const OID: Oid = Oid::CHAR;

    fn null_default() -> Self {
        0
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        match raw {
            [b] => Ok(*b as i8),
            _ => Err(DecodeError::InvalidLength {
                oid: Oid::CHAR,
                len: raw.len(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// bytea
// ----------------------------------------------------------------------------

impl sealed::Sealed for Vec<u8> {}

impl FromColumn for Vec<u8> {
    const OID: Oid = Oid::BYTEA;

    fn null_default() -> Self {
        Vec::new()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        Ok(raw.to_vec())
    }
}

// ----------------------------------------------------------------------------
// Date/time
// ----------------------------------------------------------------------------

impl sealed::Sealed for Date {}

impl FromColumn for Date {
    const OID: Oid = Oid::DATE;

    fn null_default() -> Self {
        Date::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        decode_exact::<i32>(Self::OID, raw).map(Date::from_wire_days)
    }
}

impl sealed::Sealed for Time {}

impl FromColumn for Time {
    const OID: Oid = Oid::TIME;

    fn null_default() -> Self {
        Time::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        decode_exact::<i64>(Self::OID, raw).map(|micros| Time { micros })
    }
}

impl sealed::Sealed for TimeTz {}

impl FromColumn for TimeTz {
    const OID: Oid = Oid::TIMETZ;

    fn null_default() -> Self {
        TimeTz::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(raw);
        let micros = reader.read_i64()?;
        let zone_offset = reader.read_i32()?;
        finish(Self::OID, &reader)?;
        Ok(TimeTz {
            micros,
            zone_offset,
        })
    }
}

impl sealed::Sealed for Timestamp {}

impl FromColumn for Timestamp {
    const OID: Oid = Oid::TIMESTAMP;

    fn null_default() -> Self {
        Timestamp::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        decode_exact::<i64>(Self::OID, raw).map(Timestamp::from_wire_micros)
    }
}

impl sealed::Sealed for TimestampTz {}

impl FromColumn for TimestampTz {
    const OID: Oid = Oid::TIMESTAMPTZ;

    fn null_default() -> Self {
        TimestampTz::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        decode_exact::<i64>(Self::OID, raw).map(TimestampTz::from_wire_micros)
    }
}

impl sealed::Sealed for Interval {}

impl FromColumn for Interval {
    const OID: Oid = Oid::INTERVAL;

    fn null_default() -> Self {
        Interval::default()
    }

    fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        // Field order on the wire: time, day, month.
        let mut reader = WireReader::new(raw);
        let micros = reader.read_i64()?;
        let days = reader.read_i32()?;
        let months = reader.read_i32()?;
        finish(Self::OID, &reader)?;
        Ok(Interval {
            micros,
            days,
            months,
        })
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// Decode a one-dimensional binary array.
///
/// Layout:
///
/// ```text
/// int32 ndim        must be 1
/// int32 flags       has-nulls flag, ignored
/// int32 elemtype    element type oid
/// int32 size        number of elements
/// int32 lbound      index of the first element, ignored
/// size x { int32 len (-1 = NULL), len bytes }
/// ```
///
/// NULL elements become `null_elem`. An empty array is sent with
/// `ndim == 0` and decodes to an empty vector.
pub fn decode_array<T: ArrayElement + Clone>(
    raw: &[u8],
    null_elem: T,
    validate: bool,
) -> Result<Vec<T>, DecodeError> {
    let mut reader = WireReader::new(raw);
    let ndim = reader.read_i32()?;
    let _flags = reader.read_i32()?;
    let elem_type = Oid::from_i32(reader.read_i32()?);

    if validate && elem_type != T::OID {
        return Err(DecodeError::TypeMismatch {
            expected: T::OID,
            actual: elem_type,
        });
    }

    match ndim {
        0 => return Ok(Vec::new()),
        1 => {}
        n => return Err(DecodeError::UnsupportedDimensionality(n)),
    }

    let size = reader.read_i32()?;
    let _lower_bound = reader.read_i32()?;
    let size = usize::try_from(size).map_err(|_| DecodeError::InvalidLength {
        oid: T::ARRAY_OID,
        len: 0,
    })?;

    // Every element carries at least a 4-byte length prefix.
    let mut out = Vec::with_capacity(size.min(reader.remaining() / 4));
    for _ in 0..size {
        let len = reader.read_i32()?;
        if len == -1 {
            out.push(null_elem.clone());
            continue;
        }
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidLength {
            oid: T::OID,
            len: 0,
        })?;
        out.push(T::decode(reader.read_bytes(len)?)?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::types::{DAYS_UNIX_TO_J2000_EPOCH, MICROSEC_UNIX_TO_J2000_EPOCH};

    fn array_image(elem: Oid, elems: &[Option<Vec<u8>>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&elem.as_i32().to_be_bytes());
        buf.extend_from_slice(&(elems.len() as i32).to_be_bytes());
        buf.extend_from_slice(&1i32.to_be_bytes());
        for e in elems {
            match e {
                Some(bytes) => {
                    buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    buf.extend_from_slice(bytes);
                }
                None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        buf
    }

    #[test]
    fn test_scalars() {
        assert!(bool::decode(&[1]).unwrap());
        assert_eq!(i16::decode(&(-7i16).to_be_bytes()).unwrap(), -7);
        assert_eq!(i64::decode(&i64::MIN.to_be_bytes()).unwrap(), i64::MIN);
        assert_eq!(f64::decode(&2.5f64.to_be_bytes()).unwrap(), 2.5);
        assert_eq!(i8::decode(b"x").unwrap(), b'x' as i8);
        assert_eq!(Vec::<u8>::decode(&[0xde, 0xad]).unwrap(), vec![0xde, 0xad]);
        assert_eq!(String::decode(b"hello").unwrap(), "hello");
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert_eq!(
            i32::decode(&[0, 1]),
            Err(DecodeError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
        assert_eq!(
            i16::decode(&[0, 1, 2]),
            Err(DecodeError::TrailingBytes {
                oid: Oid::INT2,
                extra: 1
            })
        );
        assert_eq!(
            i8::decode(b"ab"),
            Err(DecodeError::InvalidLength {
                oid: Oid::CHAR,
                len: 2
            })
        );
        assert_eq!(String::decode(&[0xff, 0xfe]), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_temporal_zero_is_j2000() {
        let date = Date::decode(&0i32.to_be_bytes()).unwrap();
        assert_eq!(date.epoch_seconds, DAYS_UNIX_TO_J2000_EPOCH * 86_400);

        let ts = Timestamp::decode(&0i64.to_be_bytes()).unwrap();
        assert_eq!(ts.epoch_micros, MICROSEC_UNIX_TO_J2000_EPOCH);

        let tstz = TimestampTz::decode(&0i64.to_be_bytes()).unwrap();
        assert_eq!(tstz.epoch_micros, MICROSEC_UNIX_TO_J2000_EPOCH);

        assert_eq!(Time::decode(&0i64.to_be_bytes()).unwrap(), Time::default());
    }

    #[test]
    fn test_date_before_j2000() {
        // 1970-01-01 is day -10957 on the wire
        let date = Date::decode(&(-10_957i32).to_be_bytes()).unwrap();
        assert_eq!(date.epoch_seconds, 0);
    }

    #[test]
    fn test_timetz_and_interval_field_order() {
        let mut raw = 3_600_000_000i64.to_be_bytes().to_vec();
        raw.extend_from_slice(&(-7200i32).to_be_bytes());
        assert_eq!(
            TimeTz::decode(&raw).unwrap(),
            TimeTz {
                micros: 3_600_000_000,
                zone_offset: -7200
            }
        );

        let mut raw = 5i64.to_be_bytes().to_vec();
        raw.extend_from_slice(&6i32.to_be_bytes());
        raw.extend_from_slice(&7i32.to_be_bytes());
        assert_eq!(
            Interval::decode(&raw).unwrap(),
            Interval {
                micros: 5,
                days: 6,
                months: 7
            }
        );
        assert!(Interval::decode(&raw[..12]).is_err());
    }

    #[test]
    fn test_array_with_null_element() {
        let raw = array_image(
            Oid::INT4,
            &[
                Some(10i32.to_be_bytes().to_vec()),
                None,
                Some(30i32.to_be_bytes().to_vec()),
            ],
        );
        assert_eq!(decode_array::<i32>(&raw, -1, true).unwrap(), vec![10, -1, 30]);
    }

    #[test]
    fn test_array_ignores_bytes_past_declared_size() {
        let mut raw = array_image(Oid::INT2, &[Some(1i16.to_be_bytes().to_vec())]);
        raw.extend_from_slice(&[0xff; 7]);
        assert_eq!(decode_array::<i16>(&raw, 0, true).unwrap(), vec![1]);
    }

    #[test]
    fn test_array_rejects_element_type_mismatch() {
        let raw = array_image(Oid::INT8, &[Some(1i64.to_be_bytes().to_vec())]);
        assert_eq!(
            decode_array::<i32>(&raw, 0, true),
            Err(DecodeError::TypeMismatch {
                expected: Oid::INT4,
                actual: Oid::INT8
            })
        );
    }

    #[test]
    fn test_array_rejects_two_dimensions() {
        let mut raw = array_image(Oid::BOOL, &[Some(vec![1])]);
        raw[..4].copy_from_slice(&2i32.to_be_bytes());
        assert_eq!(
            decode_array::<bool>(&raw, false, true),
            Err(DecodeError::UnsupportedDimensionality(2))
        );
    }

    #[test]
    fn test_empty_array() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&Oid::INT4.as_i32().to_be_bytes());
        assert!(decode_array::<i32>(&raw, 0, true).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_array() {
        let raw = array_image(Oid::INT4, &[Some(1i32.to_be_bytes().to_vec())]);
        assert!(matches!(
            decode_array::<i32>(&raw[..raw.len() - 2], 0, true),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
