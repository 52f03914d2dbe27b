//! Typed access to the tuple a stream is positioned on.

use bytes::Bytes;

use super::decode::{decode_array, ArrayElement, FromColumn};
use super::error::DecodeError;
use super::message::RawResult;
use super::protocol::{FieldDescription, Format};
use super::types::Oid;

/// View over exactly one tuple.
///
/// A `Row` borrows the result it reads from, so it cannot outlive the
/// stream position it was taken at. Built over a result that holds no
/// tuple, every accessor fails with `DecodeError::NoActiveRow`.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    result: &'a RawResult,
    number: u64,
    validate_types: bool,
}

impl<'a> Row<'a> {
    pub fn new(result: &'a RawResult, number: u64, validate_types: bool) -> Self {
        Self {
            result,
            number,
            validate_types,
        }
    }

    /// 1-based position of this tuple in its statement's result.
    pub fn number(&self) -> u64 {
        self.number
    }

    fn tuple(&self) -> Result<&'a [Option<Bytes>], DecodeError> {
        self.result.tuple().ok_or(DecodeError::NoActiveRow)
    }

    fn field(&self, column: usize) -> Result<&'a FieldDescription, DecodeError> {
        self.tuple()?;
        let columns = self.result.columns();
        columns.get(column).ok_or(DecodeError::ColumnOutOfRange {
            column,
            count: columns.len(),
        })
    }

    fn value(&self, column: usize) -> Result<Option<&'a [u8]>, DecodeError> {
        let tuple = self.tuple()?;
        tuple
            .get(column)
            .map(|v| v.as_deref())
            .ok_or(DecodeError::ColumnOutOfRange {
                column,
                count: tuple.len(),
            })
    }

    fn check_type(&self, expected: Oid, accepted: bool, actual: Oid) -> Result<(), DecodeError> {
        if self.validate_types && !accepted {
            return Err(DecodeError::TypeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Number of columns.
    pub fn len(&self) -> Result<usize, DecodeError> {
        self.tuple()?;
        Ok(self.result.columns().len())
    }

    pub fn is_empty(&self) -> Result<bool, DecodeError> {
        self.len().map(|n| n == 0)
    }

    /// Whether the column holds SQL NULL.
    pub fn is_null(&self, column: usize) -> Result<bool, DecodeError> {
        Ok(self.value(column)?.is_none())
    }

    pub fn column_name(&self, column: usize) -> Result<&'a str, DecodeError> {
        Ok(self.field(column)?.name.as_str())
    }

    /// Type tag the server reported for the column.
    pub fn column_type(&self, column: usize) -> Result<Oid, DecodeError> {
        Ok(self.field(column)?.type_oid)
    }

    /// Index of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Result<usize, DecodeError> {
        self.tuple()?;
        self.result
            .columns()
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DecodeError::UnknownColumn(name.to_string()))
    }

    /// Raw column bytes, `None` for NULL.
    pub fn raw(&self, column: usize) -> Result<Option<&'a [u8]>, DecodeError> {
        self.field(column)?;
        self.value(column)
    }

    /// Decode a column. NULL yields the type's default (zero, empty string,
    /// zero-valued temporal).
    pub fn get<T: FromColumn>(&self, column: usize) -> Result<T, DecodeError> {
        self.get_or(column, T::null_default())
    }

    /// Decode a column, returning `default` for NULL.
    pub fn get_or<T: FromColumn>(&self, column: usize, default: T) -> Result<T, DecodeError> {
        let field = self.field(column)?;
        self.check_type(T::OID, T::accepts(field.type_oid), field.type_oid)?;

        let Some(raw) = self.value(column)? else {
            return Ok(default);
        };
        if field.format == Format::Text && !T::TEXT_FORMAT_OK {
            return Err(DecodeError::TextFormat { column });
        }
        T::decode(raw)
    }

    /// Decode the column called `name`.
    pub fn get_by_name<T: FromColumn>(&self, name: &str) -> Result<T, DecodeError> {
        self.get(self.column_index(name)?)
    }

    /// Decode a one-dimensional array column. NULL elements become the
    /// element type's default; a NULL column is an empty vector.
    pub fn as_array<T: ArrayElement + Clone>(&self, column: usize) -> Result<Vec<T>, DecodeError> {
        self.as_array_or(column, T::null_default())
    }

    /// Decode a one-dimensional array column, substituting `null_elem` for
    /// NULL elements.
    pub fn as_array_or<T: ArrayElement + Clone>(
        &self,
        column: usize,
        null_elem: T,
    ) -> Result<Vec<T>, DecodeError> {
        let field = self.field(column)?;
        self.check_type(T::ARRAY_OID, field.type_oid == T::ARRAY_OID, field.type_oid)?;

        let Some(raw) = self.value(column)? else {
            return Ok(Vec::new());
        };
        if field.format == Format::Text {
            return Err(DecodeError::TextFormat { column });
        }
        decode_array(raw, null_elem, self.validate_types)
    }
}
