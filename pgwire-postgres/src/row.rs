//! `PgRow` — a decoded result row, indexable by position or column name.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Error;
use crate::message::{RowDescription, RowField};
use crate::value::{Decode, PgValueRef};
use crate::Result;

/// Shared, immutable column metadata for every row of one result set —
/// cloning a `PgRow` only bumps this `Arc`, not the field list.
#[derive(Debug)]
pub struct PgColumns(Vec<RowField>);

impl PgColumns {
    pub(crate) fn new(description: RowDescription) -> Self {
        PgColumns(description.fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.name.as_str())
    }

    pub(crate) fn type_oids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|f| f.type_oid)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f.name == name)
    }
}

/// A column index: either a position or a name, resolved against a row's
/// [`PgColumns`].
pub trait ColumnIndex {
    fn resolve(&self, columns: &PgColumns) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, columns: &PgColumns) -> Result<usize> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(Error::Internal(format!(
                "column index {self} out of range (row has {} columns)",
                columns.len()
            )))
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, columns: &PgColumns) -> Result<usize> {
        columns
            .index_of(self)
            .ok_or_else(|| Error::Internal(format!("no column named {self:?}")))
    }
}

/// One row of a result set. Values are stored as raw wire bytes and decoded
/// lazily on `try_get`.
#[derive(Debug, Clone)]
pub struct PgRow {
    columns: Arc<PgColumns>,
    values: Vec<Option<Bytes>>,
}

impl PgRow {
    pub(crate) fn new(columns: Arc<PgColumns>, values: Vec<Option<Bytes>>) -> Self {
        PgRow { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &PgColumns {
        &self.columns
    }

    pub fn try_get<'r, T, I>(&'r self, index: I) -> Result<T>
    where
        T: Decode<'r>,
        I: ColumnIndex,
    {
        if self.values.len() != self.columns.len() {
            return Err(Error::OutdatedSchemaCache(format!(
                "row has {} attributes but {} columns were described",
                self.values.len(),
                self.columns.len()
            )));
        }

        let idx = index.resolve(&self.columns)?;
        let field = &self.columns.0[idx];
        let format = if field.format == 1 {
            crate::message::FormatCode::Binary
        } else {
            crate::message::FormatCode::Text
        };
        let value_ref = self.values[idx].as_ref().map(|bytes| PgValueRef {
            oid: field.type_oid,
            format,
            bytes: bytes.as_ref(),
        });
        T::decode_nullable(value_ref)
    }

    pub fn get<'r, T, I>(&'r self, index: I) -> T
    where
        T: Decode<'r>,
        I: ColumnIndex,
    {
        self.try_get(index).expect("PgRow::get: decode failed")
    }

    pub fn is_null(&self, index: impl ColumnIndex) -> bool {
        match index.resolve(&self.columns) {
            Ok(idx) => self.values[idx].is_none(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::oid;

    fn field(name: &str, type_oid: u32, format: i16) -> RowField {
        RowField {
            name: name.to_owned(),
            table_oid: 0,
            column_attr_number: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format,
        }
    }

    fn row(values: Vec<Option<Bytes>>, fields: Vec<RowField>) -> PgRow {
        PgRow::new(Arc::new(PgColumns::new(RowDescription { fields })), values)
    }

    #[test]
    fn try_get_by_position_and_name() {
        let row = row(
            vec![Some(Bytes::from_static(b"7")), Some(Bytes::from_static(b"hi"))],
            vec![field("id", oid::INT4, 0), field("label", oid::TEXT, 0)],
        );
        assert_eq!(row.try_get::<i32, _>(0).unwrap(), 7);
        assert_eq!(row.try_get::<String, _>("label").unwrap(), "hi");
    }

    #[test]
    fn try_get_unknown_column_name_errors() {
        let row = row(vec![Some(Bytes::from_static(b"7"))], vec![field("id", oid::INT4, 0)]);
        assert!(row.try_get::<i32, _>("missing").is_err());
    }

    #[test]
    fn try_get_out_of_range_index_errors() {
        let row = row(vec![Some(Bytes::from_static(b"7"))], vec![field("id", oid::INT4, 0)]);
        assert!(row.try_get::<i32, _>(5).is_err());
    }

    #[test]
    fn is_null_reports_null_column_and_false_for_unknown() {
        let row = row(vec![None], vec![field("id", oid::INT4, 0)]);
        assert!(row.is_null(0));
        assert!(!row.is_null("nope"));
    }

    #[test]
    fn try_get_optional_decodes_null_as_none() {
        let row = row(vec![None], vec![field("id", oid::INT4, 0)]);
        assert_eq!(row.try_get::<Option<i32>, _>(0).unwrap(), None);
    }
}
