//! Typed, append-only record table
//!
//! A [`Schema`] is an ordered list of named, typed fields. It is assembled
//! with a [`SchemaBuilder`] from the field descriptors of one tick and fixed
//! when the first row is written. Storage is one typed [`Column`] per field
//! (struct-of-arrays); a field of width `w` stores `w` consecutive values
//! per row. Only the logged prefix is ever visible.

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use thiserror::Error;

/// Record store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unsupported field type '{0}'")]
    UnknownFieldType(String),

    #[error("field '{0}' occurs more than once")]
    DuplicateField(String),

    #[error("field '{name}' must have a positive width")]
    ZeroWidth { name: String },

    #[error("output group {group} has rows of {found} values, its fields need {expected}")]
    WidthMismatch { group: usize, expected: usize, found: usize },

    #[error("output group {group} has {found} rows, expected 1 or {expected}")]
    ShapeMismatch { group: usize, expected: usize, found: usize },

    #[error("row type changed after the first logged row: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("tick produced no output groups")]
    EmptyTick,

    #[error("record table capacity {capacity} exceeded by {requested} rows")]
    CapacityExceeded { capacity: usize, requested: usize },
}

/// Numeric type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    F64,
    F32,
    I64,
    I32,
    U8,
    Bool,
}

impl FieldType {
    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            FieldType::F64 | FieldType::I64 => 8,
            FieldType::F32 | FieldType::I32 => 4,
            FieldType::U8 | FieldType::Bool => 1,
        }
    }

    /// Type code in numpy spelling
    pub fn code(&self) -> &'static str {
        match self {
            FieldType::F64 => "<f8",
            FieldType::F32 => "<f4",
            FieldType::I64 => "<i8",
            FieldType::I32 => "<i4",
            FieldType::U8 => "|u1",
            FieldType::Bool => "|b1",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FieldType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim_start_matches(['<', '=', '|']);
        match code {
            "f8" | "d" | "float64" => Ok(FieldType::F64),
            "f4" | "f" | "float32" => Ok(FieldType::F32),
            "i8" | "int64" => Ok(FieldType::I64),
            "i4" | "int32" => Ok(FieldType::I32),
            "u1" | "uint8" => Ok(FieldType::U8),
            "?" | "b1" | "bool" => Ok(FieldType::Bool),
            _ => Err(RecordError::UnknownFieldType(s.to_string())),
        }
    }
}

/// One named field of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
    dtype: FieldType,
    width: usize,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: FieldType) -> Self {
        Self::vector(name, dtype, 1)
    }

    /// 8-byte float scalar field, the common case
    pub fn f64(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::F64)
    }

    /// Field holding `width` values of `dtype` per row
    pub fn vector(name: impl Into<String>, dtype: FieldType, width: usize) -> Self {
        Self { name: name.into(), dtype, width }
    }

    /// Field from a numpy-style type code such as `"<f8"`
    pub fn parse(name: impl Into<String>, code: &str) -> Result<Self, RecordError> {
        Ok(Self::new(name, code.parse()?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> FieldType {
        self.dtype
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width == 1 {
            write!(f, "('{}', '{}')", self.name, self.dtype)
        } else {
            write!(f, "('{}', '{}', ({},))", self.name, self.dtype, self.width)
        }
    }
}

/// Ordered, fixed set of fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    offsets: Vec<usize>,
    width: usize,
}

impl Schema {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of values in one row
    pub fn width(&self) -> usize {
        self.width
    }

    /// Row size in bytes
    pub fn itemsize(&self) -> usize {
        self.fields.iter().map(|f| f.dtype.size() * f.width).sum()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Position of field `index`'s first value within a row
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|field| field.to_string()).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Accumulates fields, in order, into a [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field) -> Result<&mut Self, RecordError> {
        if field.width == 0 {
            return Err(RecordError::ZeroWidth { name: field.name });
        }
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(RecordError::DuplicateField(field.name));
        }
        self.fields.push(field);
        Ok(self)
    }

    pub fn extend<I>(&mut self, fields: I) -> Result<&mut Self, RecordError>
    where
        I: IntoIterator<Item = Field>,
    {
        for field in fields {
            self.push(field)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Schema {
        let mut offsets = Vec::with_capacity(self.fields.len());
        let mut width = 0;
        for field in &self.fields {
            offsets.push(width);
            width += field.width;
        }
        Schema { fields: self.fields, offsets, width }
    }
}

/// A single typed value read back from the table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    F64(f64),
    F32(f32),
    I64(i64),
    I32(i32),
    U8(u8),
    Bool(bool),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::F64(v) => v,
            Value::F32(v) => v as f64,
            Value::I64(v) => v as f64,
            Value::I32(v) => v as f64,
            Value::U8(v) => v as f64,
            Value::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Typed storage for one field
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
}

impl Column {
    fn with_capacity(dtype: FieldType, capacity: usize) -> Self {
        match dtype {
            FieldType::F64 => Column::F64(Vec::with_capacity(capacity)),
            FieldType::F32 => Column::F32(Vec::with_capacity(capacity)),
            FieldType::I64 => Column::I64(Vec::with_capacity(capacity)),
            FieldType::I32 => Column::I32(Vec::with_capacity(capacity)),
            FieldType::U8 => Column::U8(Vec::with_capacity(capacity)),
            FieldType::Bool => Column::Bool(Vec::with_capacity(capacity)),
        }
    }

    pub fn dtype(&self) -> FieldType {
        match self {
            Column::F64(_) => FieldType::F64,
            Column::F32(_) => FieldType::F32,
            Column::I64(_) => FieldType::I64,
            Column::I32(_) => FieldType::I32,
            Column::U8(_) => FieldType::U8,
            Column::Bool(_) => FieldType::Bool,
        }
    }

    /// Number of stored values (rows times field width)
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::F32(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::I32(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve room for `additional` more values, amortized
    fn reserve(&mut self, additional: usize) {
        match self {
            Column::F64(v) => v.reserve(additional),
            Column::F32(v) => v.reserve(additional),
            Column::I64(v) => v.reserve(additional),
            Column::I32(v) => v.reserve(additional),
            Column::U8(v) => v.reserve(additional),
            Column::Bool(v) => v.reserve(additional),
        }
    }

    /// Append a value, cast to the column type
    fn push(&mut self, value: f64) {
        match self {
            Column::F64(v) => v.push(value),
            Column::F32(v) => v.push(value as f32),
            Column::I64(v) => v.push(value as i64),
            Column::I32(v) => v.push(value as i32),
            Column::U8(v) => v.push(value as u8),
            Column::Bool(v) => v.push(value != 0.0),
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Column::F64(v) => v.get(index).map(|x| Value::F64(*x)),
            Column::F32(v) => v.get(index).map(|x| Value::F32(*x)),
            Column::I64(v) => v.get(index).map(|x| Value::I64(*x)),
            Column::I32(v) => v.get(index).map(|x| Value::I32(*x)),
            Column::U8(v) => v.get(index).map(|x| Value::U8(*x)),
            Column::Bool(v) => v.get(index).map(|x| Value::Bool(*x)),
        }
    }

    /// Borrow the values of an 8-byte float column
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Copy the values out, widened to `f64`
    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get(i)).map(|v| v.as_f64()).collect()
    }
}

/// Append-only table of rows sharing one [`Schema`]
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    schema: Schema,
    columns: Vec<Column>,
    rows: usize,
    capacity: usize,
}

impl RecordTable {
    /// Create an empty table with room for `capacity` rows
    pub fn new(schema: Schema, capacity: usize) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column::with_capacity(f.dtype, capacity * f.width))
            .collect();
        Self { schema, columns, rows: 0, capacity }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of logged rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Rows that fit before the next reallocation
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow the row capacity by `additional` rows
    pub fn reserve(&mut self, additional: usize) {
        for (column, field) in self.columns.iter_mut().zip(self.schema.fields()) {
            let target = (self.capacity + additional) * field.width;
            column.reserve(target - column.len());
        }
        self.capacity += additional;
    }

    /// Append `data.len() / schema.width()` rows given in row-major order
    ///
    /// `schema` must equal the table's schema and the rows must fit into
    /// the current capacity.
    pub fn push_rows(&mut self, schema: &Schema, data: &[f64]) -> Result<usize, RecordError> {
        if *schema != self.schema {
            return Err(RecordError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: schema.to_string(),
            });
        }
        let width = self.schema.width();
        if width == 0 || data.len() % width != 0 {
            return Err(RecordError::WidthMismatch {
                group: 0,
                expected: width,
                found: data.len(),
            });
        }
        let count = data.len() / width;
        if self.rows + count > self.capacity {
            return Err(RecordError::CapacityExceeded {
                capacity: self.capacity,
                requested: self.rows + count,
            });
        }

        for row in data.chunks_exact(width) {
            for (index, column) in self.columns.iter_mut().enumerate() {
                let start = self.schema.offset(index);
                let field_width = self.schema.fields[index].width;
                for value in &row[start..start + field_width] {
                    column.push(*value);
                }
            }
        }
        self.rows += count;
        Ok(count)
    }

    /// Column of the named field
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.index_of(name).map(|i| &self.columns[i])
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows).map(move |index| Row { table: self, index })
    }
}

impl Index<&str> for RecordTable {
    type Output = Column;

    /// # Panics
    ///
    /// Panics if the table has no field called `name`.
    fn index(&self, name: &str) -> &Column {
        match self.column(name) {
            Some(column) => column,
            None => panic!("no field named '{}'", name),
        }
    }
}

/// Borrowed view of one logged row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a RecordTable,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// First value of the named field
    pub fn get(&self, name: &str) -> Option<Value> {
        let i = self.table.schema.index_of(name)?;
        let width = self.table.schema.fields[i].width;
        self.table.columns[i].get(self.index * width)
    }

    /// All values of the named field, widened to `f64`
    pub fn values(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.table.schema.index_of(name)?;
        let width = self.table.schema.fields[i].width;
        let column = &self.table.columns[i];
        (0..width)
            .map(|k| column.get(self.index * width + k).map(|v| v.as_f64()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: Vec<Field>) -> Schema {
        let mut builder = SchemaBuilder::new();
        builder.extend(fields).unwrap();
        builder.build()
    }

    #[test]
    fn test_field_type_codes() {
        assert_eq!("<f8".parse::<FieldType>().unwrap(), FieldType::F64);
        assert_eq!("f4".parse::<FieldType>().unwrap(), FieldType::F32);
        assert_eq!("<i8".parse::<FieldType>().unwrap(), FieldType::I64);
        assert_eq!("|u1".parse::<FieldType>().unwrap(), FieldType::U8);
        assert_eq!("?".parse::<FieldType>().unwrap(), FieldType::Bool);
        assert!(matches!(
            ">f8".parse::<FieldType>(),
            Err(RecordError::UnknownFieldType(_))
        ));
    }

    #[test]
    fn test_schema_builder_rejects_duplicates() {
        let mut builder = SchemaBuilder::new();
        builder.push(Field::f64("t")).unwrap();
        let err = builder.push(Field::f64("t")).unwrap_err();
        assert_eq!(err, RecordError::DuplicateField("t".to_string()));
    }

    #[test]
    fn test_schema_offsets_and_itemsize() {
        let s = schema(vec![
            Field::f64("t"),
            Field::vector("pos", FieldType::F32, 3),
            Field::new("mode", FieldType::U8),
        ]);
        assert_eq!(s.width(), 5);
        assert_eq!(s.offset(1), 1);
        assert_eq!(s.offset(2), 4);
        assert_eq!(s.itemsize(), 8 + 12 + 1);
        assert_eq!(s.to_string(), "('t', '<f8'), ('pos', '<f4', (3,)), ('mode', '|u1')");
    }

    #[test]
    fn test_push_rows_and_read_back() {
        let s = schema(vec![Field::f64("t"), Field::new("n", FieldType::I64)]);
        let mut table = RecordTable::new(s.clone(), 4);

        table.push_rows(&s, &[0.1, 1.0, 0.2, 2.0]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["t"].as_f64().unwrap(), &[0.1, 0.2]);
        assert_eq!(table["n"], Column::I64(vec![1, 2]));
        assert_eq!(table.row(1).unwrap().get("n"), Some(Value::I64(2)));
        assert!(table.row(2).is_none());
    }

    #[test]
    fn test_vector_field_rows() {
        let s = schema(vec![Field::f64("t"), Field::vector("x", FieldType::F64, 2)]);
        let mut table = RecordTable::new(s.clone(), 2);
        table.push_rows(&s, &[0.0, 1.0, 2.0, 1.0, 3.0, 4.0]).unwrap();

        assert_eq!(table["x"].len(), 4);
        assert_eq!(table.row(1).unwrap().values("x"), Some(vec![3.0, 4.0]));
    }

    #[test]
    fn test_capacity_is_enforced_and_reservable() {
        let s = schema(vec![Field::f64("t")]);
        let mut table = RecordTable::new(s.clone(), 1);

        table.push_rows(&s, &[1.0]).unwrap();
        assert!(matches!(
            table.push_rows(&s, &[2.0]),
            Err(RecordError::CapacityExceeded { .. })
        ));

        table.reserve(10);
        assert_eq!(table.capacity(), 11);
        table.push_rows(&s, &[2.0]).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_schema_mismatch() {
        let s = schema(vec![Field::f64("t")]);
        let other = schema(vec![Field::f64("x")]);
        let mut table = RecordTable::new(s, 4);
        assert!(matches!(
            table.push_rows(&other, &[1.0]),
            Err(RecordError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_casts_to_column_type() {
        let s = schema(vec![
            Field::new("flag", FieldType::Bool),
            Field::new("k", FieldType::I32),
        ]);
        let mut table = RecordTable::new(s.clone(), 1);
        table.push_rows(&s, &[2.0, 3.9]).unwrap();

        assert_eq!(table["flag"], Column::Bool(vec![true]));
        assert_eq!(table["k"], Column::I32(vec![3]));
        assert_eq!(table["k"].to_f64(), vec![3.0]);
    }
}
