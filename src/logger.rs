//! Per-tick output groups and their merge into the record table
//!
//! Every tick the model returns an ordered list of [`OutputGroup`]s. A group
//! names one or more typed fields and carries either one row per integrator
//! substep or a single row. The [`Logger`] lines the groups up side by side,
//! repeats single-row groups over the tick's rows (zero-order hold) and
//! appends the result to its [`RecordTable`].

use nalgebra::DVector;

use crate::record::{Field, RecordError, RecordTable, SchemaBuilder};
use crate::utils::constants::{LOG_CHUNK_FACTOR, LOG_CHUNK_MAX};

/// Values of one or more fields for the rows of a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGroup {
    fields: Vec<Field>,
    rows: usize,
    data: Vec<f64>,
    ragged: bool,
}

impl OutputGroup {
    /// Group with one row per item of `rows`
    pub fn rows<I, R>(fields: Vec<Field>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        let mut data = Vec::new();
        let mut count = 0;
        let mut row_len = None;
        let mut ragged = false;
        for row in rows {
            let row = row.as_ref();
            ragged |= *row_len.get_or_insert(row.len()) != row.len();
            data.extend_from_slice(row);
            count += 1;
        }
        Self { fields, rows: count, data, ragged }
    }

    /// Single-row group, held over every row of the tick
    pub fn single(fields: Vec<Field>, values: &[f64]) -> Self {
        Self { fields, rows: 1, data: values.to_vec(), ragged: false }
    }

    /// Single `f64` field holding one value
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::single(vec![Field::f64(name)], &[value])
    }

    /// Single `f64` field with one row per value
    pub fn column(name: impl Into<String>, values: &[f64]) -> Self {
        Self { fields: vec![Field::f64(name)], rows: values.len(), data: values.to_vec(), ragged: false }
    }

    /// One row per state vector
    pub fn states(fields: Vec<Field>, states: &[DVector<f64>]) -> Self {
        Self::rows(fields, states.iter().map(|x| x.as_slice()))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of rows carried by this group
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of values per row the fields call for
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.width()).sum()
    }

    /// Values of row `index`, row-major
    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.width();
        &self.data[index * width..(index + 1) * width]
    }

    fn check_width(&self, group: usize) -> Result<(), RecordError> {
        let expected = self.width();
        if self.ragged || self.data.len() != self.rows * expected {
            let found = if self.rows == 0 { self.data.len() } else { self.data.len() / self.rows };
            return Err(RecordError::WidthMismatch { group, expected, found });
        }
        Ok(())
    }
}

/// Merges output groups into rows and owns the record table
#[derive(Debug, Clone, Default)]
pub struct Logger {
    table: RecordTable,
    chunk: usize,
    started: bool,
}

impl Logger {
    /// Create a logger; `chunk` is the initial row-capacity estimate
    ///
    /// Estimates above `LOG_CHUNK_MAX` are capped; the table grows past it
    /// on demand.
    pub fn new(chunk: usize) -> Self {
        Self { table: RecordTable::default(), chunk: chunk.min(LOG_CHUNK_MAX), started: false }
    }

    /// Rows logged so far
    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn into_table(self) -> RecordTable {
        self.table
    }

    /// Current growth chunk in rows
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Merge one tick's groups and append the resulting rows
    ///
    /// Returns the number of rows appended.
    pub fn log(&mut self, groups: &[OutputGroup]) -> Result<usize, RecordError> {
        if groups.is_empty() {
            return Err(RecordError::EmptyTick);
        }
        for (index, group) in groups.iter().enumerate() {
            group.check_width(index)?;
        }

        // The richest group (continuous substeps) sets the row count
        let rows = groups.iter().map(|g| g.len()).find(|&n| n != 1).unwrap_or(1);
        for (index, group) in groups.iter().enumerate() {
            if group.len() != 1 && group.len() != rows {
                return Err(RecordError::ShapeMismatch { group: index, expected: rows, found: group.len() });
            }
        }

        let mut builder = SchemaBuilder::new();
        for group in groups {
            builder.extend(group.fields().iter().cloned())?;
        }
        let schema = builder.build();

        let mut data = Vec::with_capacity(rows * schema.width());
        for row in 0..rows {
            for group in groups {
                let source = if group.len() == 1 { 0 } else { row };
                data.extend_from_slice(group.row(source));
            }
        }

        if !self.started {
            self.chunk = self.chunk.max(LOG_CHUNK_FACTOR * rows);
            log::debug!("record table created with {} rows for [{}]", self.chunk, schema);
            self.table = RecordTable::new(schema.clone(), self.chunk);
            self.started = true;
        }
        if self.table.len() + rows > self.table.capacity() {
            let additional = self.chunk.max(LOG_CHUNK_FACTOR * rows);
            log::debug!(
                "record table grown by {} rows (capacity {})",
                additional,
                self.table.capacity() + additional
            );
            self.table.reserve(additional);
        }

        self.table.push_rows(&schema, &data)
    }
}
