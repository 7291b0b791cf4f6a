//! Result-shape helpers over fetched rows.

use std::collections::{HashMap, HashSet};

use super::source::{Row, Value};
use crate::core::error::{Error, Result};

/// Rows fetched by a query, with shape-enforcing adaptors.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    rows: Vec<Row>,
    /// Projected column names, used to qualify null-field errors.
    columns: Vec<String>,
    table: String,
}

impl Rows {
    pub(crate) fn new(table: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            rows,
            columns,
            table: table.into(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were produced.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row.
    ///
    /// # Errors
    ///
    /// [`Error::NoRecordsMatch`] when no rows were produced.
    pub fn first(mut self) -> Result<Row> {
        if self.rows.is_empty() {
            return Err(Error::NoRecordsMatch);
        }
        Ok(self.rows.swap_remove(0))
    }

    /// The first row, or `None`.
    pub fn first_optional(mut self) -> Option<Row> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.rows.swap_remove(0))
        }
    }

    /// Exactly one row.
    ///
    /// # Errors
    ///
    /// [`Error::MoreThanOneRecord`] when a second row was observed;
    /// [`Error::NoRecordsMatch`] when none was.
    pub fn single(self) -> Result<Row> {
        match self.single_optional()? {
            Some(row) => Ok(row),
            None => Err(Error::NoRecordsMatch),
        }
    }

    /// At most one row.
    ///
    /// # Errors
    ///
    /// [`Error::MoreThanOneRecord`] when a second row was observed.
    pub fn single_optional(mut self) -> Result<Option<Row>> {
        if self.rows.len() > 1 {
            return Err(Error::MoreThanOneRecord);
        }
        Ok(self.rows.pop())
    }

    /// All rows in order.
    pub fn to_list(self) -> Vec<Row> {
        self.rows
    }

    /// The values of column `index` as a set.
    pub fn to_set(self, index: usize) -> HashSet<Value> {
        self.rows.into_iter().map(|row| row.get(index)).collect()
    }

    /// Build a map keyed by column `key_index` with values from
    /// `value_index`.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedNullField`] carrying the qualified field name when
    /// a key is NULL.
    pub fn to_map(self, key_index: usize, value_index: usize) -> Result<HashMap<Value, Value>> {
        let field = self.qualified_field(key_index);
        let mut map = HashMap::with_capacity(self.rows.len());
        for row in self.rows {
            let key = row.get(key_index);
            if key.is_null() {
                return Err(Error::UnexpectedNullField {
                    field: field.clone(),
                });
            }
            map.insert(key, row.get(value_index));
        }
        Ok(map)
    }

    fn qualified_field(&self, index: usize) -> String {
        match self.columns.get(index) {
            Some(column) => format!("{}.{column}", self.table),
            None => format!("{}.<column {index}>", self.table),
        }
    }
}
