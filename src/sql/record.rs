//! Record contract consumed by the facade's record operations.

use super::source::{Predicate, Value};

/// Metadata for one column of a record's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl Column {
    /// A regular nullable column.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            primary_key: false,
            nullable: true,
        }
    }

    /// A non-nullable primary-key column.
    pub const fn primary_key(name: &'static str) -> Self {
        Self {
            name,
            primary_key: true,
            nullable: false,
        }
    }

    /// Mark the column NOT NULL.
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A mutable row image with per-field changed flags, the shape the external
/// record metadata exposes to the facade.
pub trait Record: Send {
    /// Table the record belongs to.
    fn table(&self) -> &str;

    /// Column metadata in declared order.
    fn columns(&self) -> &[Column];

    /// Current value of `column`.
    fn get(&self, column: &str) -> Value;

    /// Overwrite the value of `column`.
    fn set(&mut self, column: &str, value: Value);

    /// Whether `column` has been modified since the flags were last cleared.
    fn changed(&self, column: &str) -> bool;

    /// Set or clear the changed flag of `column`.
    fn set_changed(&mut self, column: &str, changed: bool);
}

/// Names of columns currently marked changed, in declared order.
pub(crate) fn changed_columns<R: Record + ?Sized>(record: &R) -> Vec<String> {
    record
        .columns()
        .iter()
        .filter(|c| record.changed(c.name))
        .map(|c| c.name.to_string())
        .collect()
}

/// Clear every changed flag on the record.
pub(crate) fn clear_changed<R: Record + ?Sized>(record: &mut R) {
    let names: Vec<&'static str> = record.columns().iter().map(|c| c.name).collect();
    for name in names {
        record.set_changed(name, false);
    }
}

/// Equality conjunction over the record's primary-key fields, in declared
/// order, using the record's current values.
pub(crate) fn primary_key_predicate<R: Record + ?Sized>(record: &R) -> Predicate {
    let parts: Vec<Predicate> = record
        .columns()
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| Predicate::Eq(c.name.to_string(), record.get(c.name)))
        .collect();
    Predicate::And(parts)
}

/// Copy a returning row back into the record positionally over the declared
/// column order, then clear all changed flags.
pub(crate) fn copy_back<R: Record + ?Sized>(record: &mut R, row: &super::source::Row) {
    let names: Vec<&'static str> = record.columns().iter().map(|c| c.name).collect();
    for (index, name) in names.iter().enumerate() {
        record.set(name, row.get(index));
    }
    clear_changed(record);
}
