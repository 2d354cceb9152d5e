//! Row representation for query results.

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// A row from a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<Column>,
    values: Vec<SqlValue>,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column index.
    pub index: usize,
}

impl Row {
    /// Create a new row from column names and values.
    #[must_use]
    pub fn new(names: &[&str], values: Vec<SqlValue>) -> Self {
        let columns = names
            .iter()
            .enumerate()
            .map(|(index, name)| Column {
                name: (*name).to_string(),
                index,
            })
            .collect();
        Self { columns, values }
    }

    /// Get a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
            .and_then(|index| self.values.get(index))
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Iterate over (column, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Column, &SqlValue)> {
        self.columns.iter().zip(self.values.iter())
    }
}

impl IntoIterator for Row {
    type Item = SqlValue;
    type IntoIter = std::vec::IntoIter<SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            &["id", "name"],
            vec![SqlValue::Int(1), SqlValue::Text("ada".into())],
        )
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = sample();
        assert_eq!(row.get(0), Some(&SqlValue::Int(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&SqlValue::Text("ada".into())));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(9), None);
    }

    #[test]
    fn test_iteration() {
        let row = sample();
        assert_eq!(row.len(), 2);
        let names: Vec<_> = row.iter().map(|(column, _)| column.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);

        let values: Vec<_> = row.into_iter().collect();
        assert_eq!(values.len(), 2);
    }
}
