use crate::error::TableError;
use std::collections::BTreeSet;

/// Rows from an uploaded file, columns named verbatim from its header row.
/// Cells are kept as opaque strings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RecordTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns.iter().position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Cells of one column in row order.
    pub fn column<'a>(&'a self, name: &str) -> Result<impl Iterator<Item = &'a str> + 'a, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| row.get(idx).map(String::as_str).unwrap_or("")))
    }

    /// Distinct values of a column, sorted.
    pub fn distinct_values(&self, name: &str) -> Result<Vec<String>, TableError> {
        let values: BTreeSet<&str> = self.column(name)?.collect();
        Ok(values.into_iter().map(str::to_string).collect())
    }

    /// New table holding the rows for which `keep` is true, in original order.
    pub fn retain_rows<F>(&self, mut keep: F) -> RecordTable
    where
        F: FnMut(&[String]) -> bool,
    {
        RecordTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RecordTable {
        RecordTable::new(
            vec!["Field_ID".into(), "Crop".into()],
            vec![
                vec!["F1".into(), "wheat".into()],
                vec!["F2".into(), "barley".into()],
                vec!["F3".into(), "wheat".into()],
            ],
        )
    }

    #[test]
    fn distinct_values_are_sorted_and_unique() {
        assert_eq!(table().distinct_values("Crop").unwrap(), vec!["barley", "wheat"]);
    }

    #[test]
    fn unknown_column_is_reported_by_name() {
        match table().column_index("Yield") {
            Err(TableError::MissingColumn(name)) => assert_eq!(name, "Yield"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn retain_rows_keeps_order() {
        let kept = table().retain_rows(|row| row[1] == "wheat");
        let ids: Vec<&str> = kept.column("Field_ID").unwrap().collect();
        assert_eq!(ids, vec!["F1", "F3"]);
        assert_eq!(kept.columns(), table().columns());
    }
}
