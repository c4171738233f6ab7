use crate::error::TableError;
use crate::types::RecordTable;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Values the user picked per column, as received from a control surface.
pub type SelectionInput = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSelection {
    pub column: String,
    pub options: Vec<String>,
    pub selected: BTreeSet<String>,
}

impl ColumnSelection {
    pub fn is_selected(&self, value: &str) -> bool {
        self.selected.contains(value)
    }
}

/// Current choice for each categorical filter column. Built from the table
/// being filtered and passed explicitly into [`FilterSelection::apply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSelection {
    columns: Vec<ColumnSelection>,
}

impl FilterSelection {
    /// Every distinct value of every column selected.
    pub fn from_table(table: &RecordTable, columns: &[String]) -> Result<Self, TableError> {
        let columns = columns.iter()
            .map(|column| -> Result<ColumnSelection, TableError> {
                let options = table.distinct_values(column)?;
                let selected = options.iter().cloned().collect();
                Ok(ColumnSelection {
                    column: column.clone(),
                    options,
                    selected,
                })
            })
            .collect::<Result<Vec<_>, TableError>>()?;

        Ok(Self { columns })
    }

    /// Replace the selection for the columns named in `input`. Values outside
    /// a column's options are dropped; unnamed columns keep their selection.
    pub fn with_input(mut self, input: &SelectionInput) -> Self {
        for column in self.unknown_columns(input) {
            warn!("Ignoring selection for '{}': not a filter column", column);
        }

        for selection in &mut self.columns {
            let Some(values) = input.get(&selection.column) else { continue };

            let (known, unknown): (Vec<&String>, Vec<&String>) = values.iter()
                .partition(|v| selection.options.binary_search(v).is_ok());
            if !unknown.is_empty() {
                debug!("Ignoring {} unknown values for '{}'", unknown.len(), selection.column);
            }
            selection.selected = known.into_iter().cloned().collect();
        }
        self
    }

    /// Keys of `input` that name no filter column.
    pub fn unknown_columns<'a>(&self, input: &'a SelectionInput) -> Vec<&'a str> {
        input.keys()
            .filter(|key| self.get(key).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn columns(&self) -> &[ColumnSelection] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&ColumnSelection> {
        self.columns.iter().find(|s| s.column == column)
    }

    /// Rows whose value is selected in every filter column, original order kept.
    pub fn apply(&self, table: &RecordTable) -> Result<RecordTable, TableError> {
        let mut indexed = Vec::with_capacity(self.columns.len());
        for selection in &self.columns {
            indexed.push((table.column_index(&selection.column)?, selection));
        }

        Ok(table.retain_rows(|row| {
            indexed.iter().all(|(idx, selection)| {
                row.get(*idx).is_some_and(|value| selection.is_selected(value))
            })
        }))
    }
}
