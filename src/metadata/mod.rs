// Schema metadata for logical tables
use std::collections::HashMap;

use crate::core::{ColumnMetadata, DataType, ShardingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    #[must_use]
    pub fn new(name: &str, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            name: name.to_lowercase(),
            columns,
        }
    }

    #[must_use]
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// Logical table → columns, keyed by lowercase table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    tables: HashMap<String, TableMetadata>,
}

impl SchemaMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableMetadata) {
        self.tables.insert(table.name.clone(), table);
    }

    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn require_table(&self, name: &str) -> Result<&TableMetadata, ShardingError> {
        self.get_table(name)
            .ok_or_else(|| ShardingError::TableNotFound(name.to_string()))
    }

    #[must_use]
    pub fn contains_column(&self, table: &str, column: &str) -> bool {
        self.get_table(table)
            .is_some_and(|t| t.get_column_index(column).is_some())
    }

    /// Builds metadata from `(table, [(column, type, pk)])` tuples, handy for tests.
    #[must_use]
    pub fn from_tables(tables: &[(&str, &[(&str, DataType, bool)])]) -> Self {
        let mut schema = Self::new();
        for (name, columns) in tables {
            let columns = columns
                .iter()
                .map(|(c, t, pk)| ColumnMetadata::new(c, t.clone(), *pk))
                .collect();
            schema.add_table(TableMetadata::new(name, columns));
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = SchemaMetadata::from_tables(&[(
            "T_Order",
            &[("order_id", DataType::Integer, true), ("user_id", DataType::Integer, false)],
        )]);
        let table = schema.get_table("t_order").unwrap();
        assert_eq!(table.get_column_index("USER_ID"), Some(1));
        assert_eq!(table.primary_key().unwrap().name, "order_id");
        assert!(schema.contains_column("T_ORDER", "order_id"));
        assert!(matches!(schema.require_table("missing"), Err(ShardingError::TableNotFound(_))));
    }
}
