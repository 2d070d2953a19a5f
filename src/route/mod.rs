// Routing: sharding conditions + rules -> route units
mod decorator;
mod engine;
mod sharding;
mod validator;

pub use engine::RouteEngine;

use crate::condition::GeneratedKey;

/// Logical name and the physical name it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    #[must_use]
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        Self { logic_name: logic_name.to_string(), actual_name: actual_name.to_string() }
    }
}

/// One physical target: a data source and the actual table for each logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    #[must_use]
    pub fn new(data_source: &str, table_mappers: Vec<RouteMapper>) -> Self {
        Self { data_source: RouteMapper::new(data_source, data_source), table_mappers }
    }

    /// Actual table for `logic_table`, if this unit maps it.
    #[must_use]
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_name.as_str())
    }
}

impl std::fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables: Vec<String> = self
            .table_mappers
            .iter()
            .map(|m| format!("{}->{}", m.logic_name, m.actual_name))
            .collect();
        write!(f, "{} [{}]", self.data_source.actual_name, tables.join(", "))
    }
}

/// Result of routing one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteContext {
    pub units: Vec<RouteUnit>,
    /// INSERT only: unit index of each values row.
    pub insert_row_units: Vec<usize>,
    pub generated_key: Option<GeneratedKey>,
    /// Update counts are summed across units.
    pub accumulate: bool,
}

impl RouteContext {
    #[must_use]
    pub fn is_single_routing(&self) -> bool {
        self.units.len() == 1
    }

    /// Actual data sources in unit order, deduplicated.
    #[must_use]
    pub fn actual_data_sources(&self) -> Vec<&str> {
        let mut result: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !result.contains(&unit.data_source.actual_name.as_str()) {
                result.push(&unit.data_source.actual_name);
            }
        }
        result
    }

    /// Rows of an INSERT that belong to unit `unit`.
    #[must_use]
    pub fn insert_rows_of(&self, unit: usize) -> Vec<usize> {
        self.insert_row_units
            .iter()
            .enumerate()
            .filter(|(_, u)| **u == unit)
            .map(|(row, _)| row)
            .collect()
    }
}
