use std::sync::Arc;

use indexmap::IndexMap;

use crate::core::ShardingError;
use super::algorithm::ShardingAlgorithm;
use super::data_node::DataNode;
use super::key_generator::KeyGenerator;

/// Sharding column + the algorithm applied to it for one dimension.
#[derive(Debug, Clone)]
pub struct ShardingStrategy {
    pub column: String,
    pub algorithm_name: String,
    pub algorithm: Arc<dyn ShardingAlgorithm>,
}

#[derive(Debug, Clone)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub generator: Arc<dyn KeyGenerator>,
}

#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub actual_data_nodes: Vec<DataNode>,
    pub database_strategy: Option<ShardingStrategy>,
    pub table_strategy: Option<ShardingStrategy>,
    pub key_generate: Option<KeyGenerateStrategy>,
}

impl TableRule {
    #[must_use]
    pub fn new(logic_table: &str, actual_data_nodes: Vec<DataNode>) -> Self {
        Self {
            logic_table: logic_table.to_lowercase(),
            actual_data_nodes,
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        }
    }

    /// Data sources in first-appearance order.
    #[must_use]
    pub fn actual_data_sources(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !result.contains(&node.data_source) {
                result.push(node.data_source.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    #[must_use]
    pub fn contains_node(&self, data_source: &str, table: &str) -> bool {
        self.actual_data_nodes
            .iter()
            .any(|n| n.data_source == data_source && n.table == table)
    }

    /// Position of `table` among the actual tables of `data_source`.
    #[must_use]
    pub fn table_index_in(&self, data_source: &str, table: &str) -> Option<usize> {
        self.actual_tables_in(data_source).iter().position(|t| t == table)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShardingRule {
    tables: IndexMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    pub default_database_strategy: Option<ShardingStrategy>,
    pub default_table_strategy: Option<ShardingStrategy>,
}

impl ShardingRule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table_rule(&mut self, rule: TableRule) {
        self.tables.insert(rule.logic_table.clone(), rule);
    }

    /// Adds a binding group after checking every member shares the first member's layout.
    pub fn add_binding_group(&mut self, tables: &[String]) -> Result<(), ShardingError> {
        let tables: Vec<String> = tables.iter().map(|t| t.to_lowercase()).collect();
        let Some(first) = tables.first() else {
            return Ok(());
        };
        let first_rule = self.require_table_rule(first)?;
        let first_sources = first_rule.actual_data_sources();
        for other in tables.iter().skip(1) {
            let other_rule = self.require_table_rule(other)?;
            let same_layout = other_rule.actual_data_sources() == first_sources
                && first_sources
                    .iter()
                    .all(|ds| other_rule.actual_tables_in(ds).len() == first_rule.actual_tables_in(ds).len());
            if !same_layout {
                return Err(ShardingError::BindingTableMismatch(first.clone(), other.clone()));
            }
        }
        self.binding_groups.push(tables);
        Ok(())
    }

    pub fn add_broadcast_table(&mut self, table: &str) -> Result<(), ShardingError> {
        let table = table.to_lowercase();
        if self.tables.contains_key(&table) {
            return Err(ShardingError::Config(format!("Table '{table}' cannot be both sharded and broadcast")));
        }
        if !self.broadcast_tables.contains(&table) {
            self.broadcast_tables.push(table);
        }
        Ok(())
    }

    #[must_use]
    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_lowercase())
    }

    pub fn require_table_rule(&self, logic_table: &str) -> Result<&TableRule, ShardingError> {
        self.table_rule(logic_table)
            .ok_or_else(|| ShardingError::TableNotFound(logic_table.to_string()))
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    #[must_use]
    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.tables.contains_key(&logic_table.to_lowercase())
    }

    #[must_use]
    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables.iter().any(|t| t.eq_ignore_ascii_case(logic_table))
    }

    #[must_use]
    pub fn broadcast_tables(&self) -> &[String] {
        &self.broadcast_tables
    }

    #[must_use]
    pub fn database_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.database_strategy.as_ref().or(self.default_database_strategy.as_ref())
    }

    #[must_use]
    pub fn table_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.table_strategy.as_ref().or(self.default_table_strategy.as_ref())
    }

    /// True when `column` drives database or table sharding of `logic_table`.
    #[must_use]
    pub fn is_sharding_column(&self, logic_table: &str, column: &str) -> bool {
        self.table_rule(logic_table).is_some_and(|rule| {
            [self.database_strategy(rule), self.table_strategy(rule)]
                .into_iter()
                .flatten()
                .any(|s| s.column.eq_ignore_ascii_case(column))
        })
    }

    #[must_use]
    pub fn binding_group_of(&self, logic_table: &str) -> Option<&[String]> {
        self.binding_groups
            .iter()
            .find(|group| group.iter().any(|t| t.eq_ignore_ascii_case(logic_table)))
            .map(Vec::as_slice)
    }

    /// All given tables belong to one binding group.
    #[must_use]
    pub fn is_all_binding(&self, logic_tables: &[String]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        self.binding_group_of(first).is_some_and(|group| {
            logic_tables
                .iter()
                .all(|t| group.iter().any(|g| g.eq_ignore_ascii_case(t)))
        })
    }

    /// Actual table of `binding_table` that pairs with `actual_table` of `primary` in `data_source`.
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        primary: &str,
        actual_table: &str,
        binding_table: &str,
    ) -> Result<String, ShardingError> {
        let primary_rule = self.require_table_rule(primary)?;
        let binding_rule = self.require_table_rule(binding_table)?;
        primary_rule
            .table_index_in(data_source, actual_table)
            .and_then(|idx| binding_rule.actual_tables_in(data_source).get(idx).cloned())
            .ok_or_else(|| {
                ShardingError::Route(format!(
                    "No binding actual table of '{binding_table}' for '{data_source}.{actual_table}'"
                ))
            })
    }

    /// Column whose value is generated for `logic_table` when absent from an INSERT.
    #[must_use]
    pub fn generate_key_column(&self, logic_table: &str) -> Option<&KeyGenerateStrategy> {
        self.table_rule(logic_table).and_then(|r| r.key_generate.as_ref())
    }

    /// Every data source named by any table rule, in first-appearance order.
    #[must_use]
    pub fn all_data_sources(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for rule in self.tables.values() {
            for ds in rule.actual_data_sources() {
                if !result.contains(&ds) {
                    result.push(ds);
                }
            }
        }
        result
    }
}
