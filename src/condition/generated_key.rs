use crate::core::{ShardingError, Value};
use crate::rule::RuleSet;
use crate::statement::StatementContext;

/// Key column of an INSERT and its value per row.
///
/// `generated` is true when the statement omitted the column and the values
/// come from the configured key generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKey {
    pub column: String,
    pub values: Vec<Value>,
    pub generated: bool,
}

impl GeneratedKey {
    /// Resolves the key of an INSERT into a table with a key generate strategy.
    pub fn resolve(
        statement: &StatementContext,
        parameters: &[Value],
        rules: &RuleSet,
    ) -> Result<Option<Self>, ShardingError> {
        let (Some(insert), Some(table)) = (&statement.insert, statement.primary_table()) else {
            return Ok(None);
        };
        let Some(strategy) = rules.sharding.generate_key_column(&table.logic_name()) else {
            return Ok(None);
        };

        let position = insert
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&strategy.column));
        let values = match position {
            Some(position) => insert
                .values
                .iter()
                .map(|row| {
                    row.values
                        .get(position)
                        .and_then(|e| e.resolve(parameters))
                        .ok_or_else(|| ShardingError::Route(format!("Cannot resolve value of key column '{}'", strategy.column)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            // Without a column list the key must be among the written values.
            None if insert.columns.is_empty() => return Ok(None),
            None => insert.values.iter().map(|_| strategy.generator.generate_key()).collect(),
        };
        Ok(Some(Self {
            column: strategy.column.clone(),
            values,
            generated: position.is_none(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;
    use crate::rule::key_generator::SnowflakeKeyGenerator;
    use crate::rule::{DataNode, KeyGenerateStrategy, TableRule};
    use std::sync::Arc;

    fn rules() -> RuleSet {
        let mut rule = TableRule::new("t_order", vec![DataNode::new("ds_0", "t_order")]);
        rule.key_generate = Some(KeyGenerateStrategy {
            column: "order_id".to_string(),
            generator: Arc::new(SnowflakeKeyGenerator::new(1).unwrap()),
        });
        let mut rules = RuleSet::default();
        rules.sharding.add_table_rule(rule);
        rules
    }

    #[test]
    fn test_generates_one_key_per_row() {
        let statement = parse_statement("INSERT INTO t_order (user_id) VALUES (1), (2)").unwrap();
        let key = GeneratedKey::resolve(&statement, &[], &rules()).unwrap().unwrap();
        assert!(key.generated);
        assert_eq!(key.values.len(), 2);
        assert_ne!(key.values[0], key.values[1]);
    }

    #[test]
    fn test_explicit_key_values_are_reported() {
        let statement = parse_statement("INSERT INTO t_order (order_id, user_id) VALUES (?, 1)").unwrap();
        let key = GeneratedKey::resolve(&statement, &[Value::Integer(77)], &rules()).unwrap().unwrap();
        assert!(!key.generated);
        assert_eq!(key.values, vec![Value::Integer(77)]);
    }
}
