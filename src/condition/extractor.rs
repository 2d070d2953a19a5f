use super::{ConditionValue, GeneratedKey, ShardingCondition, ShardingConditions};
use crate::core::{ShardingError, Value};
use crate::metadata::SchemaMetadata;
use crate::rule::{Bound, RuleSet, ShardingRange};
use crate::statement::{
    ColumnSegment, CompareOperator, ConditionExpr, ExpressionSegment, PredicateRight, PredicateSegment,
    StatementContext, StatementKind,
};

/// Collects sharding conditions from WHERE conjuncts and INSERT rows.
///
/// Only top-level AND conjuncts are inspected. Anything under OR, negation or
/// a non-equality comparison is left out, which widens the route and never
/// narrows it incorrectly.
pub struct ConditionExtractor<'a> {
    rules: &'a RuleSet,
    metadata: &'a SchemaMetadata,
}

fn resolve(expr: &ExpressionSegment, parameters: &[Value]) -> Result<Option<Value>, ShardingError> {
    match expr {
        ExpressionSegment::Column(_) => Ok(None),
        ExpressionSegment::Parameter { index, .. } if *index >= parameters.len() => {
            Err(ShardingError::ParameterOutOfRange { index: *index, count: parameters.len() })
        }
        other => Ok(other.resolve(parameters)),
    }
}

impl<'a> ConditionExtractor<'a> {
    #[must_use]
    pub const fn new(rules: &'a RuleSet, metadata: &'a SchemaMetadata) -> Self {
        Self { rules, metadata }
    }

    pub fn extract(
        &self,
        statement: &StatementContext,
        parameters: &[Value],
        generated_key: Option<&GeneratedKey>,
    ) -> Result<ShardingConditions, ShardingError> {
        match statement.kind {
            StatementKind::Insert => self.extract_insert(statement, parameters, generated_key),
            StatementKind::Update => {
                self.reject_sharding_key_update(statement)?;
                self.extract_where(statement, parameters)
            }
            StatementKind::Select | StatementKind::Delete => self.extract_where(statement, parameters),
        }
    }

    fn reject_sharding_key_update(&self, statement: &StatementContext) -> Result<(), ShardingError> {
        for assignment in &statement.assignments {
            for table in self.owning_tables(statement, &assignment.column) {
                if self.rules.sharding.is_sharding_column(&table, &assignment.column.name) {
                    return Err(ShardingError::ShardingKeyUpdate {
                        table,
                        column: assignment.column.name.to_lowercase(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Tables a column may belong to. An unresolvable bare column is attributed
    /// to every touched table that shards on a column of that name.
    fn owning_tables(&self, statement: &StatementContext, column: &ColumnSegment) -> Vec<String> {
        match statement.table_of_column(column, self.metadata) {
            Ok(table) => vec![table],
            Err(_) if column.owner.is_none() => statement
                .logic_table_names()
                .into_iter()
                .filter(|t| self.rules.sharding.is_sharding_column(t, &column.name))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn extract_where(&self, statement: &StatementContext, parameters: &[Value]) -> Result<ShardingConditions, ShardingError> {
        let mut conditions = ShardingConditions::default();
        if let Some(where_segment) = &statement.where_segment {
            self.collect(statement, &where_segment.expr, parameters, &mut conditions)?;
        }
        Ok(conditions)
    }

    fn collect(
        &self,
        statement: &StatementContext,
        expr: &ConditionExpr,
        parameters: &[Value],
        out: &mut ShardingConditions,
    ) -> Result<(), ShardingError> {
        for conjunct in expr.and_conjuncts() {
            match conjunct {
                ConditionExpr::Group { inner, .. } => self.collect(statement, inner, parameters, out)?,
                ConditionExpr::Predicate(predicate) if !predicate.negated => {
                    let Some(value) = Self::condition_value(predicate, parameters)? else {
                        continue;
                    };
                    for table in self.owning_tables(statement, &predicate.column) {
                        if self.rules.sharding.is_sharding_column(&table, &predicate.column.name) {
                            out.add(ShardingCondition {
                                table,
                                column: predicate.column.name.to_lowercase(),
                                value: value.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn condition_value(predicate: &PredicateSegment, parameters: &[Value]) -> Result<Option<ConditionValue>, ShardingError> {
        let to_bound = |expr: &ExpressionSegment, inclusive: bool| -> Result<Option<Bound>, ShardingError> {
            Ok(resolve(expr, parameters)?.map(|value| Bound { value, inclusive }))
        };
        let value = match &predicate.right {
            PredicateRight::Compare(CompareOperator::Eq, expr) => resolve(expr, parameters)?.map(ConditionValue::Precise),
            PredicateRight::Compare(CompareOperator::NotEq, _) => None,
            PredicateRight::Compare(op, expr) => {
                let inclusive = matches!(op, CompareOperator::LtEq | CompareOperator::GtEq);
                let Some(bound) = to_bound(expr, inclusive)? else {
                    return Ok(None);
                };
                let range = if matches!(op, CompareOperator::Gt | CompareOperator::GtEq) {
                    ShardingRange { lower: Some(bound), upper: None }
                } else {
                    ShardingRange { lower: None, upper: Some(bound) }
                };
                Some(ConditionValue::Range(range))
            }
            PredicateRight::In(items) => {
                let mut values: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let Some(value) = resolve(item, parameters)? else {
                        return Ok(None);
                    };
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                match values.len() {
                    1 => values.pop().map(ConditionValue::Precise),
                    _ => Some(ConditionValue::ListOf(values)),
                }
            }
            PredicateRight::Between(low, high) => match (to_bound(low, true)?, to_bound(high, true)?) {
                (Some(lower), Some(upper)) => {
                    Some(ConditionValue::Range(ShardingRange { lower: Some(lower), upper: Some(upper) }))
                }
                _ => None,
            },
            PredicateRight::IsNull | PredicateRight::Like(_) => None,
        };
        Ok(value)
    }

    fn extract_insert(
        &self,
        statement: &StatementContext,
        parameters: &[Value],
        generated_key: Option<&GeneratedKey>,
    ) -> Result<ShardingConditions, ShardingError> {
        let (Some(insert), Some(table)) = (&statement.insert, statement.primary_table()) else {
            return Ok(ShardingConditions::default());
        };
        let table = table.logic_name();
        if !self.rules.sharding.is_sharding_table(&table) {
            return Ok(ShardingConditions::default());
        }
        let columns: Vec<String> = if insert.columns.is_empty() {
            self.metadata.require_table(&table)?.column_names()
        } else {
            insert.columns.iter().map(|c| c.name.to_lowercase()).collect()
        };

        let mut rows = Vec::with_capacity(insert.values.len());
        for (row_index, row) in insert.values.iter().enumerate() {
            if row.values.len() != columns.len() {
                return Err(ShardingError::InsertValueCountMismatch(row_index + 1));
            }
            let mut conditions = Vec::new();
            for (column, expr) in columns.iter().zip(&row.values) {
                if !self.rules.sharding.is_sharding_column(&table, column) {
                    continue;
                }
                let value = match expr {
                    ExpressionSegment::Column(_) => {
                        return Err(ShardingError::Route(format!("Sharding column '{column}' must be a value")))
                    }
                    other => resolve(other, parameters)?.unwrap_or(Value::Null),
                };
                conditions.push(ShardingCondition {
                    table: table.clone(),
                    column: column.clone(),
                    value: ConditionValue::Precise(value),
                });
            }
            if let Some(key) = generated_key.filter(|k| k.generated) {
                if self.rules.sharding.is_sharding_column(&table, &key.column) {
                    if let Some(value) = key.values.get(row_index) {
                        conditions.push(ShardingCondition {
                            table: table.clone(),
                            column: key.column.to_lowercase(),
                            value: ConditionValue::Precise(value.clone()),
                        });
                    }
                }
            }
            rows.push(conditions);
        }
        Ok(ShardingConditions { insert_rows: rows, ..ShardingConditions::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;
    use crate::rule::algorithm::ModShardingAlgorithm;
    use crate::rule::{DataNode, ShardingStrategy, TableRule};
    use std::sync::Arc;

    fn rules() -> RuleSet {
        let mut rule = TableRule::new("t_order", vec![DataNode::new("ds_0", "t_order_0"), DataNode::new("ds_0", "t_order_1")]);
        rule.table_strategy = Some(ShardingStrategy {
            column: "order_id".to_string(),
            algorithm_name: "order_mod".to_string(),
            algorithm: Arc::new(ModShardingAlgorithm::new(2).unwrap()),
        });
        let mut rules = RuleSet::default();
        rules.sharding.add_table_rule(rule);
        rules
    }

    fn extract(sql: &str, parameters: &[Value]) -> Result<ShardingConditions, ShardingError> {
        let rules = rules();
        let metadata = SchemaMetadata::new();
        ConditionExtractor::new(&rules, &metadata).extract(&parse_statement(sql)?, parameters, None)
    }

    #[test]
    fn test_only_top_level_and_is_used() {
        let conditions = extract("SELECT * FROM t_order WHERE order_id = ? AND status = 'x'", &[Value::Integer(7)]).unwrap();
        assert_eq!(conditions.conditions.len(), 1);
        assert_eq!(conditions.conditions[0].value, ConditionValue::Precise(Value::Integer(7)));

        let conditions = extract("SELECT * FROM t_order WHERE order_id = 1 OR order_id = 2", &[]).unwrap();
        assert!(conditions.conditions.is_empty());

        let conditions = extract("SELECT * FROM t_order WHERE (order_id IN (1, 2)) AND order_id NOT IN (1)", &[]).unwrap();
        assert!(matches!(&conditions.conditions[0].value, ConditionValue::ListOf(v) if v.len() == 2));
    }

    #[test]
    fn test_ranges_and_between() {
        let conditions = extract("SELECT * FROM t_order WHERE order_id >= 10 AND order_id BETWEEN 5 AND 20", &[]).unwrap();
        let ConditionValue::Range(range) = &conditions.conditions[0].value else { panic!("range expected") };
        assert_eq!(range.lower, Some(Bound { value: Value::Integer(10), inclusive: true }));
        assert_eq!(range.upper, Some(Bound { value: Value::Integer(20), inclusive: true }));
    }

    #[test]
    fn test_contradiction_is_always_false() {
        let conditions = extract("SELECT * FROM t_order WHERE order_id = 1 AND order_id = 2", &[]).unwrap();
        assert!(conditions.always_false);
    }

    #[test]
    fn test_missing_parameter_is_error() {
        let result = extract("SELECT * FROM t_order WHERE order_id = ?", &[]);
        assert!(matches!(result, Err(ShardingError::ParameterOutOfRange { index: 0, count: 0 })));
    }

    #[test]
    fn test_insert_rows_are_positional() {
        let conditions = extract("INSERT INTO t_order (status, order_id) VALUES ('a', 1), ('b', ?)", &[Value::Integer(2)]).unwrap();
        assert_eq!(conditions.insert_rows.len(), 2);
        assert_eq!(conditions.insert_rows[1][0].value, ConditionValue::Precise(Value::Integer(2)));
    }

    #[test]
    fn test_insert_value_count_mismatch() {
        let result = extract("INSERT INTO t_order (status, order_id) VALUES ('a', 1), ('b')", &[]);
        assert!(matches!(result, Err(ShardingError::InsertValueCountMismatch(2))));
    }

    #[test]
    fn test_update_of_sharding_key_is_rejected() {
        let result = extract("UPDATE t_order SET order_id = 5 WHERE order_id = 1", &[]);
        assert!(matches!(result, Err(ShardingError::ShardingKeyUpdate { ref column, .. }) if column == "order_id"));
        assert!(extract("UPDATE t_order SET status = 'x' WHERE order_id = 1", &[]).is_ok());
    }
}
