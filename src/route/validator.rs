use std::collections::HashSet;

use super::RouteContext;
use crate::core::ShardingError;
use crate::rule::RuleSet;
use crate::statement::{StatementContext, StatementKind};

/// Post-route checks; nothing is executed when one fails.
pub(super) fn validate(statement: &StatementContext, context: &RouteContext, rules: &RuleSet) -> Result<(), ShardingError> {
    if context.units.is_empty() {
        return Err(ShardingError::Route("statement routed to no data node".to_string()));
    }
    if statement.kind == StatementKind::Update {
        for assignment in &statement.assignments {
            let touched = context
                .units
                .iter()
                .flat_map(|u| &u.table_mappers)
                .find(|m| rules.sharding.is_sharding_column(&m.logic_name, &assignment.column.name));
            if let Some(mapper) = touched {
                return Err(ShardingError::ShardingKeyUpdate {
                    table: mapper.logic_name.clone(),
                    column: assignment.column.name.to_lowercase(),
                });
            }
        }
    }
    for unit in &context.units {
        let mut seen = HashSet::new();
        for mapper in &unit.table_mappers {
            if !seen.insert(mapper.actual_name.to_lowercase()) {
                return Err(ShardingError::Route(format!(
                    "actual table '{}' mapped twice in unit on '{}'",
                    mapper.actual_name, unit.data_source.logic_name
                )));
            }
        }
    }
    Ok(())
}
