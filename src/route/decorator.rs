use super::RouteContext;
use crate::core::{ShardingError, Value};
use crate::rule::{RuleSet, ShadowRule};
use crate::statement::{CompareOperator, ConditionExpr, PredicateRight, StatementContext};

/// Whether the statement carries a truthy shadow marker.
///
/// WHERE uses a top-level `marker = value` conjunct; INSERT uses the marker
/// column of every row, which must agree.
pub(crate) fn is_shadow(statement: &StatementContext, parameters: &[Value], shadow: &ShadowRule) -> Result<bool, ShardingError> {
    if let Some(insert) = &statement.insert {
        let Some(position) = insert.columns.iter().position(|c| shadow.is_shadow_column(&c.name)) else {
            return Ok(false);
        };
        let flags: Vec<bool> = insert
            .values
            .iter()
            .map(|row| {
                row.values
                    .get(position)
                    .and_then(|e| e.resolve(parameters))
                    .is_some_and(|v| v.is_truthy())
            })
            .collect();
        return match (flags.iter().all(|f| *f), flags.iter().any(|f| *f)) {
            (true, _) => Ok(true),
            (false, false) => Ok(false),
            (false, true) => Err(ShardingError::Route("INSERT mixes shadow and production rows".to_string())),
        };
    }
    let Some(where_segment) = &statement.where_segment else {
        return Ok(false);
    };
    Ok(where_segment.expr.and_conjuncts().into_iter().any(|conjunct| match conjunct {
        ConditionExpr::Predicate(p) if shadow.is_shadow_column(&p.column.name) && !p.negated => match &p.right {
            PredicateRight::Compare(CompareOperator::Eq, expr) => expr.resolve(parameters).is_some_and(|v| v.is_truthy()),
            _ => false,
        },
        _ => false,
    }))
}

/// Moves every unit to the shadow counterpart of its data source.
pub(super) fn decorate_shadow(
    context: &mut RouteContext,
    statement: &StatementContext,
    parameters: &[Value],
    rules: &RuleSet,
) -> Result<(), ShardingError> {
    let Some(shadow) = &rules.shadow else {
        return Ok(());
    };
    if !is_shadow(statement, parameters, shadow)? {
        return Ok(());
    }
    for unit in &mut context.units {
        let target = shadow.shadow_of(&unit.data_source.actual_name).ok_or_else(|| {
            ShardingError::DataSourceNotFound(format!("shadow of '{}'", unit.data_source.actual_name))
        })?;
        tracing::debug!(from = %unit.data_source.actual_name, to = %target, "shadow route");
        unit.data_source.actual_name = target.to_string();
    }
    Ok(())
}

/// Sends writes to the group primary and reads to a balanced replica.
pub(super) fn decorate_readwrite(context: &mut RouteContext, is_write: bool, rules: &RuleSet) {
    if rules.readwrite.is_empty() {
        return;
    }
    for unit in &mut context.units {
        if let Some(group) = rules.readwrite.group(&unit.data_source.actual_name) {
            let target = group.route(is_write).to_string();
            tracing::debug!(group = %group.name, to = %target, "read/write split route");
            unit.data_source.actual_name = target;
        }
    }
}
