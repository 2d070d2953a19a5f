use super::SqlTokenGenerator;
use crate::core::{ShardingError, Value};
use crate::rewrite::token::{Piece, SqlToken};
use crate::rewrite::RewriteContext;
use crate::statement::PaginationValue;

const NAME: &str = "pagination";

/// Row count requested when every grouped row must reach the merge engine.
const UNBOUNDED_ROW_COUNT: u64 = i64::MAX as u64;

/// Widens LIMIT/OFFSET for multi-unit SELECTs: every unit returns rows
/// `0..offset+limit` and the merge engine applies the real window.
pub struct PaginationTokenGenerator;

fn render(value: &PaginationValue, rewritten: u64) -> Piece {
    match value {
        PaginationValue::Literal { .. } => Piece::text(rewritten.to_string()),
        PaginationValue::Parameter { .. } => {
            Piece::Parameter(Value::Integer(i64::try_from(rewritten).unwrap_or(i64::MAX)))
        }
    }
}

impl SqlTokenGenerator for PaginationTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        context.route.units.len() > 1
            && context.statement.select.as_ref().is_some_and(|s| s.pagination.is_some())
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let Some(pagination) = context.statement.select.as_ref().and_then(|s| s.pagination.as_ref()) else {
            return Ok(Vec::new());
        };
        let offset = pagination
            .offset
            .map(|v| v.resolve(context.parameters))
            .transpose()?
            .unwrap_or(0);

        let mut tokens = Vec::new();
        if let Some(value) = &pagination.offset {
            tokens.push(SqlToken::replace(NAME, value.span(), vec![render(value, 0)]));
        }
        if let Some(value) = &pagination.row_count {
            let limit = value.resolve(context.parameters)?;
            let rewritten = if context.statement.needs_memory_grouping() {
                UNBOUNDED_ROW_COUNT
            } else {
                offset.saturating_add(limit).min(UNBOUNDED_ROW_COUNT)
            };
            tracing::debug!(offset, limit, rewritten, "pagination rewrite");
            tokens.push(SqlToken::replace(NAME, value.span(), vec![render(value, rewritten)]));
        }
        Ok(tokens)
    }
}
