use super::SqlTokenGenerator;
use crate::core::ShardingError;
use crate::rewrite::token::{Piece, SqlToken};
use crate::rewrite::RewriteContext;
use crate::statement::derived::{derived_columns, DerivedKind};
use crate::statement::{OrderByTarget, ProjectionKind, Span};

const NAME: &str = "projection";

/// Appends the derived columns the merge engine needs when several units
/// answer one SELECT.
pub struct DerivedProjectionTokenGenerator;

impl SqlTokenGenerator for DerivedProjectionTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        context.statement.select.is_some() && !context.route.is_single_routing()
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let Some(select) = &context.statement.select else {
            return Ok(Vec::new());
        };
        let derived = derived_columns(context.statement);
        if derived.is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces = Vec::new();
        for column in &derived {
            pieces.push(Piece::text(", "));
            match column.kind {
                DerivedKind::AvgCount { projection } | DerivedKind::AvgSum { projection } => {
                    let function = if matches!(column.kind, DerivedKind::AvgCount { .. }) { "COUNT" } else { "SUM" };
                    let Some(ProjectionKind::Aggregation { distinct, argument, .. }) =
                        select.projections.items.get(projection).map(|p| &p.kind)
                    else {
                        return Err(ShardingError::MergeInvariant(format!("{} has no AVG projection", column.label)));
                    };
                    pieces.push(Piece::text(format!("{function}(")));
                    if *distinct {
                        pieces.push(Piece::text("DISTINCT "));
                    }
                    match argument {
                        Some(argument) => pieces.extend(context.column_pieces(argument)),
                        None => pieces.push(Piece::text("*")),
                    }
                    pieces.push(Piece::text(")"));
                }
                DerivedKind::OrderBy { item } | DerivedKind::GroupBy { item } => {
                    let items = if matches!(column.kind, DerivedKind::OrderBy { .. }) {
                        &select.order_by
                    } else {
                        &select.group_by
                    };
                    let Some(OrderByTarget::Column(target)) = items.get(item).map(|i| &i.target) else {
                        return Err(ShardingError::MergeInvariant(format!("{} has no sort column", column.label)));
                    };
                    pieces.extend(context.column_pieces(target));
                }
            }
            pieces.push(Piece::text(format!(" AS {}", column.label)));
        }
        Ok(vec![SqlToken::replace(NAME, Span::at(select.projections_end), pieces)])
    }
}
