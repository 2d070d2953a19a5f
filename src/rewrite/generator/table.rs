use super::SqlTokenGenerator;
use crate::core::ShardingError;
use crate::rewrite::token::SqlToken;
use crate::rewrite::RewriteContext;
use crate::statement::{ProjectionKind, Span};

const NAME: &str = "table";

/// Logical table names and table-name owners, rendered as actual tables.
pub struct TableTokenGenerator;

impl SqlTokenGenerator for TableTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        !context.statement.tables.is_empty()
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let statement = context.statement;
        let mut tokens: Vec<SqlToken> = statement
            .tables
            .iter()
            .map(|t| SqlToken::table(NAME, t.span, &t.name))
            .collect();

        for column in statement.owned_columns() {
            let Some(owner) = &column.owner else { continue };
            if context.is_removed(column.span) {
                continue;
            }
            if let Some(table) = context.owner_table(&owner.name) {
                tokens.push(SqlToken::table(NAME, owner.span, &table));
            }
        }

        if let Some(select) = &statement.select {
            for projection in &select.projections.items {
                if let ProjectionKind::Shorthand { owner: Some(owner) } = &projection.kind {
                    if let Some(table) = context.owner_table(owner) {
                        let span = Span::new(projection.span.start, projection.span.start + owner.len());
                        tokens.push(SqlToken::table(NAME, span, &table));
                    }
                }
            }
        }
        Ok(tokens)
    }
}
