use super::SqlTokenGenerator;
use crate::core::ShardingError;
use crate::rewrite::token::{Piece, SqlToken};
use crate::rewrite::RewriteContext;
use crate::statement::{
    AssignmentSegment, CompareOperator, ExpressionSegment, PredicateRight, PredicateSegment, ProjectionKind,
    ProjectionSegment, Span, StatementKind,
};

const NAME: &str = "encrypt";

/// Maps logical encrypted columns onto their physical columns in
/// projections, predicates and UPDATE assignments.
pub struct EncryptTokenGenerator;

impl SqlTokenGenerator for EncryptTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        context.statement.kind != StatementKind::Insert
            && context
                .statement
                .logic_table_names()
                .iter()
                .any(|t| context.rules.encrypt.contains_table(t))
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let statement = context.statement;
        let mut tokens = Vec::new();
        if let Some(select) = &statement.select {
            for projection in &select.projections.items {
                projection_tokens(context, projection, &mut tokens)?;
            }
        }
        let conditions = statement.join_conditions.iter().chain(statement.where_segment.as_ref().map(|w| &w.expr));
        for expr in conditions {
            for predicate in expr.predicates() {
                if !context.is_removed(predicate.span) {
                    predicate_tokens(context, predicate, &mut tokens)?;
                }
            }
        }
        for assignment in &statement.assignments {
            assignment_tokens(context, assignment, &mut tokens)?;
        }
        Ok(tokens)
    }
}

fn projection_tokens(
    context: &RewriteContext<'_>,
    projection: &ProjectionSegment,
    tokens: &mut Vec<SqlToken>,
) -> Result<(), ShardingError> {
    match &projection.kind {
        ProjectionKind::Column(column) => {
            if let Some(encrypt) = context.encrypt_column(column) {
                let text = match projection.alias {
                    Some(_) => encrypt.cipher_column.clone(),
                    None => format!("{} AS {}", encrypt.cipher_column, column.name),
                };
                tokens.push(SqlToken::replace(NAME, column.name_span, vec![Piece::Text(text)]));
            }
        }
        ProjectionKind::Aggregation { argument: Some(column), kind, .. } => {
            if context.encrypt_column(column).is_some() {
                return Err(ShardingError::Encrypt(format!(
                    "{}() over encrypted column '{}' is not supported",
                    kind.name(),
                    column.name
                )));
            }
        }
        ProjectionKind::Shorthand { owner } => {
            let Some(columns) = context.statement.expand_shorthand(owner.as_deref(), context.metadata) else {
                return Ok(());
            };
            let encrypt = &context.rules.encrypt;
            if !columns.iter().any(|(t, c)| encrypt.find_column(t, c).is_some()) {
                return Ok(());
            }
            let qualify = owner.is_some() || context.statement.tables.len() > 1;
            let mut pieces = Vec::new();
            for (i, (table, column)) in columns.iter().enumerate() {
                if i > 0 {
                    pieces.push(Piece::text(", "));
                }
                // `owner.` already precedes the first column in the original text.
                if qualify && !(i == 0 && owner.is_some()) {
                    let qualifier = match owner {
                        Some(owner) => owner.clone(),
                        None => context
                            .statement
                            .tables
                            .iter()
                            .find(|t| t.logic_name() == *table)
                            .map_or_else(|| table.clone(), |t| t.alias.clone().unwrap_or_else(|| t.name.clone())),
                    };
                    pieces.extend(context.owner_pieces(&qualifier));
                }
                match encrypt.find_column(table, column) {
                    Some(e) => pieces.push(Piece::text(format!("{} AS {column}", e.cipher_column))),
                    None => pieces.push(Piece::text(column.clone())),
                }
            }
            let star = Span::new(projection.span.end - 1, projection.span.end);
            tokens.push(SqlToken::replace(NAME, star, pieces));
        }
        _ => {}
    }
    Ok(())
}

fn predicate_tokens(
    context: &RewriteContext<'_>,
    predicate: &PredicateSegment,
    tokens: &mut Vec<SqlToken>,
) -> Result<(), ShardingError> {
    let Some(encrypt) = context.encrypt_column(&predicate.column) else {
        return Ok(());
    };
    let (query_column, encryptor) = encrypt.query_column();
    let encrypted = |expr: &ExpressionSegment| -> Result<SqlToken, ShardingError> {
        let value = encryptor.encrypt(&context.value_of(expr)?)?;
        Ok(SqlToken::replace(NAME, expr.span(), vec![RewriteContext::replacement(expr, value)]))
    };
    match &predicate.right {
        PredicateRight::Compare(CompareOperator::Eq | CompareOperator::NotEq, expr) => tokens.push(encrypted(expr)?),
        PredicateRight::In(items) => {
            for item in items {
                tokens.push(encrypted(item)?);
            }
        }
        PredicateRight::IsNull => {
            let cipher = Piece::text(encrypt.cipher_column.clone());
            tokens.push(SqlToken::replace(NAME, predicate.column.name_span, vec![cipher]));
            return Ok(());
        }
        _ => {
            return Err(ShardingError::Encrypt(format!(
                "Encrypted column '{}' only supports equality and IN predicates",
                predicate.column.name
            )))
        }
    }
    tokens.push(SqlToken::replace(NAME, predicate.column.name_span, vec![Piece::text(query_column)]));
    Ok(())
}

/// `col = v` becomes `cipher = enc(v), assisted = h(v), plain = v` for
/// whichever physical columns exist.
fn assignment_tokens(
    context: &RewriteContext<'_>,
    assignment: &AssignmentSegment,
    tokens: &mut Vec<SqlToken>,
) -> Result<(), ShardingError> {
    let Some(encrypt) = context.encrypt_column(&assignment.column) else {
        return Ok(());
    };
    let values = encrypt.physical_values(&context.value_of(&assignment.value)?)?;
    let mut pieces = Vec::new();
    for (i, (column, value)) in encrypt.physical_columns().into_iter().zip(values).enumerate() {
        if i > 0 {
            pieces.push(Piece::text(", "));
        }
        pieces.push(Piece::text(format!("{column} = ")));
        pieces.push(RewriteContext::replacement(&assignment.value, value));
    }
    let span = Span::new(assignment.column.name_span.start, assignment.span.end);
    tokens.push(SqlToken::replace(NAME, span, pieces));
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::{DataType, Value};
    use crate::metadata::SchemaMetadata;
    use crate::parser::parse_statement;
    use crate::rewrite::{RewriteEngine, RewriteUnit};
    use crate::route::RouteEngine;
    use crate::rule::encrypt::{EncryptTable, Sha256Encryptor};
    use crate::rule::{EncryptColumn, Encryptor, RuleSet};
    use std::sync::Arc;

    fn rules() -> RuleSet {
        let mut table = EncryptTable::default();
        table.add_column(EncryptColumn {
            logic_column: "phone".to_string(),
            cipher_column: "phone_cipher".to_string(),
            plain_column: None,
            assisted_query_column: Some("phone_assisted".to_string()),
            encryptor: Arc::new(Sha256Encryptor),
            assisted_query_encryptor: Some(Arc::new(Sha256Encryptor)),
        });
        let mut rules = RuleSet { data_sources: vec!["ds".to_string()], ..RuleSet::default() };
        rules.encrypt.add_table("t_user", table);
        rules
    }

    fn rewrite(sql: &str, parameters: &[Value]) -> Result<RewriteUnit, crate::core::ShardingError> {
        let rules = rules();
        let metadata = SchemaMetadata::from_tables(&[(
            "t_user",
            &[("id", DataType::Integer, true), ("phone", DataType::Text, false)],
        )]);
        let statement = parse_statement(sql)?;
        let route = RouteEngine::new(&rules, &metadata).route(&statement, parameters)?;
        let mut units = RewriteEngine::new(&rules, &metadata).rewrite(sql, &statement, parameters, &route)?;
        Ok(units.remove(0))
    }

    fn digest(plain: &str) -> Value {
        Sha256Encryptor.encrypt(&Value::Text(plain.to_string())).unwrap()
    }

    #[test]
    fn test_equality_uses_assisted_column() {
        let unit = rewrite("SELECT id FROM t_user WHERE phone = ?", &[Value::Text("138".to_string())]).unwrap();
        assert_eq!(unit.sql, "SELECT id FROM t_user WHERE phone_assisted = ?");
        assert_eq!(unit.parameters, vec![digest("138")]);
    }

    #[test]
    fn test_projection_keeps_logical_label() {
        let unit = rewrite("SELECT u.phone, phone AS p FROM t_user u", &[]).unwrap();
        assert_eq!(unit.sql, "SELECT u.phone_cipher AS phone, phone_cipher AS p FROM t_user u");
    }

    #[test]
    fn test_star_is_expanded() {
        let unit = rewrite("SELECT * FROM t_user", &[]).unwrap();
        assert_eq!(unit.sql, "SELECT id, phone_cipher AS phone FROM t_user");
        let unit = rewrite("SELECT t_user.* FROM t_user", &[]).unwrap();
        assert_eq!(unit.sql, "SELECT t_user.id, t_user.phone_cipher AS phone FROM t_user");
    }

    #[test]
    fn test_update_writes_every_physical_column() {
        let unit = rewrite("UPDATE t_user SET phone = '139' WHERE id = 1", &[]).unwrap();
        assert_eq!(
            unit.sql,
            format!(
                "UPDATE t_user SET phone_cipher = {}, phone_assisted = {} WHERE id = 1",
                digest("139").to_sql_literal(),
                digest("139").to_sql_literal()
            )
        );
    }

    #[test]
    fn test_range_on_encrypted_column_is_rejected() {
        let result = rewrite("SELECT id FROM t_user WHERE phone > '1'", &[]);
        assert!(matches!(result, Err(crate::core::ShardingError::Encrypt(_))));
    }
}
