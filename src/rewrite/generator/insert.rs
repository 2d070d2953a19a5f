use super::SqlTokenGenerator;
use crate::core::ShardingError;
use crate::rewrite::token::{Piece, SqlToken, TokenKind};
use crate::rewrite::RewriteContext;
use crate::rule::EncryptColumn;
use crate::statement::InsertSegment;

const NAME: &str = "insert";

/// Rewrites the column list and VALUES rows of an INSERT: encrypted columns
/// expand to their physical columns, the shadow marker is dropped, a
/// generated key is appended, and each unit only receives its own rows.
pub struct InsertTokenGenerator;

/// What happens to each written column.
enum ColumnPlan<'a> {
    Keep,
    Encrypt(&'a EncryptColumn),
    Drop,
}

fn plan<'a>(context: &RewriteContext<'a>, insert: &InsertSegment) -> Vec<ColumnPlan<'a>> {
    let table = context.statement.primary_table().map(|t| t.logic_name()).unwrap_or_default();
    insert
        .columns
        .iter()
        .map(|column| {
            if context.rules.shadow.as_ref().is_some_and(|s| s.is_shadow_column(&column.name)) {
                ColumnPlan::Drop
            } else if let Some(encrypt) = context.rules.encrypt.find_column(&table, &column.name) {
                ColumnPlan::Encrypt(encrypt)
            } else {
                ColumnPlan::Keep
            }
        })
        .collect()
}

fn appends_generated_key(context: &RewriteContext<'_>) -> bool {
    context.route.generated_key.as_ref().is_some_and(|k| k.generated)
}

impl SqlTokenGenerator for InsertTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        let Some(insert) = &context.statement.insert else {
            return false;
        };
        let splits_rows = context.route.units.len() > 1 && !context.route.insert_row_units.is_empty();
        let table = context.statement.primary_table().map(|t| t.logic_name()).unwrap_or_default();
        splits_rows
            || appends_generated_key(context)
            || context.rules.encrypt.contains_table(&table)
            || plan(context, insert).iter().any(|p| matches!(p, ColumnPlan::Drop))
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let Some(insert) = &context.statement.insert else {
            return Ok(Vec::new());
        };
        let plans = plan(context, insert);
        let generated_key = context.route.generated_key.as_ref().filter(|k| k.generated);
        let changes_columns = generated_key.is_some() || plans.iter().any(|p| !matches!(p, ColumnPlan::Keep));

        let mut tokens = Vec::new();
        match insert.columns_span {
            Some(span) if changes_columns => {
                let mut names: Vec<String> = Vec::new();
                for (column, plan) in insert.columns.iter().zip(&plans) {
                    match plan {
                        ColumnPlan::Keep => names.push(column.span.text(context.sql).to_string()),
                        ColumnPlan::Encrypt(encrypt) => {
                            names.extend(encrypt.physical_columns().into_iter().map(str::to_string));
                        }
                        ColumnPlan::Drop => {}
                    }
                }
                if let Some(key) = generated_key {
                    names.push(key.column.clone());
                }
                tokens.push(SqlToken::replace(NAME, span, vec![Piece::text(format!("({})", names.join(", ")))]));
            }
            None => {
                let table = context.statement.primary_table().map(|t| t.logic_name()).unwrap_or_default();
                if context.rules.encrypt.contains_table(&table) {
                    return Err(ShardingError::Encrypt(format!(
                        "INSERT into encrypted table '{table}' requires a column list"
                    )));
                }
            }
            Some(_) => {}
        }

        let as_parameter = context.statement.parameter_count > 0;
        let mut rows = Vec::with_capacity(insert.values.len());
        for (row_index, row) in insert.values.iter().enumerate() {
            if !plans.is_empty() && row.values.len() != plans.len() {
                return Err(ShardingError::InsertValueCountMismatch(row_index + 1));
            }
            let mut items: Vec<Vec<Piece>> = Vec::new();
            for (position, expr) in row.values.iter().enumerate() {
                match plans.get(position).unwrap_or(&ColumnPlan::Keep) {
                    ColumnPlan::Keep => items.push(vec![context.expression_piece(expr)?]),
                    ColumnPlan::Encrypt(encrypt) => {
                        for value in encrypt.physical_values(&context.value_of(expr)?)? {
                            items.push(vec![RewriteContext::replacement(expr, value)]);
                        }
                    }
                    ColumnPlan::Drop => {}
                }
            }
            if let Some(value) = generated_key.and_then(|k| k.values.get(row_index)) {
                items.push(vec![if as_parameter {
                    Piece::Parameter(value.clone())
                } else {
                    Piece::Text(value.to_sql_literal())
                }]);
            }
            let mut pieces = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    pieces.push(Piece::text(", "));
                }
                pieces.extend(item);
            }
            rows.push(pieces);
        }
        tokens.push(SqlToken {
            start: insert.values_span.start,
            end: insert.values_span.end,
            generator: NAME,
            kind: TokenKind::InsertValues(rows),
        });
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::Value;
    use crate::rewrite::tests::{rewrite_with, sharding_rules};
    use crate::rule::encrypt::{AesEncryptor, EncryptTable, Sha256Encryptor};
    use crate::rule::key_generator::SnowflakeKeyGenerator;
    use crate::rule::{EncryptColumn, Encryptor, KeyGenerateStrategy, RuleSet, ShadowRule};
    use std::sync::Arc;

    fn with_key_generator() -> RuleSet {
        let mut rules = sharding_rules();
        let mut rule = rules.sharding.table_rule("t_order").unwrap().clone();
        rule.key_generate = Some(KeyGenerateStrategy {
            column: "order_id".to_string(),
            generator: Arc::new(SnowflakeKeyGenerator::new(1).unwrap()),
        });
        rules.sharding.add_table_rule(rule);
        rules
    }

    fn with_encrypted_status() -> RuleSet {
        let mut rules = sharding_rules();
        let mut table = EncryptTable::default();
        table.add_column(EncryptColumn {
            logic_column: "status".to_string(),
            cipher_column: "status_cipher".to_string(),
            plain_column: Some("status_plain".to_string()),
            assisted_query_column: Some("status_assisted".to_string()),
            encryptor: Arc::new(AesEncryptor::new("123456abc").unwrap()),
            assisted_query_encryptor: Some(Arc::new(Sha256Encryptor)),
        });
        rules.encrypt.add_table("t_order", table);
        rules
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_encrypted_column_expands_with_parameters() {
        let rules = with_encrypted_status();
        let units = rewrite_with(&rules, "INSERT INTO t_order (user_id, order_id, status) VALUES (?, ?, ?)", &[
            Value::Integer(0),
            Value::Integer(1),
            text("paid"),
        ])
        .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0].sql,
            "INSERT INTO t_order_1 (user_id, order_id, status_cipher, status_assisted, status_plain) VALUES (?, ?, ?, ?, ?)"
        );
        let cipher = AesEncryptor::new("123456abc").unwrap().encrypt(&text("paid")).unwrap();
        let assisted = Sha256Encryptor.encrypt(&text("paid")).unwrap();
        assert_ne!(cipher, text("paid"));
        assert_eq!(units[0].parameters, vec![Value::Integer(0), Value::Integer(1), cipher, assisted, text("paid")]);
    }

    #[test]
    fn test_encrypted_column_expands_with_literals() {
        let rules = with_encrypted_status();
        let units = rewrite_with(&rules, "INSERT INTO t_order (user_id, order_id, status) VALUES (0, 1, 'paid')", &[]).unwrap();
        let cipher = AesEncryptor::new("123456abc").unwrap().encrypt(&text("paid")).unwrap();
        let assisted = Sha256Encryptor.encrypt(&text("paid")).unwrap();
        assert_eq!(
            units[0].sql,
            format!(
                "INSERT INTO t_order_1 (user_id, order_id, status_cipher, status_assisted, status_plain) VALUES (0, 1, {}, {}, 'paid')",
                cipher.to_sql_literal(),
                assisted.to_sql_literal()
            )
        );
        assert!(units[0].parameters.is_empty());
    }

    #[test]
    fn test_generated_key_is_appended() {
        let rules = with_key_generator();
        let units = rewrite_with(&rules, "INSERT INTO t_order (user_id, status) VALUES (?, ?)", &[
            Value::Integer(1),
            Value::Text("x".to_string()),
        ])
        .unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].sql.starts_with("INSERT INTO t_order_"));
        assert!(units[0].sql.ends_with("(user_id, status, order_id) VALUES (?, ?, ?)"));
        assert_eq!(units[0].parameters.len(), 3);
        assert_eq!(units[0].parameters[0], Value::Integer(1));
    }

    #[test]
    fn test_literal_insert_gets_literal_key() {
        let rules = with_key_generator();
        let units = rewrite_with(&rules, "INSERT INTO t_order (user_id) VALUES (0)", &[]).unwrap();
        assert!(units[0].parameters.is_empty());
        assert!(!units[0].sql.contains('?'));
        assert!(units[0].sql.contains("(user_id, order_id) VALUES (0, "));
    }

    #[test]
    fn test_shadow_marker_is_dropped() {
        let mut rules = sharding_rules();
        let mut shadow = ShadowRule::new("is_shadow");
        shadow.add_mapping("ds_0", "shadow_ds_0");
        shadow.add_mapping("ds_1", "shadow_ds_1");
        rules.shadow = Some(shadow);
        let units = rewrite_with(
            &rules,
            "INSERT INTO t_order (user_id, order_id, is_shadow) VALUES (0, 1, true)",
            &[],
        )
        .unwrap();
        assert_eq!(units[0].data_source, "shadow_ds_0");
        assert_eq!(units[0].sql, "INSERT INTO t_order_1 (user_id, order_id) VALUES (0, 1)");
    }
}
