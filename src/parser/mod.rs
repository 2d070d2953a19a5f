// Module declarations
mod common;
mod dml;
mod expression;
mod queries;

pub use common::{parameter_markers, parse_data_type};

use common::{symbol, Ctx};
use crate::core::ShardingError;
use crate::statement::StatementContext;

/// Parses one SELECT / INSERT / UPDATE / DELETE statement into a bound
/// statement context. Spans refer to byte offsets in `input` as given.
pub fn parse_statement(input: &str) -> Result<StatementContext, ShardingError> {
    let ctx = Ctx::new(input);
    let result = nom::branch::alt((
        |i| queries::select(&ctx, i),
        |i| dml::insert(&ctx, i),
        |i| dml::update(&ctx, i),
        |i| dml::delete(&ctx, i),
    ))(input);

    match result {
        Ok((remaining, mut statement)) => {
            let remaining = symbol(";")(remaining).map_or(remaining, |(rest, _)| rest);
            if remaining.trim().is_empty() {
                statement.parameter_count = ctx.parameter_count();
                Ok(statement)
            } else {
                Err(ShardingError::ParseError(format!("Unexpected input after statement: {}", remaining.trim())))
            }
        }
        Err(e) => Err(ShardingError::ParseError(format!("{e:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};
    use crate::statement::*;

    #[test]
    fn test_select_spans_point_into_sql() {
        let sql = "SELECT o.order_id, o.status FROM t_order o WHERE o.user_id = ? AND o.order_id IN (1, 2)";
        let stmt = parse_statement(sql).unwrap();
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(stmt.tables.len(), 1);
        assert_eq!(stmt.tables[0].span.text(sql), "t_order");
        assert_eq!(stmt.tables[0].alias.as_deref(), Some("o"));

        let where_segment = stmt.where_segment.unwrap();
        let conjuncts = where_segment.expr.and_conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].span().text(sql), "o.user_id = ?");
        let ConditionExpr::Predicate(p) = conjuncts[1] else { panic!("predicate expected") };
        assert_eq!(p.column.name, "order_id");
        assert_eq!(p.column.owner_name(), Some("o"));
        assert!(matches!(&p.right, PredicateRight::In(items) if items.len() == 2));
        assert_eq!(stmt.parameter_count, 1);
    }

    #[test]
    fn test_parameter_indexes_follow_text_order() {
        let sql = "SELECT * FROM t_order WHERE user_id = ? AND status = '?' AND order_id BETWEEN ? AND ?";
        let stmt = parse_statement(sql).unwrap();
        let predicates = stmt.where_segment.as_ref().unwrap().expr.predicates();
        let indexes: Vec<usize> = predicates
            .iter()
            .flat_map(|p| p.expressions())
            .filter_map(|e| match e {
                ExpressionSegment::Parameter { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(stmt.parameter_count, 3);
    }

    #[test]
    fn test_backquoted_identifiers_hide_markers() {
        let sql = "SELECT * FROM t_order WHERE `it's?` = ? AND status = ?";
        assert_eq!(parameter_markers(sql), vec![38, 53]);
        let stmt = parse_statement(sql).unwrap();
        assert_eq!(stmt.parameter_count, 2);
        let predicates = stmt.where_segment.as_ref().unwrap().expr.predicates();
        assert_eq!(predicates[0].column.name, "it's?");
        assert!(matches!(
            predicates[1].right,
            PredicateRight::Compare(_, ExpressionSegment::Parameter { index: 1, .. })
        ));
    }

    #[test]
    fn test_order_by_position() {
        let stmt = parse_statement("SELECT user_id, status FROM t_order ORDER BY 2 DESC, user_id").unwrap();
        let order_by = stmt.order_by();
        assert!(matches!(order_by[0].target, OrderByTarget::Index(2)));
        assert_eq!(order_by[0].direction, OrderDirection::Desc);
        assert!(matches!(&order_by[1].target, OrderByTarget::Column(c) if c.name == "user_id"));
    }

    #[test]
    fn test_select_aggregation_group_order_limit() {
        let sql = "SELECT user_id, AVG(price) AS avg_price, COUNT(*) FROM t_order GROUP BY user_id ORDER BY user_id DESC LIMIT 2, 5";
        let stmt = parse_statement(sql).unwrap();
        let select = stmt.select.unwrap();
        assert_eq!(select.projections.items.len(), 3);
        assert!(matches!(
            &select.projections.items[1].kind,
            ProjectionKind::Aggregation { kind: AggregationKind::Avg, argument: Some(c), .. } if c.name == "price"
        ));
        assert_eq!(select.projections.items[1].alias.as_deref(), Some("avg_price"));
        assert_eq!(select.group_by.len(), 1);
        assert_eq!(select.order_by[0].direction, OrderDirection::Desc);
        let pagination = select.pagination.unwrap();
        assert!(matches!(pagination.offset, Some(PaginationValue::Literal { value: 2, .. })));
        assert!(matches!(pagination.row_count, Some(PaginationValue::Literal { value: 5, .. })));
    }

    #[test]
    fn test_join_with_on_condition() {
        let sql = "SELECT i.* FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1";
        let stmt = parse_statement(sql).unwrap();
        assert_eq!(stmt.logic_table_names(), vec!["t_order", "t_order_item"]);
        assert_eq!(stmt.join_conditions.len(), 1);
        assert_eq!(stmt.owned_columns().len(), 3);
    }

    #[test]
    fn test_insert_rows() {
        let sql = "INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (?, 'b');";
        let stmt = parse_statement(sql).unwrap();
        let insert = stmt.insert.unwrap();
        assert_eq!(insert.columns.len(), 2);
        assert_eq!(insert.columns_span.unwrap().text(sql), "(user_id, status)");
        assert_eq!(insert.values.len(), 2);
        assert_eq!(insert.values_span.text(sql), "(1, 'a'), (?, 'b')");
        assert!(matches!(insert.values[0].values[1], ExpressionSegment::Literal { value: Value::Text(ref s), .. } if s == "a"));
    }

    #[test]
    fn test_update_and_delete() {
        let stmt = parse_statement("UPDATE t_order SET status = 'x', amount = ? WHERE order_id = 3").unwrap();
        assert_eq!(stmt.kind, StatementKind::Update);
        assert_eq!(stmt.assignments.len(), 2);
        let stmt = parse_statement("DELETE FROM t_order WHERE user_id = 1 OR user_id = 2").unwrap();
        assert!(matches!(stmt.where_segment.unwrap().expr, ConditionExpr::Or { .. }));
    }

    #[test]
    fn test_escaped_string_literal() {
        let stmt = parse_statement("SELECT * FROM t_user WHERE name = 'O''Brien'").unwrap();
        let predicates = stmt.where_segment.as_ref().unwrap().expr.predicates();
        let PredicateRight::Compare(_, ExpressionSegment::Literal { value, .. }) = &predicates[0].right else {
            panic!("literal expected")
        };
        assert_eq!(value, &Value::Text("O'Brien".to_string()));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        assert!(matches!(parse_statement("SELECT * FROM t HAVING x"), Err(ShardingError::ParseError(_))));
        assert!(parse_statement("DROP TABLE t").is_err());
    }

    #[test]
    fn test_parse_data_type() {
        assert_eq!(parse_data_type("varchar(32)").unwrap(), DataType::Varchar { max_length: 32 });
        assert_eq!(parse_data_type("BIGINT").unwrap(), DataType::Integer);
        assert!(parse_data_type("blob").is_err());
    }
}
