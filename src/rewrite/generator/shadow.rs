use super::SqlTokenGenerator;
use crate::core::ShardingError;
use crate::rewrite::token::SqlToken;
use crate::rewrite::RewriteContext;
use crate::rule::ShadowRule;
use crate::statement::{ConditionExpr, Span, StatementContext};

const NAME: &str = "shadow";

/// Spans removed so that no shadow marker predicate reaches a data source.
///
/// A marker that is the only conjunct takes the whole WHERE clause with it.
/// Markers before the first kept conjunct are cut up to the next conjunct,
/// later ones from the end of the previous conjunct, so the connecting `AND`
/// goes too.
pub(crate) fn shadow_removals(statement: &StatementContext, shadow: &ShadowRule) -> Vec<Span> {
    let Some(where_segment) = &statement.where_segment else {
        return Vec::new();
    };
    let conjuncts = where_segment.expr.and_conjuncts();
    let markers: Vec<bool> = conjuncts
        .iter()
        .map(|c| matches!(c, ConditionExpr::Predicate(p) if shadow.is_shadow_column(&p.column.name)))
        .collect();
    let Some(first_kept) = markers.iter().position(|m| !m) else {
        return vec![where_segment.span];
    };
    conjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| markers[*i])
        .map(|(i, conjunct)| {
            if i < first_kept {
                Span::new(conjunct.span().start, conjuncts[i + 1].span().start)
            } else {
                Span::new(conjuncts[i - 1].span().end, conjunct.span().end)
            }
        })
        .collect()
}

/// Drops shadow marker predicates from WHERE. INSERT markers are handled
/// with the rest of the values list.
pub struct ShadowTokenGenerator;

impl SqlTokenGenerator for ShadowTokenGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_generate(&self, context: &RewriteContext<'_>) -> bool {
        !context.shadow_removals().is_empty()
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        Ok(context.shadow_removals().iter().map(|span| SqlToken::remove(NAME, *span)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::parser::parse_statement;
    use crate::rewrite::tests::{rewrite_with, sharding_rules};
    use crate::rule::RuleSet;

    fn shadow_rules() -> RuleSet {
        let mut rules = sharding_rules();
        let mut shadow = ShadowRule::new("is_shadow");
        shadow.add_mapping("ds_0", "shadow_ds_0");
        shadow.add_mapping("ds_1", "shadow_ds_1");
        rules.shadow = Some(shadow);
        rules
    }

    fn removed(sql: &str) -> String {
        let statement = parse_statement(sql).unwrap();
        let mut out = sql.to_string();
        let mut spans = shadow_removals(&statement, &ShadowRule::new("is_shadow"));
        spans.sort();
        for span in spans.iter().rev() {
            out.replace_range(span.start..span.end, "");
        }
        out
    }

    #[test]
    fn test_only_conjunct_removes_where() {
        assert_eq!(removed("SELECT * FROM t WHERE is_shadow = true"), "SELECT * FROM t ");
    }

    #[test]
    fn test_leading_and_trailing_markers() {
        assert_eq!(removed("DELETE FROM t WHERE is_shadow = 1 AND id = 2"), "DELETE FROM t WHERE id = 2");
        assert_eq!(removed("DELETE FROM t WHERE id = 2 AND is_shadow = 1"), "DELETE FROM t WHERE id = 2");
        assert_eq!(
            removed("DELETE FROM t WHERE id = 2 AND is_shadow = 1 AND name = 'x'"),
            "DELETE FROM t WHERE id = 2 AND name = 'x'"
        );
    }

    #[test]
    fn test_markers_on_both_sides() {
        assert_eq!(
            removed("SELECT * FROM t WHERE is_shadow = 1 AND id = 2 AND is_shadow = 1"),
            "SELECT * FROM t WHERE id = 2"
        );
    }

    #[test]
    fn test_marker_under_or_is_kept() {
        let sql = "SELECT * FROM t WHERE id = 2 OR is_shadow = 1";
        assert_eq!(removed(sql), sql);
    }

    #[test]
    fn test_shadow_select_goes_to_shadow_source_without_marker() {
        let units = rewrite_with(
            &shadow_rules(),
            "SELECT * FROM t_order WHERE user_id = 0 AND order_id = 1 AND is_shadow = true",
            &[],
        )
        .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].data_source, "shadow_ds_0");
        assert_eq!(units[0].sql, "SELECT * FROM t_order_1 WHERE user_id = 0 AND order_id = 1");
    }

    #[test]
    fn test_shadow_update_drops_marker_parameter() {
        let units = rewrite_with(
            &shadow_rules(),
            "UPDATE t_order SET status = ? WHERE is_shadow = ? AND user_id = ? AND order_id = ?",
            &[Value::Text("paid".to_string()), Value::Boolean(true), Value::Integer(1), Value::Integer(0)],
        )
        .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].data_source, "shadow_ds_1");
        assert_eq!(units[0].sql, "UPDATE t_order_0 SET status = ? WHERE user_id = ? AND order_id = ?");
        assert_eq!(
            units[0].parameters,
            vec![Value::Text("paid".to_string()), Value::Integer(1), Value::Integer(0)]
        );
    }

    #[test]
    fn test_false_marker_stays_on_production_source() {
        let units = rewrite_with(
            &shadow_rules(),
            "SELECT * FROM t_order WHERE user_id = 0 AND order_id = 1 AND is_shadow = false",
            &[],
        )
        .unwrap();
        assert_eq!(units[0].data_source, "ds_0");
        assert_eq!(units[0].sql, "SELECT * FROM t_order_1 WHERE user_id = 0 AND order_id = 1");
    }
}
