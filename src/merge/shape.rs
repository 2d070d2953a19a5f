use std::sync::Arc;

use crate::core::ShardingError;
use crate::metadata::SchemaMetadata;
use crate::rule::{Encryptor, RuleSet};
use crate::statement::derived::{
    derived_columns, derived_label_for, is_derived_label, same_column, AVG_DERIVED_COUNT, AVG_DERIVED_SUM,
};
use crate::statement::{
    AggregationKind, ColumnSegment, OrderByItem, OrderByTarget, OrderDirection, ProjectionKind, StatementContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub direction: OrderDirection,
}

/// One aggregate projection and, for AVG, the positions of its derived pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationColumn {
    pub index: usize,
    pub kind: AggregationKind,
    /// `(sum, count)` column positions.
    pub avg: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MergeKeys {
    pub order_by: Vec<SortKey>,
    pub group_by: Vec<SortKey>,
    pub aggregations: Vec<AggregationColumn>,
}

impl MergeKeys {
    /// Shards return rows already sorted by the grouping key.
    pub fn stream_grouping(&self) -> bool {
        !self.group_by.is_empty() && self.order_by == self.group_by
    }
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    start: usize,
    width: usize,
}

/// Logical row shape of a SELECT, resolved once and applied to every shard.
#[derive(Clone)]
pub struct QueryShape {
    /// Visible column labels.
    pub labels: Vec<String>,
    pub decrypt: Vec<(usize, Arc<dyn Encryptor>)>,
    layouts: Vec<Layout>,
}

impl std::fmt::Debug for QueryShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryShape")
            .field("labels", &self.labels)
            .field("decrypt", &self.decrypt.iter().map(|(i, _)| *i).collect::<Vec<_>>())
            .finish()
    }
}

fn projection_label(kind: &ProjectionKind, alias: Option<&str>) -> String {
    if let Some(alias) = alias {
        return alias.to_string();
    }
    match kind {
        ProjectionKind::Column(c) => c.name.clone(),
        ProjectionKind::Aggregation { kind, distinct, argument } => {
            let arg = argument.as_ref().map_or("*", |c| c.name.as_str());
            if *distinct {
                format!("{}(DISTINCT {arg})", kind.name())
            } else {
                format!("{}({arg})", kind.name())
            }
        }
        ProjectionKind::Literal(v) => v.to_string(),
        ProjectionKind::Shorthand { .. } => "*".to_string(),
    }
}

impl QueryShape {
    /// Resolves visible labels and decrypt targets from the statement and the
    /// first shard's raw labels (which may end with derived columns).
    pub fn resolve(
        statement: &StatementContext,
        raw_labels: &[String],
        metadata: &SchemaMetadata,
        rules: &RuleSet,
    ) -> Result<Self, ShardingError> {
        let Some(select) = &statement.select else {
            return Ok(Self { labels: raw_labels.to_vec(), decrypt: Vec::new(), layouts: Vec::new() });
        };
        let derived = raw_labels.iter().rev().take_while(|l| is_derived_label(l)).count();
        let visible = raw_labels.len() - derived;
        let items = &select.projections.items;
        let shorthand_count = items.iter().filter(|p| matches!(p.kind, ProjectionKind::Shorthand { .. })).count();

        let mut labels = Vec::new();
        let mut decrypt: Vec<(usize, Arc<dyn Encryptor>)> = Vec::new();
        let mut layouts = Vec::with_capacity(items.len());
        for projection in items {
            let start = labels.len();
            match &projection.kind {
                ProjectionKind::Shorthand { owner } => {
                    let expansion = statement.expand_shorthand(owner.as_deref(), metadata);
                    let width = match (&expansion, shorthand_count) {
                        (_, 1) if !raw_labels.is_empty() => visible.saturating_sub(items.len() - 1),
                        (Some(expansion), _) => expansion.len(),
                        (None, _) => {
                            return Err(ShardingError::MergeInvariant(format!(
                                "cannot expand '{}' without table metadata",
                                owner.as_ref().map_or_else(|| "*".to_string(), |o| format!("{o}.*"))
                            )))
                        }
                    };
                    match expansion.filter(|e| e.len() == width) {
                        Some(expansion) => {
                            for (offset, (table, column)) in expansion.into_iter().enumerate() {
                                if let Some(encrypt) = rules.encrypt.find_column(&table, &column) {
                                    decrypt.push((start + offset, Arc::clone(&encrypt.encryptor)));
                                }
                                labels.push(column);
                            }
                        }
                        None => labels.extend(raw_labels.iter().skip(start).take(width).cloned()),
                    }
                    layouts.push(Layout { start, width });
                }
                ProjectionKind::Column(column) => {
                    if let Some(encrypt) = statement
                        .table_of_column(column, metadata)
                        .ok()
                        .and_then(|table| rules.encrypt.find_column(&table, &column.name))
                    {
                        decrypt.push((start, Arc::clone(&encrypt.encryptor)));
                    }
                    labels.push(projection_label(&projection.kind, projection.alias.as_deref()));
                    layouts.push(Layout { start, width: 1 });
                }
                other => {
                    labels.push(projection_label(other, projection.alias.as_deref()));
                    layouts.push(Layout { start, width: 1 });
                }
            }
        }
        Ok(Self { labels, decrypt, layouts })
    }

    /// Sort, group and aggregation positions; only needed when several shards merge.
    pub(crate) fn merge_keys(&self, statement: &StatementContext, raw_labels: &[String]) -> Result<MergeKeys, ShardingError> {
        let Some(select) = &statement.select else {
            return Ok(MergeKeys::default());
        };
        let derived = derived_columns(statement);
        let order_by = self.sort_keys(statement, &select.order_by, &derived, raw_labels)?;
        let mut group_by = self.sort_keys(statement, &select.group_by, &derived, raw_labels)?;
        if group_by.is_empty() && select.projections.distinct {
            group_by = (0..self.labels.len()).map(|index| SortKey { index, direction: OrderDirection::Asc }).collect();
        }

        let mut aggregations = Vec::new();
        let mut avg_ordinal = 0;
        for (projection, layout) in select.projections.items.iter().zip(&self.layouts) {
            let ProjectionKind::Aggregation { kind, distinct, .. } = projection.kind else {
                continue;
            };
            if distinct {
                return Err(ShardingError::MergeInvariant(format!(
                    "{}(DISTINCT ...) cannot be combined across shards",
                    kind.name()
                )));
            }
            let avg = if kind == AggregationKind::Avg {
                let sum = find_label(raw_labels, &format!("{AVG_DERIVED_SUM}{avg_ordinal}"));
                let count = find_label(raw_labels, &format!("{AVG_DERIVED_COUNT}{avg_ordinal}"));
                avg_ordinal += 1;
                match (sum, count) {
                    (Some(sum), Some(count)) => Some((sum, count)),
                    _ => {
                        return Err(ShardingError::MergeInvariant(format!(
                            "AVG at column {} has no derived sum/count pair",
                            layout.start + 1
                        )))
                    }
                }
            } else {
                None
            };
            aggregations.push(AggregationColumn { index: layout.start, kind, avg });
        }
        Ok(MergeKeys { order_by, group_by, aggregations })
    }

    fn sort_keys(
        &self,
        statement: &StatementContext,
        items: &[OrderByItem],
        derived: &[crate::statement::derived::DerivedColumn],
        raw_labels: &[String],
    ) -> Result<Vec<SortKey>, ShardingError> {
        items
            .iter()
            .map(|item| {
                let index = match &item.target {
                    OrderByTarget::Index(position) => position
                        .checked_sub(1)
                        .filter(|i| *i < self.labels.len())
                        .ok_or_else(|| ShardingError::ColumnNotFound(format!("#{position}")))?,
                    OrderByTarget::Column(column) => self
                        .column_index(statement, column)
                        .or_else(|| {
                            derived_label_for(statement, derived, column).and_then(|label| find_label(raw_labels, &label))
                        })
                        .ok_or_else(|| ShardingError::ColumnNotFound(column.name.clone()))?,
                };
                Ok(SortKey { index, direction: item.direction })
            })
            .collect()
    }

    /// Visible position of a column named in ORDER BY / GROUP BY.
    fn column_index(&self, statement: &StatementContext, column: &ColumnSegment) -> Option<usize> {
        let select = statement.select.as_ref()?;
        for (projection, layout) in select.projections.items.iter().zip(&self.layouts) {
            if projection.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(&column.name)) {
                return Some(layout.start);
            }
            match &projection.kind {
                ProjectionKind::Column(c) if same_column(c, column) => return Some(layout.start),
                ProjectionKind::Shorthand { owner } => {
                    let owner_matches = match (owner, column.owner_name()) {
                        (Some(o), Some(c)) => o.eq_ignore_ascii_case(c),
                        _ => true,
                    };
                    if owner_matches {
                        let found = self.labels[layout.start..layout.start + layout.width]
                            .iter()
                            .position(|l| l.eq_ignore_ascii_case(&column.name));
                        if let Some(offset) = found {
                            return Some(layout.start + offset);
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}

fn find_label(labels: &[String], label: &str) -> Option<usize> {
    labels.iter().position(|l| l.eq_ignore_ascii_case(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::parser::parse_statement;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn metadata() -> SchemaMetadata {
        SchemaMetadata::from_tables(&[(
            "t_order",
            &[
                ("order_id", DataType::Integer, true),
                ("user_id", DataType::Integer, false),
                ("status", DataType::Text, false),
            ],
        )])
    }

    #[test]
    fn test_derived_columns_are_hidden() {
        let statement = parse_statement("SELECT status, AVG(price) AS p FROM t_order ORDER BY user_id").unwrap();
        let raw = labels(&["status", "p", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0", "ORDER_BY_DERIVED_0"]);
        let shape = QueryShape::resolve(&statement, &raw, &SchemaMetadata::new(), &RuleSet::default()).unwrap();
        assert_eq!(shape.labels, labels(&["status", "p"]));
        let keys = shape.merge_keys(&statement, &raw).unwrap();
        assert_eq!(keys.order_by, vec![SortKey { index: 4, direction: OrderDirection::Asc }]);
        assert_eq!(keys.aggregations[0].avg, Some((3, 2)));
    }

    #[test]
    fn test_shorthand_uses_metadata_names() {
        let statement = parse_statement("SELECT o.*, 1 FROM t_order o ORDER BY o.status DESC").unwrap();
        let raw = labels(&["ORDER_ID", "USER_ID", "STATUS", "1"]);
        let shape = QueryShape::resolve(&statement, &raw, &metadata(), &RuleSet::default()).unwrap();
        assert_eq!(shape.labels, labels(&["order_id", "user_id", "status", "1"]));
        let keys = shape.merge_keys(&statement, &raw).unwrap();
        assert_eq!(keys.order_by, vec![SortKey { index: 2, direction: OrderDirection::Desc }]);
    }

    #[test]
    fn test_shorthand_without_metadata_uses_raw_labels() {
        let statement = parse_statement("SELECT * FROM t_x ORDER BY 2").unwrap();
        let raw = labels(&["a", "b"]);
        let shape = QueryShape::resolve(&statement, &raw, &SchemaMetadata::new(), &RuleSet::default()).unwrap();
        assert_eq!(shape.labels, raw);
        assert_eq!(shape.merge_keys(&statement, &raw).unwrap().order_by[0].index, 1);
    }

    #[test]
    fn test_stream_grouping_requires_matching_order() {
        let statement = parse_statement("SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id ORDER BY user_id").unwrap();
        let raw = labels(&["user_id", "COUNT(*)"]);
        let shape = QueryShape::resolve(&statement, &raw, &SchemaMetadata::new(), &RuleSet::default()).unwrap();
        assert!(shape.merge_keys(&statement, &raw).unwrap().stream_grouping());

        let statement = parse_statement("SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id").unwrap();
        assert!(!shape.merge_keys(&statement, &raw).unwrap().stream_grouping());
    }

    #[test]
    fn test_count_distinct_is_rejected() {
        let statement = parse_statement("SELECT COUNT(DISTINCT user_id) FROM t_order").unwrap();
        let raw = labels(&["c"]);
        let shape = QueryShape::resolve(&statement, &raw, &SchemaMetadata::new(), &RuleSet::default()).unwrap();
        assert!(matches!(shape.merge_keys(&statement, &raw), Err(ShardingError::MergeInvariant(_))));
    }
}
