use super::{AggregationKind, ColumnSegment, OrderByItem, OrderByTarget, ProjectionKind, StatementContext};

pub const AVG_DERIVED_COUNT: &str = "AVG_DERIVED_COUNT_";
pub const AVG_DERIVED_SUM: &str = "AVG_DERIVED_SUM_";
pub const ORDER_BY_DERIVED: &str = "ORDER_BY_DERIVED_";
pub const GROUP_BY_DERIVED: &str = "GROUP_BY_DERIVED_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    /// `COUNT(arg)` for the AVG projection at this position.
    AvgCount { projection: usize },
    /// `SUM(arg)` for the AVG projection at this position.
    AvgSum { projection: usize },
    OrderBy { item: usize },
    GroupBy { item: usize },
}

/// Extra projection appended to a multi-shard SELECT so the merge engine can
/// finish AVG and sort or group on columns the client did not select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub label: String,
    pub kind: DerivedKind,
}

#[must_use]
pub fn is_derived_label(label: &str) -> bool {
    [AVG_DERIVED_COUNT, AVG_DERIVED_SUM, ORDER_BY_DERIVED, GROUP_BY_DERIVED]
        .iter()
        .any(|prefix| label.len() > prefix.len() && label[..prefix.len()].eq_ignore_ascii_case(prefix))
}

pub(crate) fn same_column(a: &ColumnSegment, b: &ColumnSegment) -> bool {
    a.name.eq_ignore_ascii_case(&b.name)
        && match (a.owner_name(), b.owner_name()) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => true,
        }
}

/// Whether the projection list already yields `column` (by name, alias or `*`).
#[must_use]
pub fn projection_covers(statement: &StatementContext, column: &ColumnSegment) -> bool {
    let Some(select) = &statement.select else {
        return false;
    };
    select.projections.items.iter().any(|p| {
        if p.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(&column.name)) {
            return true;
        }
        match &p.kind {
            ProjectionKind::Column(c) => same_column(c, column),
            ProjectionKind::Shorthand { owner: None } => true,
            ProjectionKind::Shorthand { owner: Some(owner) } => column
                .owner_name()
                .is_none_or(|o| o.eq_ignore_ascii_case(owner)),
            _ => false,
        }
    })
}

fn item_column(item: &OrderByItem) -> Option<&ColumnSegment> {
    match &item.target {
        OrderByTarget::Column(c) => Some(c),
        OrderByTarget::Index(_) => None,
    }
}

/// Derived columns in the order they are appended to the projection list.
#[must_use]
pub fn derived_columns(statement: &StatementContext) -> Vec<DerivedColumn> {
    let Some(select) = &statement.select else {
        return Vec::new();
    };
    let mut derived = Vec::new();

    let mut avg_ordinal = 0;
    for (position, projection) in select.projections.items.iter().enumerate() {
        if let ProjectionKind::Aggregation { kind: AggregationKind::Avg, .. } = projection.kind {
            derived.push(DerivedColumn {
                label: format!("{AVG_DERIVED_COUNT}{avg_ordinal}"),
                kind: DerivedKind::AvgCount { projection: position },
            });
            derived.push(DerivedColumn {
                label: format!("{AVG_DERIVED_SUM}{avg_ordinal}"),
                kind: DerivedKind::AvgSum { projection: position },
            });
            avg_ordinal += 1;
        }
    }

    let mut order_ordinal = 0;
    for (item, order) in select.order_by.iter().enumerate() {
        if let Some(column) = item_column(order) {
            if !projection_covers(statement, column) {
                derived.push(DerivedColumn {
                    label: format!("{ORDER_BY_DERIVED}{order_ordinal}"),
                    kind: DerivedKind::OrderBy { item },
                });
                order_ordinal += 1;
            }
        }
    }

    let mut group_ordinal = 0;
    for (item, group) in select.group_by.iter().enumerate() {
        if let Some(column) = item_column(group) {
            let in_order_by = select
                .order_by
                .iter()
                .filter_map(item_column)
                .any(|c| same_column(c, column));
            if !projection_covers(statement, column) && !in_order_by {
                derived.push(DerivedColumn {
                    label: format!("{GROUP_BY_DERIVED}{group_ordinal}"),
                    kind: DerivedKind::GroupBy { item },
                });
                group_ordinal += 1;
            }
        }
    }
    derived
}

/// Label of the derived column that carries `column` for sorting or grouping.
#[must_use]
pub fn derived_label_for(statement: &StatementContext, derived: &[DerivedColumn], column: &ColumnSegment) -> Option<String> {
    let select = statement.select.as_ref()?;
    derived.iter().find_map(|d| {
        let item = match d.kind {
            DerivedKind::OrderBy { item } => select.order_by.get(item),
            DerivedKind::GroupBy { item } => select.group_by.get(item),
            _ => None,
        }?;
        item_column(item)
            .filter(|c| same_column(c, column))
            .map(|_| d.label.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    fn labels(sql: &str) -> Vec<String> {
        derived_columns(&parse_statement(sql).unwrap()).into_iter().map(|d| d.label).collect()
    }

    #[test]
    fn test_avg_derives_count_and_sum() {
        assert_eq!(
            labels("SELECT AVG(price), AVG(amount) FROM t_order"),
            vec!["AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0", "AVG_DERIVED_COUNT_1", "AVG_DERIVED_SUM_1"]
        );
    }

    #[test]
    fn test_missing_sort_columns_are_derived_once() {
        assert_eq!(
            labels("SELECT status FROM t_order GROUP BY user_id, status ORDER BY user_id"),
            vec!["ORDER_BY_DERIVED_0"]
        );
        assert_eq!(labels("SELECT * FROM t_order ORDER BY user_id"), Vec::<String>::new());
        assert_eq!(labels("SELECT order_id AS user_id FROM t_order ORDER BY user_id"), Vec::<String>::new());
    }

    #[test]
    fn test_derived_label_detection() {
        assert!(is_derived_label("avg_derived_sum_3"));
        assert!(!is_derived_label("ORDER_BY_DERIVED_"));
        assert!(!is_derived_label("user_id"));
    }
}
