use std::cmp::Ordering;

use super::shape::AggregationColumn;
use crate::core::{Row, ShardingError, Value};
use crate::statement::AggregationKind;

fn slot<'r>(row: &'r mut Row, index: usize) -> Result<&'r mut Value, ShardingError> {
    row.values
        .get_mut(index)
        .ok_or_else(|| ShardingError::MergeInvariant(format!("aggregation column {} is missing", index + 1)))
}

fn read(row: &Row, index: usize) -> Result<&Value, ShardingError> {
    row.get(index)
        .ok_or_else(|| ShardingError::MergeInvariant(format!("aggregation column {} is missing", index + 1)))
}

/// Partial aggregates of one group, seeded with the group's first shard row.
#[derive(Debug, Clone)]
pub(crate) struct GroupAccumulator {
    row: Row,
}

impl GroupAccumulator {
    pub fn new(row: Row) -> Self {
        Self { row }
    }

    /// Folds another shard's row for the same group into this one.
    pub fn merge(&mut self, other: &Row, aggregations: &[AggregationColumn]) -> Result<(), ShardingError> {
        for aggregation in aggregations {
            match aggregation.kind {
                AggregationKind::Count | AggregationKind::Sum => {
                    let incoming = read(other, aggregation.index)?;
                    let current = slot(&mut self.row, aggregation.index)?;
                    *current = current.add(incoming)?;
                }
                AggregationKind::Max => {
                    let incoming = read(other, aggregation.index)?;
                    let current = slot(&mut self.row, aggregation.index)?;
                    if incoming.compare(current) == Ordering::Greater {
                        *current = incoming.clone();
                    }
                }
                AggregationKind::Min => {
                    let incoming = read(other, aggregation.index)?;
                    let current = slot(&mut self.row, aggregation.index)?;
                    // NULL means the shard saw no value.
                    if !incoming.is_null() && (current.is_null() || incoming.compare(current) == Ordering::Less) {
                        *current = incoming.clone();
                    }
                }
                AggregationKind::Avg => {
                    let (sum, count) = aggregation.avg.ok_or_else(|| {
                        ShardingError::MergeInvariant("AVG merged without a paired count".to_string())
                    })?;
                    for index in [sum, count] {
                        let incoming = read(other, index)?;
                        let current = slot(&mut self.row, index)?;
                        *current = current.add(incoming)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Finishes AVG columns from their accumulated (sum, count).
    pub fn finish(mut self, aggregations: &[AggregationColumn]) -> Result<Row, ShardingError> {
        for aggregation in aggregations {
            if let Some((sum, count)) = aggregation.avg {
                let average = read(&self.row, sum)?.divide(read(&self.row, count)?)?;
                *slot(&mut self.row, aggregation.index)? = average;
            }
        }
        Ok(self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn row(values: &[i64]) -> Row {
        Row::new(values.iter().map(|v| Value::Integer(*v)).collect())
    }

    fn column(index: usize, kind: AggregationKind) -> AggregationColumn {
        AggregationColumn { index, kind, avg: None }
    }

    #[test]
    fn test_additive_and_extremes() {
        let aggregations = [
            column(0, AggregationKind::Count),
            column(1, AggregationKind::Sum),
            column(2, AggregationKind::Max),
            column(3, AggregationKind::Min),
        ];
        let mut group = GroupAccumulator::new(row(&[2, 10, 7, 3]));
        group.merge(&row(&[5, 1, 9, 4]), &aggregations).unwrap();
        assert_eq!(group.finish(&aggregations).unwrap(), row(&[7, 11, 9, 3]));
    }

    #[test]
    fn test_min_ignores_empty_shards() {
        let aggregations = [column(0, AggregationKind::Min)];
        let mut group = GroupAccumulator::new(Row::new(vec![Value::Null]));
        group.merge(&row(&[4]), &aggregations).unwrap();
        group.merge(&Row::new(vec![Value::Null]), &aggregations).unwrap();
        assert_eq!(group.finish(&aggregations).unwrap(), row(&[4]));
    }

    #[test]
    fn test_avg_is_weighted_by_count() {
        let aggregations = [AggregationColumn { index: 0, kind: AggregationKind::Avg, avg: Some((2, 1)) }];
        let mut group = GroupAccumulator::new(row(&[5, 2, 10]));
        group.merge(&row(&[100, 1, 100]), &aggregations).unwrap();
        let merged = group.finish(&aggregations).unwrap();
        assert_eq!(merged.values[0], Value::Numeric(Decimal::from(110) / Decimal::from(3)));
    }
}
