use indexmap::IndexMap;

use super::aggregation::GroupAccumulator;
use super::orderby::OrderByMergedResult;
use super::shape::{AggregationColumn, SortKey};
use super::{MergedResult, QueryResult};
use crate::core::{Row, ShardingError};
use crate::statement::OrderDirection;

fn group_key(row: &Row, group_by: &[SortKey]) -> String {
    group_by
        .iter()
        .map(|k| row.get(k.index).map(crate::core::Value::key_fragment).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1}")
}

/// Groups arriving in group-key order: holds the current group and the first
/// row of the next one.
pub(crate) struct GroupByStreamMergedResult {
    inner: OrderByMergedResult,
    group_by: Vec<SortKey>,
    aggregations: Vec<AggregationColumn>,
    pending: Option<Row>,
    current: Option<Row>,
    started: bool,
}

impl GroupByStreamMergedResult {
    pub fn new(inner: OrderByMergedResult, group_by: Vec<SortKey>, aggregations: Vec<AggregationColumn>) -> Self {
        Self { inner, group_by, aggregations, pending: None, current: None, started: false }
    }

    fn pull(&mut self) -> Result<Option<Row>, ShardingError> {
        if self.inner.next()? {
            Ok(self.inner.current().cloned())
        } else {
            Ok(None)
        }
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        if !self.started {
            self.started = true;
            self.pending = self.pull()?;
        }
        let Some(first) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };
        let key = group_key(&first, &self.group_by);
        let mut group = GroupAccumulator::new(first);
        while let Some(row) = self.pull()? {
            if group_key(&row, &self.group_by) == key {
                group.merge(&row, &self.aggregations)?;
            } else {
                self.pending = Some(row);
                break;
            }
        }
        self.current = Some(group.finish(&self.aggregations)?);
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}

/// Buffers every group; emits in first-seen order or sorted by ORDER BY.
///
/// Shards are drained on the first `next`, so read errors surface there like
/// they do for the streaming mergers.
pub(crate) struct GroupByMemoryMergedResult {
    unread: Option<Vec<Box<dyn QueryResult>>>,
    group_by: Vec<SortKey>,
    order_by: Vec<SortKey>,
    aggregations: Vec<AggregationColumn>,
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        results: Vec<Box<dyn QueryResult>>,
        group_by: Vec<SortKey>,
        order_by: Vec<SortKey>,
        aggregations: Vec<AggregationColumn>,
    ) -> Self {
        Self {
            unread: Some(results),
            group_by,
            order_by,
            aggregations,
            rows: Vec::new().into_iter(),
            current: None,
        }
    }

    fn buffer(&self, mut results: Vec<Box<dyn QueryResult>>) -> Result<Vec<Row>, ShardingError> {
        let mut groups: IndexMap<String, GroupAccumulator> = IndexMap::new();
        for result in &mut results {
            while result.next()? {
                let Some(row) = result.current_row() else {
                    break;
                };
                let key = group_key(row, &self.group_by);
                match groups.get_mut(&key) {
                    Some(group) => group.merge(row, &self.aggregations)?,
                    None => {
                        groups.insert(key, GroupAccumulator::new(row.clone()));
                    }
                }
            }
        }
        let mut rows = groups
            .into_values()
            .map(|g| g.finish(&self.aggregations))
            .collect::<Result<Vec<_>, _>>()?;
        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for key in &self.order_by {
                    let (x, y) = (a.get(key.index), b.get(key.index));
                    let ord = match (x, y) {
                        (Some(x), Some(y)) => x.compare(y),
                        _ => std::cmp::Ordering::Equal,
                    };
                    let ord = if key.direction == OrderDirection::Desc { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        Ok(rows)
    }
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        if let Some(results) = self.unread.take() {
            self.rows = self.buffer(results)?.into_iter();
        }
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}
