use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::shape::SortKey;
use super::{MergedResult, QueryResult};
use crate::core::{Row, ShardingError, Value};
use crate::statement::OrderDirection;

/// Sort key of one shard's current row.
struct HeapEntry {
    keys: Vec<Value>,
    directions: Vec<OrderDirection>,
    unit: usize,
}

impl HeapEntry {
    fn ordering(&self, other: &Self) -> Ordering {
        for ((a, b), direction) in self.keys.iter().zip(&other.keys).zip(&self.directions) {
            let ord = match direction {
                OrderDirection::Asc => a.compare(b),
                OrderDirection::Desc => b.compare(a),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.unit.cmp(&other.unit)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ordering(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap; invert so the smallest row pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.ordering(self)
    }
}

/// Priority-queue merge of shards that are each sorted by the ORDER BY keys.
///
/// Holds one current row per shard; ties go to the lower route unit.
pub(crate) struct OrderByMergedResult {
    cursors: Vec<Box<dyn QueryResult>>,
    sort_keys: Vec<SortKey>,
    heap: BinaryHeap<HeapEntry>,
    current: Option<usize>,
    initialized: bool,
}

impl OrderByMergedResult {
    pub fn new(cursors: Vec<Box<dyn QueryResult>>, sort_keys: Vec<SortKey>) -> Self {
        Self { cursors, sort_keys, heap: BinaryHeap::new(), current: None, initialized: false }
    }

    /// Advances shard `unit` and queues its next row, if any.
    fn advance(&mut self, unit: usize) -> Result<(), ShardingError> {
        let cursor = &mut self.cursors[unit];
        if !cursor.next()? {
            return Ok(());
        }
        let row = cursor
            .current_row()
            .ok_or_else(|| ShardingError::MergeInvariant("cursor advanced without a row".to_string()))?;
        let keys = self
            .sort_keys
            .iter()
            .map(|k| row.get(k.index).cloned().unwrap_or(Value::Null))
            .collect();
        let directions = self.sort_keys.iter().map(|k| k.direction).collect();
        self.heap.push(HeapEntry { keys, directions, unit });
        Ok(())
    }
}

impl MergedResult for OrderByMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        if self.initialized {
            if let Some(unit) = self.current.take() {
                self.advance(unit)?;
            }
        } else {
            self.initialized = true;
            for unit in 0..self.cursors.len() {
                self.advance(unit)?;
            }
        }
        match self.heap.pop() {
            Some(entry) => {
                self.current = Some(entry.unit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current(&self) -> Option<&Row> {
        self.current.and_then(|unit| self.cursors[unit].current_row())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests::shard;

    fn rows(values: &[(i64, &str)]) -> Vec<Vec<Value>> {
        values.iter().map(|(n, s)| vec![Value::Integer(*n), Value::from(*s)]).collect()
    }

    fn drain(mut merged: OrderByMergedResult) -> Vec<(Value, Value)> {
        let mut out = Vec::new();
        while merged.next().unwrap() {
            let row = merged.current().unwrap();
            out.push((row.values[0].clone(), row.values[1].clone()));
        }
        out
    }

    #[test]
    fn test_descending_merge_with_stable_ties() {
        let merged = OrderByMergedResult::new(
            vec![
                shard(&["n", "src"], rows(&[(5, "a"), (2, "a")])),
                shard(&["n", "src"], rows(&[(5, "b"), (3, "b"), (1, "b")])),
            ],
            vec![SortKey { index: 0, direction: OrderDirection::Desc }],
        );
        let out: Vec<String> = drain(merged).into_iter().map(|(n, s)| format!("{n}{s}")).collect();
        assert_eq!(out, vec!["5a", "5b", "3b", "2a", "1b"]);
    }

    #[test]
    fn test_nulls_first_ascending() {
        let merged = OrderByMergedResult::new(
            vec![
                shard(&["n", "src"], rows(&[(1, "a")])),
                shard(&["n", "src"], vec![vec![Value::Null, Value::from("b")]]),
            ],
            vec![SortKey { index: 0, direction: OrderDirection::Asc }],
        );
        let out = drain(merged);
        assert_eq!(out[0].0, Value::Null);
        assert_eq!(out[1].0, Value::Integer(1));
    }

    #[test]
    fn test_empty_shards_are_skipped() {
        let merged = OrderByMergedResult::new(
            vec![shard(&["n", "src"], Vec::new()), shard(&["n", "src"], rows(&[(1, "b")]))],
            vec![SortKey { index: 0, direction: OrderDirection::Asc }],
        );
        assert_eq!(drain(merged).len(), 1);
    }
}
