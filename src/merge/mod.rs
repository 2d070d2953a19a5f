// Result merging: combines per-shard cursors into one logical cursor
mod aggregation;
mod decrypt;
mod groupby;
mod iterator;
mod orderby;
mod pagination;
mod shape;

pub use shape::{AggregationColumn, QueryShape, SortKey};

use crate::core::{Row, ShardingError, Value};
use crate::executor::CancellationToken;
use crate::metadata::SchemaMetadata;
use crate::rule::RuleSet;
use crate::statement::StatementContext;

use decrypt::DecryptMergedResult;
use groupby::{GroupByMemoryMergedResult, GroupByStreamMergedResult};
use iterator::{IteratorMergedResult, PassthroughMergedResult};
use orderby::OrderByMergedResult;
use pagination::PaginationMergedResult;

/// Raw cursor over one shard's rows, as returned by the execution layer.
pub trait QueryResult: Send {
    /// Column labels as reported by the data source.
    fn columns(&self) -> &[String];

    /// Advances to the next row. Errors raised mid-stream surface here.
    fn next(&mut self) -> Result<bool, ShardingError>;

    fn current_row(&self) -> Option<&Row>;
}

/// Fully buffered shard result.
#[derive(Debug, Clone)]
pub struct MemoryQueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    position: usize,
}

impl MemoryQueryResult {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows, position: 0 }
    }
}

impl QueryResult for MemoryQueryResult {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardingError> {
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn current_row(&self) -> Option<&Row> {
        self.position.checked_sub(1).and_then(|i| self.rows.get(i))
    }
}

pub type RowStream = Box<dyn Iterator<Item = Result<Row, ShardingError>> + Send>;

/// Shard result pulled lazily from a row iterator, one row in memory at a time.
pub struct StreamQueryResult {
    columns: Vec<String>,
    rows: RowStream,
    current: Option<Row>,
    cancel: Option<CancellationToken>,
}

impl StreamQueryResult {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: RowStream) -> Self {
        Self { columns, rows, current: None, cancel: None }
    }

    /// Stops yielding rows once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl QueryResult for StreamQueryResult {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardingError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.current = None;
            return Ok(false);
        }
        match self.rows.next() {
            Some(row) => {
                self.current = Some(row?);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}

/// Re-orders a shard's columns to the label order of the first shard.
struct AlignedQueryResult {
    inner: Box<dyn QueryResult>,
    columns: Vec<String>,
    mapping: Vec<usize>,
    current: Option<Row>,
}

impl QueryResult for AlignedQueryResult {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardingError> {
        if !self.inner.next()? {
            self.current = None;
            return Ok(false);
        }
        let row = self
            .inner
            .current_row()
            .ok_or_else(|| ShardingError::MergeInvariant("cursor advanced without a row".to_string()))?;
        let values = self
            .mapping
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
            .collect();
        self.current = Some(Row::new(values));
        Ok(true)
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}

fn align(results: Vec<Box<dyn QueryResult>>, labels: &[String]) -> Result<Vec<Box<dyn QueryResult>>, ShardingError> {
    results
        .into_iter()
        .map(|result| {
            let own = result.columns();
            if own.len() == labels.len() && own.iter().zip(labels).all(|(a, b)| a.eq_ignore_ascii_case(b)) {
                return Ok(result);
            }
            let mapping = labels
                .iter()
                .map(|label| {
                    own.iter()
                        .position(|c| c.eq_ignore_ascii_case(label))
                        .ok_or_else(|| ShardingError::MergeInvariant(format!("shard result has no column '{label}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(AlignedQueryResult { inner: result, columns: labels.to_vec(), mapping, current: None })
                as Box<dyn QueryResult>)
        })
        .collect()
}

/// Cursor contract shared by every merge strategy and decorator.
pub(crate) trait MergedResult: Send {
    fn next(&mut self) -> Result<bool, ShardingError>;
    fn current(&self) -> Option<&Row>;
}

struct EmptyMergedResult;

impl MergedResult for EmptyMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        Ok(false)
    }

    fn current(&self) -> Option<&Row> {
        None
    }
}

/// The logical result handed back to the caller.
///
/// Only the logical columns are visible; derived helper columns stay hidden.
/// Once the cancellation token fires, `next` reports exhaustion.
pub struct MergedResultSet {
    inner: Box<dyn MergedResult>,
    columns: Vec<String>,
    cancel: CancellationToken,
    done: bool,
}

impl MergedResultSet {
    fn new(inner: Box<dyn MergedResult>, columns: Vec<String>, cancel: CancellationToken) -> Self {
        Self { inner, columns, cancel, done: false }
    }

    pub fn next(&mut self) -> Result<bool, ShardingError> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return Ok(false);
        }
        match self.inner.next() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.done = true;
                Ok(false)
            }
            Err(_) if self.cancel.is_cancelled() => {
                self.done = true;
                Ok(false)
            }
            Err(err) => {
                self.done = true;
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Visible values of the current row.
    #[must_use]
    pub fn row(&self) -> Option<&[Value]> {
        if self.done {
            return None;
        }
        self.inner
            .current()
            .map(|row| &row.values[..self.columns.len().min(row.values.len())])
    }

    pub fn value(&self, index: usize) -> Result<&Value, ShardingError> {
        self.row()
            .ok_or_else(|| ShardingError::MergeInvariant("no current row".to_string()))?
            .get(index)
            .ok_or_else(|| ShardingError::ColumnNotFound(format!("#{}", index + 1)))
    }

    /// Drains the cursor into owned rows.
    pub fn collect_rows(mut self) -> Result<Vec<Row>, ShardingError> {
        let mut rows = Vec::new();
        while self.next()? {
            if let Some(values) = self.row() {
                rows.push(Row::new(values.to_vec()));
            }
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for MergedResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedResultSet").field("columns", &self.columns).field("done", &self.done).finish()
    }
}

/// Picks and composes the merge strategy for one statement.
pub struct MergeEngine<'a> {
    rules: &'a RuleSet,
    metadata: &'a SchemaMetadata,
}

impl<'a> MergeEngine<'a> {
    #[must_use]
    pub const fn new(rules: &'a RuleSet, metadata: &'a SchemaMetadata) -> Self {
        Self { rules, metadata }
    }

    /// Merges shard cursors given in route-unit order.
    ///
    /// `parameters` are the statement's original parameters, used to resolve
    /// the logical LIMIT / OFFSET.
    pub fn merge_query(
        &self,
        statement: &StatementContext,
        parameters: &[Value],
        results: Vec<Box<dyn QueryResult>>,
        cancel: &CancellationToken,
    ) -> Result<MergedResultSet, ShardingError> {
        let raw_labels = results.first().map(|r| r.columns().to_vec()).unwrap_or_default();
        let shape = QueryShape::resolve(statement, &raw_labels, self.metadata, self.rules)?;
        let labels = shape.labels.clone();

        let merged: Box<dyn MergedResult> = match results.len() {
            0 => Box::new(EmptyMergedResult),
            1 => match results.into_iter().next() {
                Some(result) => Box::new(PassthroughMergedResult::new(result)),
                None => Box::new(EmptyMergedResult),
            },
            _ => {
                let results = align(results, &raw_labels)?;
                let keys = shape.merge_keys(statement, &raw_labels)?;
                let merged = Self::build(statement, keys, results)?;
                match Self::pagination(statement, parameters)? {
                    Some((offset, limit)) => Box::new(PaginationMergedResult::new(merged, offset, limit)),
                    None => merged,
                }
            }
        };

        let merged = if shape.decrypt.is_empty() {
            merged
        } else {
            Box::new(DecryptMergedResult::new(merged, shape.decrypt.clone()))
        };
        Ok(MergedResultSet::new(merged, labels, cancel.clone()))
    }

    fn build(
        statement: &StatementContext,
        keys: shape::MergeKeys,
        results: Vec<Box<dyn QueryResult>>,
    ) -> Result<Box<dyn MergedResult>, ShardingError> {
        let grouping = !statement.group_by().is_empty() || statement.has_aggregation() || statement.is_distinct();
        if grouping {
            if keys.stream_grouping() {
                tracing::debug!(shards = results.len(), "stream group merge");
                let ordered = OrderByMergedResult::new(results, keys.order_by.clone());
                return Ok(Box::new(GroupByStreamMergedResult::new(ordered, keys.group_by, keys.aggregations)));
            }
            tracing::debug!(shards = results.len(), "memory group merge");
            return Ok(Box::new(GroupByMemoryMergedResult::new(
                results,
                keys.group_by,
                keys.order_by,
                keys.aggregations,
            )));
        }
        if !keys.order_by.is_empty() {
            tracing::debug!(shards = results.len(), "order by merge");
            return Ok(Box::new(OrderByMergedResult::new(results, keys.order_by)));
        }
        tracing::debug!(shards = results.len(), "iterator merge");
        Ok(Box::new(IteratorMergedResult::new(results)))
    }

    fn pagination(statement: &StatementContext, parameters: &[Value]) -> Result<Option<(u64, Option<u64>)>, ShardingError> {
        let Some(pagination) = statement.select.as_ref().and_then(|s| s.pagination.as_ref()) else {
            return Ok(None);
        };
        let offset = pagination.offset.map(|v| v.resolve(parameters)).transpose()?.unwrap_or(0);
        let limit = pagination.row_count.map(|v| v.resolve(parameters)).transpose()?;
        Ok(Some((offset, limit)))
    }

    /// Affected-row count reported for a write routed to several units.
    #[must_use]
    pub fn merge_update(counts: &[u64], accumulate: bool) -> u64 {
        if accumulate {
            counts.iter().sum()
        } else {
            counts.first().copied().unwrap_or(0)
        }
    }
}
