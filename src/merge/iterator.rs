use super::{MergedResult, QueryResult};
use crate::core::{Row, ShardingError};

/// Single shard result, no extra buffering.
pub(crate) struct PassthroughMergedResult {
    inner: Box<dyn QueryResult>,
}

impl PassthroughMergedResult {
    pub fn new(inner: Box<dyn QueryResult>) -> Self {
        Self { inner }
    }
}

impl MergedResult for PassthroughMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        self.inner.next()
    }

    fn current(&self) -> Option<&Row> {
        self.inner.current_row()
    }
}

/// Drains each shard in route-unit order.
pub(crate) struct IteratorMergedResult {
    results: Vec<Box<dyn QueryResult>>,
    position: usize,
}

impl IteratorMergedResult {
    pub fn new(results: Vec<Box<dyn QueryResult>>) -> Self {
        Self { results, position: 0 }
    }
}

impl MergedResult for IteratorMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        while let Some(result) = self.results.get_mut(self.position) {
            if result.next()? {
                return Ok(true);
            }
            self.position += 1;
        }
        Ok(false)
    }

    fn current(&self) -> Option<&Row> {
        self.results.get(self.position).and_then(|r| r.current_row())
    }
}
