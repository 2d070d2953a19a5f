use super::MergedResult;
use crate::core::{Row, ShardingError};

/// Skips `offset` merged rows, then yields at most `limit`.
pub(crate) struct PaginationMergedResult {
    inner: Box<dyn MergedResult>,
    offset: u64,
    limit: Option<u64>,
    skipped: bool,
    emitted: u64,
    exhausted: bool,
}

impl PaginationMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, offset: u64, limit: Option<u64>) -> Self {
        Self { inner, offset, limit, skipped: false, emitted: 0, exhausted: false }
    }
}

impl MergedResult for PaginationMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    self.exhausted = true;
                    return Ok(false);
                }
            }
        }
        if self.limit.is_some_and(|limit| self.emitted >= limit) || !self.inner.next()? {
            self.exhausted = true;
            return Ok(false);
        }
        self.emitted += 1;
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        if self.exhausted {
            None
        } else {
            self.inner.current()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::merge::iterator::IteratorMergedResult;
    use crate::merge::tests::shard;

    fn numbers(from: i64, to: i64) -> Vec<Vec<Value>> {
        (from..=to).map(|v| vec![Value::Integer(v)]).collect()
    }

    fn drain(mut merged: PaginationMergedResult) -> Vec<i64> {
        let mut out = Vec::new();
        while merged.next().unwrap() {
            out.extend(merged.current().and_then(|r| r.values[0].as_i64()));
        }
        out
    }

    #[test]
    fn test_offset_then_limit() {
        let inner = IteratorMergedResult::new(vec![shard(&["n"], numbers(1, 10)), shard(&["n"], numbers(11, 20))]);
        assert_eq!(drain(PaginationMergedResult::new(Box::new(inner), 5, Some(3))), vec![6, 7, 8]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let inner = IteratorMergedResult::new(vec![shard(&["n"], numbers(1, 2)), shard(&["n"], numbers(3, 4))]);
        assert!(drain(PaginationMergedResult::new(Box::new(inner), 5, Some(3))).is_empty());
    }

    #[test]
    fn test_offset_without_limit() {
        let inner = IteratorMergedResult::new(vec![shard(&["n"], numbers(1, 4))]);
        assert_eq!(drain(PaginationMergedResult::new(Box::new(inner), 2, None)), vec![3, 4]);
    }
}
