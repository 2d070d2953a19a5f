use std::sync::Arc;

use super::MergedResult;
use crate::core::{Row, ShardingError};
use crate::rule::Encryptor;

/// Decrypts cipher columns of every merged row.
pub(crate) struct DecryptMergedResult {
    inner: Box<dyn MergedResult>,
    columns: Vec<(usize, Arc<dyn Encryptor>)>,
    current: Option<Row>,
}

impl DecryptMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, columns: Vec<(usize, Arc<dyn Encryptor>)>) -> Self {
        Self { inner, columns, current: None }
    }
}

impl MergedResult for DecryptMergedResult {
    fn next(&mut self) -> Result<bool, ShardingError> {
        self.current = None;
        if !self.inner.next()? {
            return Ok(false);
        }
        let Some(row) = self.inner.current() else {
            return Ok(false);
        };
        let mut row = row.clone();
        for (index, encryptor) in &self.columns {
            if let Some(value) = row.values.get_mut(*index) {
                if !value.is_null() {
                    *value = encryptor.decrypt(value)?;
                }
            }
        }
        self.current = Some(row);
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::merge::iterator::IteratorMergedResult;
    use crate::merge::tests::shard;
    use crate::rule::encrypt::AesEncryptor;

    #[test]
    fn test_cipher_columns_are_decrypted() {
        let aes: Arc<dyn Encryptor> = Arc::new(AesEncryptor::new("secret").unwrap());
        let cipher = aes.encrypt(&Value::from("13800000000")).unwrap();
        let inner = IteratorMergedResult::new(vec![shard(
            &["id", "phone"],
            vec![vec![Value::Integer(1), cipher], vec![Value::Integer(2), Value::Null]],
        )]);
        let mut merged = DecryptMergedResult::new(Box::new(inner), vec![(1, aes)]);
        assert!(merged.next().unwrap());
        assert_eq!(merged.current().unwrap().values[1], Value::from("13800000000"));
        assert!(merged.next().unwrap());
        assert_eq!(merged.current().unwrap().values[1], Value::Null);
        assert!(!merged.next().unwrap());
    }
}
