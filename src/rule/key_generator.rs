use std::fmt::Debug;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::{ShardingError, Value};
use super::algorithm::{required_i64, Props};

/// Produces values for a key column the client left out of an INSERT.
pub trait KeyGenerator: Send + Sync + Debug {
    fn generate_key(&self) -> Value;
}

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: i64,
}

/// 41 bits of milliseconds since 2016-11-01, 10 bits of worker id, 12 bits of sequence.
///
/// Keys are strictly increasing within one process. A clock that moves backwards
/// keeps using the last seen millisecond.
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    epoch_millis: i64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64) -> Result<Self, ShardingError> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardingError::Config(format!(
                "worker-id must be between 0 and {MAX_WORKER_ID}, got {worker_id}"
            )));
        }
        let epoch_millis = Utc
            .with_ymd_and_hms(2016, 11, 1, 0, 0, 0)
            .single()
            .map_or(0, |t| t.timestamp_millis());
        Ok(Self {
            worker_id,
            epoch_millis,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        let worker_id = if props.contains_key("worker-id") { required_i64(props, "worker-id")? } else { 0 };
        Self::new(worker_id)
    }

    fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        let mut now = Utc::now().timestamp_millis().max(state.last_millis);
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; borrow the next one.
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;
        ((now - self.epoch_millis) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generate_key(&self) -> Value {
        Value::Integer(self.next_id())
    }
}

#[derive(Debug)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate_key(&self) -> Value {
        Value::Text(Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_is_strictly_increasing() {
        let generator = SnowflakeKeyGenerator::new(3).unwrap();
        let mut previous = 0;
        for _ in 0..10_000 {
            let Value::Integer(id) = generator.generate_key() else { panic!("expected integer key") };
            assert!(id > previous);
            assert_eq!((id >> SEQUENCE_BITS) & MAX_WORKER_ID, 3);
            previous = id;
        }
    }

    #[test]
    fn test_snowflake_rejects_bad_worker() {
        assert!(SnowflakeKeyGenerator::new(1024).is_err());
        let props: Props = [("worker-id".to_string(), "x".to_string())].into_iter().collect();
        assert!(SnowflakeKeyGenerator::from_props(&props).is_err());
    }

    #[test]
    fn test_uuid_keys_differ() {
        assert_ne!(UuidKeyGenerator.generate_key(), UuidKeyGenerator.generate_key());
    }
}
