use crate::core::{ShardingError, Value};
use super::{
    no_target, required_i64, target_with_suffix, PreciseShardingValue, Props, RangeShardingValue, ShardByPrecise,
    ShardByRange, ShardingAlgorithm,
};

/// `value mod sharding-count`, matched against the target's numeric suffix.
#[derive(Debug)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Result<Self, ShardingError> {
        if sharding_count <= 0 {
            return Err(ShardingError::Config("sharding-count must be positive".to_string()));
        }
        Ok(Self { sharding_count })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        Self::new(required_i64(props, "sharding-count")?)
    }
}

impl ShardByPrecise for ModShardingAlgorithm {
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError> {
        let key = value
            .value
            .as_i64()
            .ok_or_else(|| no_target(value.column, value.value, available))?;
        let suffix = key.rem_euclid(self.sharding_count);
        target_with_suffix(available, suffix)
            .cloned()
            .ok_or_else(|| no_target(value.column, value.value, available))
    }
}

impl ShardByRange for ModShardingAlgorithm {
    // A closed range narrower than the modulus can be enumerated; anything wider hits every target.
    fn do_range_sharding(&self, available: &[String], value: &RangeShardingValue<'_>) -> Result<Vec<String>, ShardingError> {
        // Bounds are widened to i128 so exclusive ends and the width never overflow.
        let lower = value.range.lower.as_ref().and_then(|b| {
            b.value.as_i64().map(|v| i128::from(v) + i128::from(!b.inclusive))
        });
        let upper = value.range.upper.as_ref().and_then(|b| {
            b.value.as_i64().map(|v| i128::from(v) - i128::from(!b.inclusive))
        });
        let (Some(lower), Some(upper)) = (lower, upper) else {
            return Ok(available.to_vec());
        };
        if upper < lower {
            return Ok(Vec::new());
        }
        if upper - lower + 1 >= i128::from(self.sharding_count) {
            return Ok(available.to_vec());
        }
        let mut result: Vec<String> = Vec::new();
        for key in lower..=upper {
            let suffix = key.rem_euclid(i128::from(self.sharding_count)) as i64;
            if let Some(target) = target_with_suffix(available, suffix) {
                if !result.contains(target) {
                    result.push(target.clone());
                }
            }
        }
        Ok(result)
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "MOD"
    }

    fn as_range(&self) -> Option<&dyn ShardByRange> {
        Some(self)
    }
}

/// `crc32(value) mod sharding-count`; works for any value type, no range capability.
#[derive(Debug)]
pub struct HashModShardingAlgorithm {
    sharding_count: i64,
}

impl HashModShardingAlgorithm {
    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        let sharding_count = required_i64(props, "sharding-count")?;
        if sharding_count <= 0 {
            return Err(ShardingError::Config("sharding-count must be positive".to_string()));
        }
        Ok(Self { sharding_count })
    }

    fn hash(value: &Value) -> i64 {
        i64::from(crc32fast::hash(value.key_fragment().as_bytes()))
    }
}

impl ShardByPrecise for HashModShardingAlgorithm {
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError> {
        if value.value.is_null() {
            return Err(no_target(value.column, value.value, available));
        }
        let suffix = Self::hash(value.value) % self.sharding_count;
        target_with_suffix(available, suffix)
            .cloned()
            .ok_or_else(|| no_target(value.column, value.value, available))
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HASH_MOD"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::algorithm::{Bound, ShardingRange};

    fn tables() -> Vec<String> {
        vec!["t_order_0".to_string(), "t_order_1".to_string()]
    }

    fn precise(algorithm: &dyn ShardByPrecise, value: Value) -> Result<String, ShardingError> {
        algorithm.do_sharding(
            &tables(),
            &PreciseShardingValue { logic_table: "t_order", column: "order_id", value: &value },
        )
    }

    #[test]
    fn test_mod_precise() {
        let algorithm = ModShardingAlgorithm::new(2).unwrap();
        assert_eq!(precise(&algorithm, Value::Integer(3)).unwrap(), "t_order_1");
        assert_eq!(precise(&algorithm, Value::SmallInt(4)).unwrap(), "t_order_0");
        assert_eq!(precise(&algorithm, Value::Integer(-3)).unwrap(), "t_order_1");
        assert!(matches!(
            precise(&algorithm, Value::Text("abc".to_string())),
            Err(ShardingError::NoRouteTarget { .. })
        ));
    }

    #[test]
    fn test_mod_missing_target_is_error() {
        let algorithm = ModShardingAlgorithm::new(3).unwrap();
        assert!(precise(&algorithm, Value::Integer(2)).is_err());
    }

    #[test]
    fn test_mod_range() {
        let algorithm = ModShardingAlgorithm::new(4).unwrap();
        let available: Vec<String> = (0..4).map(|i| format!("t_{i}")).collect();
        let range = ShardingRange {
            lower: Some(Bound { value: Value::Integer(5), inclusive: true }),
            upper: Some(Bound { value: Value::Integer(7), inclusive: false }),
        };
        let targets = algorithm
            .do_range_sharding(&available, &RangeShardingValue { logic_table: "t", column: "id", range: &range })
            .unwrap();
        assert_eq!(targets, vec!["t_1", "t_2"]);

        let open = ShardingRange {
            lower: Some(Bound { value: Value::Integer(5), inclusive: true }),
            upper: None,
        };
        let targets = algorithm
            .do_range_sharding(&available, &RangeShardingValue { logic_table: "t", column: "id", range: &open })
            .unwrap();
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn test_mod_range_at_integer_limits() {
        let algorithm = ModShardingAlgorithm::new(4).unwrap();
        let available: Vec<String> = (0..4).map(|i| format!("t_{i}")).collect();
        let route = |lower: Bound, upper: Bound| {
            let range = ShardingRange { lower: Some(lower), upper: Some(upper) };
            algorithm
                .do_range_sharding(&available, &RangeShardingValue { logic_table: "t", column: "id", range: &range })
                .unwrap()
        };
        let inclusive = |v: i64| Bound { value: Value::Integer(v), inclusive: true };
        let exclusive = |v: i64| Bound { value: Value::Integer(v), inclusive: false };

        assert_eq!(route(inclusive(-1), inclusive(i64::MAX)).len(), 4);
        assert_eq!(route(inclusive(i64::MIN), inclusive(i64::MAX)).len(), 4);
        assert_eq!(route(inclusive(i64::MAX - 1), inclusive(i64::MAX)), vec!["t_2", "t_3"]);
        assert_eq!(route(inclusive(i64::MIN), inclusive(i64::MIN)), vec!["t_0"]);
        assert!(route(exclusive(i64::MAX), inclusive(i64::MAX)).is_empty());
        assert!(route(inclusive(i64::MIN), exclusive(i64::MIN)).is_empty());
    }

    #[test]
    fn test_hash_mod_is_stable() {
        let props: Props = [("sharding-count".to_string(), "2".to_string())].into_iter().collect();
        let algorithm = HashModShardingAlgorithm::from_props(&props).unwrap();
        let first = precise(&algorithm, Value::Text("alice".to_string())).unwrap();
        let second = precise(&algorithm, Value::Text("alice".to_string())).unwrap();
        assert_eq!(first, second);
        assert!(algorithm.as_range().is_none());
    }
}
