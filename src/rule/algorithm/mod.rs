// Pluggable sharding algorithms
mod modulo;
mod range;

pub use modulo::{HashModShardingAlgorithm, ModShardingAlgorithm};
pub use range::{BoundaryRangeShardingAlgorithm, VolumeRangeShardingAlgorithm};

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::{ShardingError, Value};
use super::encrypt::{AesEncryptor, Encryptor, Sha256Encryptor};
use super::key_generator::{KeyGenerator, SnowflakeKeyGenerator, UuidKeyGenerator};
use super::readwrite::{LoadBalancer, RoundRobinLoadBalancer, WeightLoadBalancer};

/// Algorithm properties as written in configuration.
pub type Props = HashMap<String, String>;

/// A bound on one side of a range condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub inclusive: bool,
}

/// Range of sharding values; `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl ShardingRange {
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { lower: None, upper: None }
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        use std::cmp::Ordering;
        let above_lower = self.lower.as_ref().is_none_or(|b| match value.compare(&b.value) {
            Ordering::Greater => true,
            Ordering::Equal => b.inclusive,
            Ordering::Less => false,
        });
        let below_upper = self.upper.as_ref().is_none_or(|b| match value.compare(&b.value) {
            Ordering::Less => true,
            Ordering::Equal => b.inclusive,
            Ordering::Greater => false,
        });
        above_lower && below_upper
    }
}

pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a Value,
}

pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub range: &'a ShardingRange,
}

/// Maps one value to exactly one of the available targets.
pub trait ShardByPrecise: Send + Sync + Debug {
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError>;
}

/// Maps a range of values to every target whose partition intersects it.
pub trait ShardByRange: Send + Sync + Debug {
    fn do_range_sharding(&self, available: &[String], value: &RangeShardingValue<'_>) -> Result<Vec<String>, ShardingError>;
}

/// Maps a list of values at once.
pub trait ShardByList: Send + Sync + Debug {
    fn do_list_sharding(&self, available: &[String], column: &str, values: &[Value]) -> Result<Vec<String>, ShardingError>;
}

/// A registered sharding algorithm. Precise sharding is mandatory, the
/// other capabilities are optional.
pub trait ShardingAlgorithm: ShardByPrecise {
    fn type_name(&self) -> &'static str;

    fn as_range(&self) -> Option<&dyn ShardByRange> {
        None
    }

    fn as_list(&self) -> Option<&dyn ShardByList> {
        None
    }
}

type ShardingFactory = fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, ShardingError>;
type KeyGeneratorFactory = fn(&Props) -> Result<Arc<dyn KeyGenerator>, ShardingError>;
type EncryptorFactory = fn(&Props) -> Result<Arc<dyn Encryptor>, ShardingError>;
type LoadBalancerFactory = fn(&Props) -> Result<Arc<dyn LoadBalancer>, ShardingError>;

/// Typed registry of algorithm constructors keyed by upper-case type name.
///
/// Resolved once at rule-load time; routing only ever sees constructed instances.
pub struct AlgorithmRegistry {
    sharding: HashMap<String, ShardingFactory>,
    key_generators: HashMap<String, KeyGeneratorFactory>,
    encryptors: HashMap<String, EncryptorFactory>,
    load_balancers: HashMap<String, LoadBalancerFactory>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl AlgorithmRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sharding: HashMap::new(),
            key_generators: HashMap::new(),
            encryptors: HashMap::new(),
            load_balancers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_sharding("MOD", |p| Ok(Arc::new(ModShardingAlgorithm::from_props(p)?)));
        registry.register_sharding("HASH_MOD", |p| Ok(Arc::new(HashModShardingAlgorithm::from_props(p)?)));
        registry.register_sharding("BOUNDARY_RANGE", |p| Ok(Arc::new(BoundaryRangeShardingAlgorithm::from_props(p)?)));
        registry.register_sharding("VOLUME_RANGE", |p| Ok(Arc::new(VolumeRangeShardingAlgorithm::from_props(p)?)));
        registry.register_key_generator("SNOWFLAKE", |p| Ok(Arc::new(SnowflakeKeyGenerator::from_props(p)?)));
        registry.register_key_generator("UUID", |_| Ok(Arc::new(UuidKeyGenerator)));
        registry.register_encryptor("AES", |p| Ok(Arc::new(AesEncryptor::from_props(p)?)));
        registry.register_encryptor("SHA256", |_| Ok(Arc::new(Sha256Encryptor)));
        registry.register_load_balancer("ROUND_ROBIN", |_| Ok(Arc::new(RoundRobinLoadBalancer::new())));
        registry.register_load_balancer("WEIGHT", |p| Ok(Arc::new(WeightLoadBalancer::from_props(p)?)));
        registry
    }

    pub fn register_sharding(&mut self, name: &str, factory: ShardingFactory) {
        self.sharding.insert(name.to_uppercase(), factory);
    }

    pub fn register_key_generator(&mut self, name: &str, factory: KeyGeneratorFactory) {
        self.key_generators.insert(name.to_uppercase(), factory);
    }

    pub fn register_encryptor(&mut self, name: &str, factory: EncryptorFactory) {
        self.encryptors.insert(name.to_uppercase(), factory);
    }

    pub fn register_load_balancer(&mut self, name: &str, factory: LoadBalancerFactory) {
        self.load_balancers.insert(name.to_uppercase(), factory);
    }

    pub fn create_sharding(&self, type_name: &str, props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ShardingError> {
        let factory = self
            .sharding
            .get(&type_name.to_uppercase())
            .ok_or_else(|| ShardingError::AlgorithmNotFound(type_name.to_string()))?;
        factory(props)
    }

    pub fn create_key_generator(&self, type_name: &str, props: &Props) -> Result<Arc<dyn KeyGenerator>, ShardingError> {
        let factory = self
            .key_generators
            .get(&type_name.to_uppercase())
            .ok_or_else(|| ShardingError::AlgorithmNotFound(type_name.to_string()))?;
        factory(props)
    }

    pub fn create_encryptor(&self, type_name: &str, props: &Props) -> Result<Arc<dyn Encryptor>, ShardingError> {
        let factory = self
            .encryptors
            .get(&type_name.to_uppercase())
            .ok_or_else(|| ShardingError::AlgorithmNotFound(type_name.to_string()))?;
        factory(props)
    }

    pub fn create_load_balancer(&self, type_name: &str, props: &Props) -> Result<Arc<dyn LoadBalancer>, ShardingError> {
        let factory = self
            .load_balancers
            .get(&type_name.to_uppercase())
            .ok_or_else(|| ShardingError::AlgorithmNotFound(type_name.to_string()))?;
        factory(props)
    }
}

/// Reads a required integer property.
pub(crate) fn required_i64(props: &Props, key: &str) -> Result<i64, ShardingError> {
    props
        .get(key)
        .ok_or_else(|| ShardingError::Config(format!("Missing algorithm property '{key}'")))?
        .trim()
        .parse()
        .map_err(|_| ShardingError::Config(format!("Property '{key}' must be an integer")))
}

/// Finds the target whose trailing number equals `suffix`, e.g. `t_order_1` for 1.
pub(crate) fn target_with_suffix<'a>(available: &'a [String], suffix: i64) -> Option<&'a String> {
    available.iter().find(|target| {
        let digits: String = target
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        !digits.is_empty() && digits.parse::<i64>().ok() == Some(suffix)
    })
}

pub(crate) fn no_target(column: &str, value: &Value, available: &[String]) -> ShardingError {
    ShardingError::NoRouteTarget {
        column: column.to_string(),
        value: value.to_string(),
        available: available.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Props {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_registry_resolves_case_insensitively() {
        let registry = AlgorithmRegistry::with_builtin();
        let algorithm = registry.create_sharding("mod", &props(&[("sharding-count", "2")])).unwrap();
        assert_eq!(algorithm.type_name(), "MOD");
        assert!(matches!(
            registry.create_sharding("INLINE", &Props::new()),
            Err(ShardingError::AlgorithmNotFound(_))
        ));
    }

    #[test]
    fn test_suffix_match_is_exact() {
        let available = vec!["t_1".to_string(), "t_11".to_string()];
        assert_eq!(target_with_suffix(&available, 11).unwrap(), "t_11");
        assert_eq!(target_with_suffix(&available, 1).unwrap(), "t_1");
        assert!(target_with_suffix(&available, 2).is_none());
    }

    #[test]
    fn test_range_contains() {
        let range = ShardingRange {
            lower: Some(Bound { value: Value::Integer(1), inclusive: false }),
            upper: Some(Bound { value: Value::Integer(5), inclusive: true }),
        };
        assert!(!range.contains(&Value::Integer(1)));
        assert!(range.contains(&Value::Integer(5)));
        assert!(ShardingRange::unbounded().contains(&Value::Null));
    }
}
