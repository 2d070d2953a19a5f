// Module declarations
pub mod algorithm;
pub mod data_node;
pub mod encrypt;
pub mod key_generator;
pub mod readwrite;
pub mod shadow;
pub mod sharding;

// Re-exports for convenience
pub use algorithm::{AlgorithmRegistry, Bound, ShardingAlgorithm, ShardingRange};
pub use data_node::DataNode;
pub use encrypt::{EncryptColumn, EncryptRule, Encryptor};
pub use key_generator::KeyGenerator;
pub use readwrite::{LoadBalancer, ReadwriteSplittingGroup, ReadwriteSplittingRule};
pub use shadow::ShadowRule;
pub use sharding::{KeyGenerateStrategy, ShardingRule, ShardingStrategy, TableRule};

use crate::executor::DispatchMode;

pub const DEFAULT_MAX_ROUTE_UNITS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProperties {
    /// Log logic and actual SQL at info level.
    pub sql_show: bool,
    /// Upper bound on units produced by cartesian routing.
    pub max_route_units: usize,
    pub dispatch: DispatchMode,
    pub max_parallelism: usize,
}

impl Default for RuleProperties {
    fn default() -> Self {
        Self {
            sql_show: false,
            max_route_units: DEFAULT_MAX_ROUTE_UNITS,
            dispatch: DispatchMode::Serial,
            max_parallelism: 8,
        }
    }
}

/// Immutable snapshot of every rule the pipeline consults.
///
/// Built once by configuration loading and passed by reference through
/// routing, rewriting and merging.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Logical data source names (read/write groups count as one).
    pub data_sources: Vec<String>,
    pub default_data_source: Option<String>,
    pub sharding: ShardingRule,
    pub encrypt: EncryptRule,
    pub readwrite: ReadwriteSplittingRule,
    pub shadow: Option<ShadowRule>,
    pub props: RuleProperties,
}

impl RuleSet {
    /// Data source for statements that touch no sharded table.
    #[must_use]
    pub fn passthrough_data_source(&self) -> Option<&str> {
        self.default_data_source
            .as_deref()
            .or_else(|| self.data_sources.first().map(String::as_str))
    }

    #[must_use]
    pub fn contains_data_source(&self, name: &str) -> bool {
        self.data_sources.iter().any(|ds| ds == name)
    }
}
