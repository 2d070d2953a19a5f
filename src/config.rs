// Rule configuration loading: TOML file + SHARDRUSTQL__* environment overrides
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::core::{ColumnMetadata, ShardingError};
use crate::executor::DispatchMode;
use crate::metadata::{SchemaMetadata, TableMetadata};
use crate::parser::parse_data_type;
use crate::rule::algorithm::Props;
use crate::rule::data_node::parse_data_nodes;
use crate::rule::encrypt::EncryptTable;
use crate::rule::{
    AlgorithmRegistry, EncryptColumn, EncryptRule, KeyGenerateStrategy, ReadwriteSplittingGroup,
    ReadwriteSplittingRule, RuleProperties, RuleSet, ShadowRule, ShardingRule, ShardingStrategy, TableRule,
    DEFAULT_MAX_ROUTE_UNITS,
};

pub const ENV_PREFIX: &str = "SHARDRUSTQL";

#[derive(Debug, Clone, Deserialize)]
pub struct PropsConfig {
    #[serde(default)]
    pub sql_show: bool,
    #[serde(default = "default_max_route_units")]
    pub max_route_units: usize,
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
}

fn default_max_route_units() -> usize { DEFAULT_MAX_ROUTE_UNITS }
fn default_max_parallelism() -> usize { 8 }

impl Default for PropsConfig {
    fn default() -> Self {
        Self {
            sql_show: false,
            max_route_units: default_max_route_units(),
            dispatch: DispatchMode::default(),
            max_parallelism: default_max_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSourcesConfig {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

/// `{ type = "MOD", props = { sharding-count = 2 } }`
#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub props: Props,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub column: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    pub generator: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRuleConfig {
    pub actual_data_nodes: String,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShardingConfig {
    #[serde(default)]
    pub tables: HashMap<String, TableRuleConfig>,
    #[serde(default)]
    pub algorithms: HashMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: HashMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub binding_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptColumnConfig {
    pub cipher: String,
    #[serde(default)]
    pub plain: Option<String>,
    #[serde(default)]
    pub assisted_query: Option<String>,
    pub encryptor: String,
    #[serde(default)]
    pub assisted_query_encryptor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptTableConfig {
    #[serde(default)]
    pub columns: HashMap<String, EncryptColumnConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptConfig {
    #[serde(default)]
    pub encryptors: HashMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub tables: HashMap<String, EncryptTableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadwriteGroupConfig {
    pub primary: String,
    #[serde(default)]
    pub replicas: Vec<String>,
    #[serde(default)]
    pub load_balancer: Option<AlgorithmConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadwriteConfig {
    #[serde(default)]
    pub groups: HashMap<String, ReadwriteGroupConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    pub column: String,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataTableConfig {
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub tables: HashMap<String, MetadataTableConfig>,
}

/// Raw rule configuration as written in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleConfiguration {
    #[serde(default)]
    pub props: PropsConfig,
    #[serde(default)]
    pub data_sources: DataSourcesConfig,
    #[serde(default)]
    pub sharding: ShardingConfig,
    #[serde(default)]
    pub encrypt: EncryptConfig,
    #[serde(default)]
    pub readwrite_splitting: ReadwriteConfig,
    #[serde(default)]
    pub shadow: Option<ShadowConfig>,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl RuleConfiguration {
    /// Loads `path` and applies `SHARDRUSTQL__SECTION__KEY` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ShardingError> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize::<Self>()?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ShardingError> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize::<Self>()?)
    }

    /// Validates the configuration and builds the immutable rule and metadata snapshots.
    pub fn build(&self) -> Result<(RuleSet, SchemaMetadata), ShardingError> {
        self.build_with(&AlgorithmRegistry::with_builtin())
    }

    pub fn build_with(&self, registry: &AlgorithmRegistry) -> Result<(RuleSet, SchemaMetadata), ShardingError> {
        let data_sources = self.data_sources.names.clone();
        if data_sources.is_empty() {
            return Err(ShardingError::Config("data_sources.names must list at least one data source".to_string()));
        }
        if let Some(default) = &self.data_sources.default {
            if !data_sources.contains(default) {
                return Err(ShardingError::DataSourceNotFound(default.clone()));
            }
        }

        let rules = RuleSet {
            sharding: self.build_sharding(registry, &data_sources)?,
            encrypt: self.build_encrypt(registry)?,
            readwrite: self.build_readwrite(registry, &data_sources)?,
            shadow: self.build_shadow(&data_sources)?,
            props: RuleProperties {
                sql_show: self.props.sql_show,
                max_route_units: self.props.max_route_units.max(1),
                dispatch: self.props.dispatch,
                max_parallelism: self.props.max_parallelism.max(1),
            },
            default_data_source: self.data_sources.default.clone(),
            data_sources,
        };
        Ok((rules, self.build_metadata()?))
    }

    fn build_sharding(&self, registry: &AlgorithmRegistry, data_sources: &[String]) -> Result<ShardingRule, ShardingError> {
        let config = &self.sharding;
        let mut algorithms = HashMap::new();
        for (name, algorithm) in &config.algorithms {
            algorithms.insert(name.clone(), registry.create_sharding(&algorithm.type_name, &algorithm.props)?);
        }
        let mut generators = HashMap::new();
        for (name, generator) in &config.key_generators {
            generators.insert(name.clone(), registry.create_key_generator(&generator.type_name, &generator.props)?);
        }
        let strategy = |s: &StrategyConfig| -> Result<ShardingStrategy, ShardingError> {
            let algorithm = algorithms
                .get(&s.algorithm)
                .ok_or_else(|| ShardingError::AlgorithmNotFound(s.algorithm.clone()))?;
            Ok(ShardingStrategy {
                column: s.column.to_lowercase(),
                algorithm_name: s.algorithm.clone(),
                algorithm: Arc::clone(algorithm),
            })
        };

        let mut rule = ShardingRule::new();
        rule.default_database_strategy = config.default_database_strategy.as_ref().map(&strategy).transpose()?;
        rule.default_table_strategy = config.default_table_strategy.as_ref().map(&strategy).transpose()?;

        let mut names: Vec<&String> = config.tables.keys().collect();
        names.sort();
        for name in names {
            let table = &config.tables[name];
            let nodes = parse_data_nodes(&table.actual_data_nodes)?;
            if let Some(node) = nodes.iter().find(|n| !data_sources.contains(&n.data_source)) {
                return Err(ShardingError::DataSourceNotFound(node.data_source.clone()));
            }
            let mut table_rule = TableRule::new(name, nodes);
            table_rule.database_strategy = table.database_strategy.as_ref().map(&strategy).transpose()?;
            table_rule.table_strategy = table.table_strategy.as_ref().map(&strategy).transpose()?;
            if let Some(key) = &table.key_generate {
                let generator = generators
                    .get(&key.generator)
                    .ok_or_else(|| ShardingError::AlgorithmNotFound(key.generator.clone()))?;
                table_rule.key_generate = Some(KeyGenerateStrategy {
                    column: key.column.to_lowercase(),
                    generator: Arc::clone(generator),
                });
            }
            rule.add_table_rule(table_rule);
        }
        for group in &config.binding_groups {
            rule.add_binding_group(group)?;
        }
        for table in &config.broadcast_tables {
            rule.add_broadcast_table(table)?;
        }
        Ok(rule)
    }

    fn build_encrypt(&self, registry: &AlgorithmRegistry) -> Result<EncryptRule, ShardingError> {
        let mut encryptors = HashMap::new();
        for (name, encryptor) in &self.encrypt.encryptors {
            encryptors.insert(name.clone(), registry.create_encryptor(&encryptor.type_name, &encryptor.props)?);
        }
        let lookup = |name: &String| {
            encryptors
                .get(name)
                .cloned()
                .ok_or_else(|| ShardingError::AlgorithmNotFound(name.clone()))
        };

        let mut rule = EncryptRule::default();
        for (table, table_config) in &self.encrypt.tables {
            let mut encrypt_table = EncryptTable::default();
            for (logic, column) in &table_config.columns {
                let assisted_query_encryptor = column.assisted_query_encryptor.as_ref().map(&lookup).transpose()?;
                if column.assisted_query.is_some() != assisted_query_encryptor.is_some() {
                    return Err(ShardingError::Config(format!(
                        "Column '{table}.{logic}' needs both assisted_query and assisted_query_encryptor"
                    )));
                }
                encrypt_table.add_column(EncryptColumn {
                    logic_column: logic.to_lowercase(),
                    cipher_column: column.cipher.clone(),
                    plain_column: column.plain.clone(),
                    assisted_query_column: column.assisted_query.clone(),
                    encryptor: lookup(&column.encryptor)?,
                    assisted_query_encryptor,
                });
            }
            rule.add_table(table, encrypt_table);
        }
        Ok(rule)
    }

    fn build_readwrite(&self, registry: &AlgorithmRegistry, data_sources: &[String]) -> Result<ReadwriteSplittingRule, ShardingError> {
        let mut rule = ReadwriteSplittingRule::default();
        for (name, group) in &self.readwrite_splitting.groups {
            if !data_sources.contains(name) {
                return Err(ShardingError::DataSourceNotFound(name.clone()));
            }
            let load_balancer = match &group.load_balancer {
                Some(balancer) => registry.create_load_balancer(&balancer.type_name, &balancer.props)?,
                None => registry.create_load_balancer("ROUND_ROBIN", &Props::new())?,
            };
            rule.add_group(ReadwriteSplittingGroup {
                name: name.clone(),
                primary: group.primary.clone(),
                replicas: group.replicas.clone(),
                load_balancer,
            });
        }
        Ok(rule)
    }

    fn build_shadow(&self, data_sources: &[String]) -> Result<Option<ShadowRule>, ShardingError> {
        let Some(config) = &self.shadow else {
            return Ok(None);
        };
        let mut rule = ShadowRule::new(&config.column);
        for (source, shadow) in &config.mappings {
            if !data_sources.contains(source) {
                return Err(ShardingError::DataSourceNotFound(source.clone()));
            }
            rule.add_mapping(source, shadow);
        }
        Ok(Some(rule))
    }

    fn build_metadata(&self) -> Result<SchemaMetadata, ShardingError> {
        let mut schema = SchemaMetadata::new();
        for (name, table) in &self.metadata.tables {
            let columns = table
                .columns
                .iter()
                .map(|c| {
                    parse_data_type(&c.data_type)
                        .map(|t| ColumnMetadata::new(&c.name, t, c.primary_key))
                        .map_err(ShardingError::Config)
                })
                .collect::<Result<Vec<_>, _>>()?;
            schema.add_table(TableMetadata::new(name, columns));
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RULES: &str = r#"
[props]
sql_show = true
max_route_units = 16

[data_sources]
names = ["ds_0", "ds_1"]
default = "ds_0"

[sharding]
binding_groups = [["t_order", "t_order_item"]]
broadcast_tables = ["t_config"]

[sharding.default_database_strategy]
column = "user_id"
algorithm = "database_mod"

[sharding.tables.t_order]
actual_data_nodes = "ds_${0..1}.t_order_${0..1}"
table_strategy = { column = "order_id", algorithm = "table_mod" }
key_generate = { column = "order_id", generator = "snowflake" }

[sharding.tables.t_order_item]
actual_data_nodes = "ds_${0..1}.t_order_item_${0..1}"
table_strategy = { column = "order_id", algorithm = "table_mod" }

[sharding.algorithms.database_mod]
type = "MOD"
props = { sharding-count = 2 }

[sharding.algorithms.table_mod]
type = "MOD"
props = { sharding-count = "2" }

[sharding.key_generators.snowflake]
type = "SNOWFLAKE"

[encrypt.encryptors.aes]
type = "AES"
props = { aes-key-value = "123456abc" }

[encrypt.tables.t_user.columns.phone]
cipher = "phone_cipher"
encryptor = "aes"

[metadata.tables.t_order]
columns = [
    { name = "order_id", type = "BIGINT", primary_key = true },
    { name = "user_id", type = "INT" },
    { name = "status", type = "VARCHAR(32)" },
]
"#;

    #[test]
    fn test_build_from_toml() {
        let (rules, metadata) = RuleConfiguration::from_toml_str(RULES).unwrap().build().unwrap();
        assert!(rules.props.sql_show);
        assert_eq!(rules.props.max_route_units, 16);
        assert_eq!(rules.props.dispatch, DispatchMode::Serial);
        assert_eq!(rules.passthrough_data_source(), Some("ds_0"));
        let order = rules.sharding.table_rule("t_order").unwrap();
        assert_eq!(order.actual_data_nodes.len(), 4);
        assert_eq!(order.key_generate.as_ref().unwrap().column, "order_id");
        assert!(rules.sharding.is_all_binding(&["t_order".to_string(), "t_order_item".to_string()]));
        assert!(rules.sharding.is_broadcast_table("t_config"));
        assert!(rules.encrypt.find_column("t_user", "phone").is_some());
        assert_eq!(metadata.get_table("t_order").unwrap().columns.len(), 3);
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let text = RULES.replace("algorithm = \"table_mod\"", "algorithm = \"missing\"");
        let result = RuleConfiguration::from_toml_str(&text).unwrap().build();
        assert!(matches!(result, Err(ShardingError::AlgorithmNotFound(name)) if name == "missing"));
    }

    #[test]
    fn test_unknown_data_source_is_rejected() {
        let text = RULES.replace("ds_${0..1}.t_order_item", "ds_${0..2}.t_order_item");
        let result = RuleConfiguration::from_toml_str(&text).unwrap().build();
        assert!(matches!(result, Err(ShardingError::DataSourceNotFound(ds)) if ds == "ds_2"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();
        let config = RuleConfiguration::load(file.path()).unwrap();
        assert_eq!(config.data_sources.names, vec!["ds_0", "ds_1"]);
        assert_eq!(config.sharding.tables.len(), 2);
    }
}
