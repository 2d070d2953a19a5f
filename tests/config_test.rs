mod common;

use std::io::Write;

use shardrustql::{RuleConfiguration, ShardingError};
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(common::RULES.as_bytes()).unwrap();
    let config = RuleConfiguration::load(file.path()).unwrap();
    let (rules, metadata) = config.build().unwrap();

    assert_eq!(rules.data_sources, vec!["ds_0".to_string(), "ds_1".to_string()]);
    let order = rules.sharding.table_rule("t_order").unwrap();
    assert_eq!(order.actual_data_nodes.len(), 4);
    assert_eq!(order.actual_data_nodes[3].to_string(), "ds_1.t_order_1");
    assert_eq!(rules.sharding.binding_group_of("t_order_item").unwrap().len(), 2);
    assert!(rules.sharding.is_broadcast_table("t_config"));
    assert!(metadata.get_table("t_order").unwrap().primary_key().unwrap().name == "order_id");
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RuleConfiguration::load(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_default_data_source_must_exist() {
    let text = common::RULES.replace("default = \"ds_0\"", "default = \"ds_9\"");
    let result = RuleConfiguration::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(ShardingError::DataSourceNotFound(name)) if name == "ds_9"));
}

#[test]
fn test_empty_configuration_is_rejected() {
    let result = RuleConfiguration::from_toml_str("").unwrap().build();
    assert!(matches!(result, Err(ShardingError::Config(_))));
}
