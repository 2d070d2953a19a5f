// Shared fixtures for integration tests
#![allow(dead_code)]

use shardrustql::{
    parse_statement, MemoryQueryResult, QueryResult, RouteContext, RouteEngine, Row, RuleConfiguration, RuleSet,
    SchemaMetadata, ShardingError, ShardingKernel, Value,
};

/// Two databases by `user_id`; `t_order` has two tables per database by `order_id`.
pub const RULES: &str = r#"
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

# One table per (database, user_id MOD 4) pair.
[sharding.tables.t_account]
actual_data_nodes = "ds_0.t_account_${[0, 2]}, ds_1.t_account_${[1, 3]}"
table_strategy = { column = "user_id", algorithm = "account_mod" }

[sharding.algorithms.database_mod]
type = "MOD"
props = { sharding-count = 2 }

[sharding.algorithms.table_mod]
type = "MOD"
props = { sharding-count = 2 }

[sharding.algorithms.account_mod]
type = "MOD"
props = { sharding-count = 4 }

[sharding.key_generators.snowflake]
type = "SNOWFLAKE"

[metadata.tables.t_order]
columns = [
    { name = "order_id", type = "BIGINT", primary_key = true },
    { name = "user_id", type = "INT" },
    { name = "status", type = "VARCHAR(32)" },
]
"#;

pub fn load() -> (RuleSet, SchemaMetadata) {
    RuleConfiguration::from_toml_str(RULES).unwrap().build().unwrap()
}

pub fn kernel() -> ShardingKernel {
    ShardingKernel::from_config(&RuleConfiguration::from_toml_str(RULES).unwrap()).unwrap()
}

pub fn route(sql: &str, parameters: &[Value]) -> Result<RouteContext, ShardingError> {
    let (rules, metadata) = load();
    RouteEngine::new(&rules, &metadata).route(&parse_statement(sql)?, parameters)
}

pub fn shard(columns: &[&str], rows: Vec<Vec<Value>>) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        columns.iter().map(|c| (*c).to_string()).collect(),
        rows.into_iter().map(Row::new).collect(),
    ))
}

pub fn ints(values: &[i64]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![Value::Integer(*v)]).collect()
}
