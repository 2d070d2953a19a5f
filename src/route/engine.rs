use super::decorator::{decorate_readwrite, decorate_shadow};
use super::sharding::{Cluster, ShardingRouter};
use super::validator::validate;
use super::{RouteContext, RouteMapper, RouteUnit};
use crate::condition::{ConditionExtractor, GeneratedKey};
use crate::core::{ShardingError, Value};
use crate::metadata::SchemaMetadata;
use crate::rule::RuleSet;
use crate::statement::StatementContext;

/// Turns a bound statement and its parameters into route units.
///
/// Pure function of its inputs apart from key generation; safe to share
/// across threads.
pub struct RouteEngine<'a> {
    rules: &'a RuleSet,
    metadata: &'a SchemaMetadata,
}

impl<'a> RouteEngine<'a> {
    #[must_use]
    pub const fn new(rules: &'a RuleSet, metadata: &'a SchemaMetadata) -> Self {
        Self { rules, metadata }
    }

    pub fn route(&self, statement: &StatementContext, parameters: &[Value]) -> Result<RouteContext, ShardingError> {
        let generated_key = GeneratedKey::resolve(statement, parameters, self.rules)?;
        let conditions = ConditionExtractor::new(self.rules, self.metadata).extract(
            statement,
            parameters,
            generated_key.as_ref(),
        )?;

        let sharding = &self.rules.sharding;
        let tables = statement.logic_table_names();
        let sharded: Vec<String> = tables.iter().filter(|t| sharding.is_sharding_table(t)).cloned().collect();
        let others: Vec<&String> = tables.iter().filter(|t| !sharding.is_sharding_table(t)).collect();

        let mut context = RouteContext { generated_key, accumulate: !sharded.is_empty(), ..RouteContext::default() };
        if sharded.is_empty() {
            context.units = self.route_unsharded(statement, &tables)?;
        } else {
            let router = ShardingRouter::new(sharding, self.rules.props.max_route_units);
            if conditions.is_insert() {
                let (units, rows) = router.route_insert(&sharded[0], &conditions.insert_rows)?;
                tracing::debug!(table = %sharded[0], units = units.len(), "insert route");
                context.units = units;
                context.insert_row_units = rows;
            } else {
                let clusters = self.clusters(&sharded);
                context.units = router.route_clusters(&clusters, &conditions)?;
                tracing::debug!(
                    strategy = if clusters.len() == 1 { "standard" } else { "complex" },
                    tables = ?sharded,
                    units = context.units.len(),
                    "sharding route"
                );
            }
            // Broadcast and unconfigured tables keep their logical name in every unit.
            for unit in &mut context.units {
                for table in &others {
                    unit.table_mappers.push(RouteMapper::new(table, table));
                }
            }
        }

        validate(statement, &context, self.rules)?;
        decorate_shadow(&mut context, statement, parameters, self.rules)?;
        decorate_readwrite(&mut context, statement.kind.is_write(), self.rules);
        Ok(context)
    }

    /// Groups bound tables behind the first of them to appear.
    fn clusters(&self, sharded: &[String]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        for table in sharded {
            let bound_to = clusters.iter_mut().find(|cluster| {
                self.rules
                    .sharding
                    .is_all_binding(&[cluster[0].clone(), table.clone()])
            });
            match bound_to {
                Some(cluster) => cluster.push(table.clone()),
                None => clusters.push(vec![table.clone()]),
            }
        }
        clusters
    }

    /// Broadcast-only statements go everywhere (writes) or to one data source
    /// (reads); anything else passes through to the default data source.
    fn route_unsharded(&self, statement: &StatementContext, tables: &[String]) -> Result<Vec<RouteUnit>, ShardingError> {
        let identity: Vec<RouteMapper> = tables.iter().map(|t| RouteMapper::new(t, t)).collect();
        let all_broadcast = !tables.is_empty() && tables.iter().all(|t| self.rules.sharding.is_broadcast_table(t));
        if all_broadcast && statement.kind.is_write() {
            tracing::debug!(data_sources = self.rules.data_sources.len(), "broadcast route");
            return Ok(self
                .rules
                .data_sources
                .iter()
                .map(|ds| RouteUnit::new(ds, identity.clone()))
                .collect());
        }
        let data_source = self
            .rules
            .passthrough_data_source()
            .ok_or_else(|| ShardingError::Config("no data source configured".to_string()))?;
        tracing::debug!(data_source, "passthrough route");
        Ok(vec![RouteUnit::new(data_source, identity)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;
    use crate::rule::algorithm::ModShardingAlgorithm;
    use crate::rule::data_node::parse_data_nodes;
    use crate::rule::{ShardingStrategy, TableRule};
    use std::sync::Arc;

    fn strategy(column: &str) -> ShardingStrategy {
        ShardingStrategy {
            column: column.to_string(),
            algorithm_name: format!("{column}_mod"),
            algorithm: Arc::new(ModShardingAlgorithm::new(2).unwrap()),
        }
    }

    fn rules() -> RuleSet {
        let mut rules = RuleSet {
            data_sources: vec!["ds_0".to_string(), "ds_1".to_string()],
            ..RuleSet::default()
        };
        for (table, nodes_expr) in [
            ("t_order", "ds_${0..1}.t_order_${0..1}"),
            ("t_order_item", "ds_${0..1}.t_order_item_${0..1}"),
            ("t_user", "ds_${0..1}.t_user"),
        ] {
            let mut rule = TableRule::new(table, parse_data_nodes(nodes_expr).unwrap());
            rule.database_strategy = Some(strategy("user_id"));
            if table != "t_user" {
                rule.table_strategy = Some(strategy("order_id"));
            }
            rules.sharding.add_table_rule(rule);
        }
        rules
            .sharding
            .add_binding_group(&["t_order".to_string(), "t_order_item".to_string()])
            .unwrap();
        rules.sharding.add_broadcast_table("t_config").unwrap();
        rules
    }

    fn route(sql: &str, parameters: &[Value]) -> Result<RouteContext, ShardingError> {
        let rules = rules();
        let metadata = SchemaMetadata::new();
        RouteEngine::new(&rules, &metadata).route(&parse_statement(sql)?, parameters)
    }

    fn describe(context: &RouteContext) -> Vec<String> {
        context.units.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_precise_routes_to_one_unit() {
        let context = route("SELECT * FROM t_order WHERE user_id = ? AND order_id = ?", &[Value::Integer(3), Value::Integer(4)]).unwrap();
        assert_eq!(describe(&context), vec!["ds_1 [t_order->t_order_0]"]);
        assert!(context.is_single_routing());
    }

    #[test]
    fn test_missing_condition_routes_to_all_nodes() {
        let context = route("SELECT * FROM t_order", &[]).unwrap();
        assert_eq!(context.units.len(), 4);
    }

    #[test]
    fn test_binding_tables_route_without_cartesian() {
        let context = route(
            "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE i.user_id = 2",
            &[],
        )
        .unwrap();
        assert_eq!(
            describe(&context),
            vec![
                "ds_0 [t_order->t_order_0, t_order_item->t_order_item_0]",
                "ds_0 [t_order->t_order_1, t_order_item->t_order_item_1]",
            ]
        );
    }

    #[test]
    fn test_complex_route_is_cartesian_per_data_source() {
        let context = route("SELECT * FROM t_order o, t_user u WHERE o.user_id = u.user_id AND u.user_id = 1", &[]).unwrap();
        assert_eq!(
            describe(&context),
            vec!["ds_1 [t_order->t_order_0, t_user->t_user]", "ds_1 [t_order->t_order_1, t_user->t_user]"]
        );
    }

    #[test]
    fn test_cartesian_limit() {
        let mut rules = rules();
        rules.props.max_route_units = 3;
        let metadata = SchemaMetadata::new();
        let statement = parse_statement("SELECT * FROM t_order o, t_user u").unwrap();
        let result = RouteEngine::new(&rules, &metadata).route(&statement, &[]);
        assert!(matches!(result, Err(ShardingError::RouteUnitLimitExceeded { limit: 3, .. })));
    }

    #[test]
    fn test_broadcast_table_is_appended() {
        let context = route("SELECT * FROM t_order o JOIN t_config c ON o.status = c.status WHERE o.user_id = 0 AND o.order_id = 1", &[]).unwrap();
        assert_eq!(describe(&context), vec!["ds_0 [t_order->t_order_1, t_config->t_config]"]);
    }

    #[test]
    fn test_broadcast_only_statements() {
        let write = route("UPDATE t_config SET status = 'x'", &[]).unwrap();
        assert_eq!(write.units.len(), 2);
        assert!(!write.accumulate);
        let read = route("SELECT * FROM t_config", &[]).unwrap();
        assert_eq!(describe(&read), vec!["ds_0 [t_config->t_config]"]);
    }

    #[test]
    fn test_insert_rows_are_distributed() {
        let context = route(
            "INSERT INTO t_order (user_id, order_id) VALUES (1, 1), (2, 2), (1, 3)",
            &[],
        )
        .unwrap();
        assert_eq!(describe(&context), vec!["ds_1 [t_order->t_order_1]", "ds_0 [t_order->t_order_0]"]);
        assert_eq!(context.insert_row_units, vec![0, 1, 0]);
        assert_eq!(context.insert_rows_of(0), vec![0, 2]);
    }

    #[test]
    fn test_insert_without_sharding_value_is_rejected() {
        assert!(matches!(route("INSERT INTO t_order (status) VALUES ('x')", &[]), Err(ShardingError::Route(_))));
    }

    fn ledger_rules() -> RuleSet {
        let mut rules = RuleSet { data_sources: vec!["ds_0".to_string()], ..RuleSet::default() };
        let mut rule = TableRule::new("t_ledger", parse_data_nodes("ds_0.t_ledger_${0..2}").unwrap());
        rule.table_strategy = Some(ShardingStrategy {
            column: "user_id".to_string(),
            algorithm_name: "ledger_mod".to_string(),
            algorithm: Arc::new(ModShardingAlgorithm::new(4).unwrap()),
        });
        rules.sharding.add_table_rule(rule);
        rules
    }

    #[test]
    fn test_in_list_value_without_table_is_rejected() {
        let rules = ledger_rules();
        let metadata = SchemaMetadata::new();
        let engine = RouteEngine::new(&rules, &metadata);

        let routed = engine
            .route(&parse_statement("SELECT * FROM t_ledger WHERE user_id IN (1, 2)").unwrap(), &[])
            .unwrap();
        assert_eq!(describe(&routed), vec!["ds_0 [t_ledger->t_ledger_1]", "ds_0 [t_ledger->t_ledger_2]"]);

        let result = engine.route(&parse_statement("SELECT * FROM t_ledger WHERE user_id IN (1, 3)").unwrap(), &[]);
        match result {
            Err(ShardingError::NoRouteTarget { column, value, .. }) => {
                assert_eq!(column, "user_id");
                assert_eq!(value, "3");
            }
            other => panic!("expected NoRouteTarget, got {other:?}"),
        }
    }

    #[test]
    fn test_always_false_routes_to_first_node() {
        let context = route("SELECT * FROM t_order WHERE user_id = 1 AND user_id = 2", &[]).unwrap();
        assert_eq!(describe(&context), vec!["ds_0 [t_order->t_order_0]"]);
    }
}
